use std::error::Error;
use std::path::PathBuf;

use store::{DocumentService, OwnerId, StoreError, TreePath};

use crate::state::{AppState, StateError};

#[derive(Clone)]
pub struct OpContext {
    /// Optional custom state path (defaults to ~/.doctree)
    pub config_path: Option<PathBuf>,
    /// Owner override from `--owner`
    pub owner: Option<OwnerId>,
}

/// An opened store acting on behalf of one owner.
pub struct Session {
    pub service: DocumentService,
    pub owner: OwnerId,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("failed to open store: {0}")]
    Store(#[from] StoreError),
}

impl Session {
    /// Create the owner's ROOT unless it already exists
    pub async fn ensure_root(&self) -> Result<(), StoreError> {
        match self.service.resolve(&self.owner, &TreePath::root()).await {
            Ok(_) => Ok(()),
            Err(StoreError::NotFound(_)) => self.service.create_root(&self.owner).await.map(|_| ()),
            Err(e) => Err(e),
        }
    }
}

impl OpContext {
    pub fn new(config_path: Option<PathBuf>, owner: Option<OwnerId>) -> Self {
        Self { config_path, owner }
    }

    pub fn load_state(&self) -> Result<AppState, StateError> {
        AppState::load(self.config_path.clone())
    }

    /// Load state and open the database and blob store it points at
    pub async fn session(&self) -> Result<Session, SessionError> {
        let state = self.load_state()?;
        let service = DocumentService::open(&state.db_path, state.blob_store_config()).await?;
        Ok(Session {
            service,
            owner: self.owner.unwrap_or(state.config.owner_id),
        })
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}
