use clap::Args;

use store::{DocumentService, OwnerId, StoreError};

use crate::state::{AppConfig, AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Default log level written to the config (default: info)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] StateError),
    #[error("failed to create store: {0}")]
    Store(#[from] StoreError),
}

#[async_trait::async_trait]
impl crate::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = AppConfig::new(ctx.owner.unwrap_or_else(OwnerId::new));
        config.log_level = self.log_level.clone();

        let state = AppState::init(ctx.config_path.clone(), config)?;
        let service = DocumentService::open(&state.db_path, state.blob_store_config()).await?;
        let root = service.create_root(&state.config.owner_id).await?;

        let output = format!(
            "Initialized doctree directory at: {}\n\
             - Database: {}\n\
             - Blobs: {}\n\
             - Config: {}\n\
             - Owner: {}\n\
             - Root: {}",
            state.app_dir.display(),
            state.db_path.display(),
            state.blobs_path.display(),
            state.config_path.display(),
            state.config.owner_id,
            root.object_id,
        );

        Ok(output)
    }
}
