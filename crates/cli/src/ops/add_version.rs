use std::path::PathBuf;

use clap::Args;

use store::{StoreError, TreePath};

use crate::op::SessionError;

#[derive(Args, Debug, Clone)]
pub struct AddVersion {
    /// Local file holding the new contents
    pub local: PathBuf,

    /// Existing file to add a version to
    pub path: TreePath,

    /// Checksum to record (default: sha256 of the contents)
    #[arg(long)]
    pub checksum: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AddVersionError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("failed to read {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to add version to {0}: {1}")]
    Store(TreePath, StoreError),
}

#[async_trait::async_trait]
impl crate::op::Op for AddVersion {
    type Error = AddVersionError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (blob, data) = super::open_upload(&self.local, self.checksum.as_deref())
            .await
            .map_err(|e| AddVersionError::Read(self.local.clone(), e))?;

        let session = ctx.session().await?;
        let store_err = |e| AddVersionError::Store(self.path.clone(), e);
        let node = session
            .service
            .resolve(&session.owner, &self.path)
            .await
            .map_err(store_err)?;
        let version = session
            .service
            .add_version(&session.owner, &node, blob, data)
            .await
            .map_err(store_err)?;

        Ok(super::format_version(&version))
    }
}
