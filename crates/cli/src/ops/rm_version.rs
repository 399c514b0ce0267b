use clap::Args;

use store::{BlobId, StoreError, TreePath};

use crate::op::SessionError;

#[derive(Args, Debug, Clone)]
pub struct RmVersion {
    /// File to remove the version from
    pub path: TreePath,

    /// Blob id of the version
    pub version: BlobId,
}

#[derive(Debug, thiserror::Error)]
pub enum RmVersionError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("cannot remove version {1} of {0}: {2}")]
    Store(TreePath, BlobId, StoreError),
}

#[async_trait::async_trait]
impl crate::op::Op for RmVersion {
    type Error = RmVersionError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = ctx.session().await?;
        let store_err = |e| RmVersionError::Store(self.path.clone(), self.version, e);
        let node = session
            .service
            .resolve(&session.owner, &self.path)
            .await
            .map_err(store_err)?;
        let outcome = session
            .service
            .remove_version(&session.owner, &node, &self.version)
            .await
            .map_err(store_err)?;

        Ok(super::rm::format_outcome(&outcome))
    }
}
