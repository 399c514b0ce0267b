use clap::Args;

use store::{StoreError, TreePath};

use crate::op::SessionError;

#[derive(Args, Debug, Clone)]
pub struct Mv {
    /// File or directory to move
    pub source: TreePath,

    /// New path; its parent must exist and the path itself must not
    pub destination: TreePath,
}

#[derive(Debug, thiserror::Error)]
pub enum MvError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("cannot move {0}: {1}")]
    Store(TreePath, StoreError),
}

#[async_trait::async_trait]
impl crate::op::Op for Mv {
    type Error = MvError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = ctx.session().await?;
        let store_err = |e| MvError::Store(self.source.clone(), e);
        let node = session
            .service
            .resolve(&session.owner, &self.source)
            .await
            .map_err(store_err)?;
        let moved = session
            .service
            .move_node(&session.owner, &node, &self.destination)
            .await
            .map_err(store_err)?;

        Ok(format!(
            "Moved {} to {} ({} nodes)",
            self.source, self.destination, moved
        ))
    }
}
