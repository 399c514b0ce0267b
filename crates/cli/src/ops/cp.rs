use clap::Args;

use store::{StoreError, TreePath};

use crate::op::SessionError;

#[derive(Args, Debug, Clone)]
pub struct Cp {
    /// File or directory to copy
    pub source: TreePath,

    /// Path of the copy; its parent must exist and the path itself must not
    pub destination: TreePath,

    /// Carry over only the newest version of each file
    #[arg(long)]
    pub newest: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum CpError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("cannot copy {0}: {1}")]
    Store(TreePath, StoreError),
}

#[async_trait::async_trait]
impl crate::op::Op for Cp {
    type Error = CpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = ctx.session().await?;
        let store_err = |e| CpError::Store(self.source.clone(), e);
        let node = session
            .service
            .resolve(&session.owner, &self.source)
            .await
            .map_err(store_err)?;
        let copies = session
            .service
            .copy_node(&session.owner, &node, &self.destination, self.newest)
            .await
            .map_err(store_err)?;

        Ok(format!(
            "Copied {} to {} ({} nodes)",
            self.source,
            self.destination,
            copies.len()
        ))
    }
}
