use clap::Args;

use store::{RemoveOutcome, StoreError, TreePath};

use crate::op::SessionError;

#[derive(Args, Debug, Clone)]
pub struct Rm {
    /// File or directory to remove
    pub path: TreePath,

    /// Remove a directory and everything below it
    #[arg(short, long)]
    pub recursive: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RmError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("cannot remove {0}: {1}")]
    Store(TreePath, StoreError),
}

pub(crate) fn format_outcome(outcome: &RemoveOutcome) -> String {
    let mut output = format!(
        "Removed {} nodes, released {} blobs",
        outcome.removed.len(),
        outcome.orphaned.len() - outcome.pending.len()
    );
    if !outcome.pending.is_empty() {
        output.push_str(&format!(
            "\n{} blob deletes pending, run 'doctree gc' to retry",
            outcome.pending.len()
        ));
    }
    output
}

#[async_trait::async_trait]
impl crate::op::Op for Rm {
    type Error = RmError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = ctx.session().await?;
        let store_err = |e| RmError::Store(self.path.clone(), e);
        let node = session
            .service
            .resolve(&session.owner, &self.path)
            .await
            .map_err(store_err)?;
        let outcome = session
            .service
            .remove_node(&session.owner, &node, self.recursive)
            .await
            .map_err(store_err)?;

        Ok(format_outcome(&outcome))
    }
}
