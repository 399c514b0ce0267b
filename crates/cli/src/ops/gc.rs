use clap::Args;

use store::StoreError;

use crate::op::SessionError;

#[derive(Args, Debug, Clone)]
pub struct Gc {
    /// Maximum number of queued deletes to retry
    #[arg(long, default_value_t = 1000)]
    pub limit: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum GcError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("sweep failed: {0}")]
    Store(#[from] StoreError),
}

#[async_trait::async_trait]
impl crate::op::Op for Gc {
    type Error = GcError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = ctx.session().await?;
        let report = session.service.sweep_pending_deletes(self.limit).await?;

        Ok(format!(
            "Deleted {} blobs, {} still pending",
            report.deleted.len(),
            report.failed.len()
        ))
    }
}
