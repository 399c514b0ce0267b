use std::path::PathBuf;

use clap::Args;

use store::{StoreError, TreePath};

use crate::op::SessionError;

#[derive(Args, Debug, Clone)]
pub struct Put {
    /// Local file to upload
    pub local: PathBuf,

    /// Destination path of the new file
    pub path: TreePath,

    /// Checksum to record (default: sha256 of the contents)
    #[arg(long)]
    pub checksum: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PutError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("failed to read {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to create {0}: {1}")]
    Store(TreePath, StoreError),
}

#[async_trait::async_trait]
impl crate::op::Op for Put {
    type Error = PutError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (blob, data) = super::open_upload(&self.local, self.checksum.as_deref())
            .await
            .map_err(|e| PutError::Read(self.local.clone(), e))?;

        let session = ctx.session().await?;
        session
            .ensure_root()
            .await
            .map_err(|e| PutError::Store(TreePath::root(), e))?;
        let created = session
            .service
            .create_file(&session.owner, &self.path, blob, data)
            .await
            .map_err(|e| PutError::Store(self.path.clone(), e))?;

        Ok(format!(
            "Created {} ({})\n{}",
            created.node.path,
            created.node.object_id,
            super::format_version(&created.version)
        ))
    }
}
