use std::path::PathBuf;

use bytes::Bytes;
use clap::Args;
use futures::TryStreamExt;
use tokio::io::AsyncWriteExt;

use store::{BlobId, StoreError, TreePath};

use crate::op::SessionError;

#[derive(Args, Debug, Clone)]
pub struct Cat {
    /// File to read
    pub path: TreePath,

    /// Read this version instead of the newest
    #[arg(long)]
    pub version: Option<BlobId>,

    /// Write the raw contents to a local file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum CatError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("failed to read {0}: {1}")]
    Store(TreePath, StoreError),
    #[error("{0} has no versions")]
    NoVersions(TreePath),
    #[error("failed to write {0}: {1}")]
    Write(PathBuf, std::io::Error),
    #[error("failed to read payload: {0}")]
    Payload(std::io::Error),
}

#[async_trait::async_trait]
impl crate::op::Op for Cat {
    type Error = CatError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = ctx.session().await?;
        let store_err = |e| CatError::Store(self.path.clone(), e);
        let node = session
            .service
            .resolve(&session.owner, &self.path)
            .await
            .map_err(store_err)?;

        let version = match &self.version {
            Some(file_id) => session
                .service
                .find_version(&session.owner, &node, file_id)
                .await
                .map_err(store_err)?,
            None => session
                .service
                .list_versions_first_page(&session.owner, &node, 1)
                .await
                .map_err(store_err)?
                .versions
                .into_iter()
                .next()
                .ok_or_else(|| CatError::NoVersions(self.path.clone()))?,
        };

        let mut stream = session
            .service
            .get_version_data(&session.owner, &version)
            .await
            .map_err(store_err)?;

        if let Some(output) = &self.output {
            let write_err = |e| CatError::Write(output.clone(), e);
            let mut file = tokio::fs::File::create(output).await.map_err(write_err)?;
            let mut written = 0u64;
            while let Some(chunk) = stream.try_next().await.map_err(CatError::Payload)? {
                file.write_all(&chunk).await.map_err(write_err)?;
                written += chunk.len() as u64;
            }
            file.flush().await.map_err(write_err)?;
            return Ok(format!(
                "Wrote {} bytes of {} to {}",
                written,
                version.file_id,
                output.display()
            ));
        }

        let chunks: Vec<Bytes> = stream.try_collect().await.map_err(CatError::Payload)?;
        let bytes = chunks.concat();

        // Try to convert to UTF-8 string, or show hex if binary
        match String::from_utf8(bytes.clone()) {
            Ok(text) => Ok(format!(
                "File: {}\nVersion: {}\nSize: {} bytes\n\n{}",
                node.path, version.file_id, version.size, text
            )),
            Err(_) => {
                let hex = bytes
                    .iter()
                    .map(|b| format!("{:02x}", b))
                    .collect::<Vec<_>>()
                    .join(" ");
                Ok(format!(
                    "File: {}\nVersion: {}\nSize: {} bytes\nBinary content (hex): {}",
                    node.path, version.file_id, version.size, hex
                ))
            }
        }
    }
}
