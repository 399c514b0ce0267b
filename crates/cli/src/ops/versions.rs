use clap::Args;

use store::{BlobId, StoreError, TreePath};

use crate::op::SessionError;

#[derive(Args, Debug, Clone)]
pub struct Versions {
    /// File whose history to list
    pub path: TreePath,

    /// Maximum number of versions to show
    #[arg(long, default_value_t = 20)]
    pub limit: u32,

    /// Continue after this version (as printed by a previous page)
    #[arg(long)]
    pub after: Option<BlobId>,
}

#[derive(Debug, thiserror::Error)]
pub enum VersionsError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("failed to list versions of {0}: {1}")]
    Store(TreePath, StoreError),
}

#[async_trait::async_trait]
impl crate::op::Op for Versions {
    type Error = VersionsError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = ctx.session().await?;
        let store_err = |e| VersionsError::Store(self.path.clone(), e);
        let node = session
            .service
            .resolve(&session.owner, &self.path)
            .await
            .map_err(store_err)?;

        let (header, versions) = match &self.after {
            None => {
                let page = session
                    .service
                    .list_versions_first_page(&session.owner, &node, self.limit)
                    .await
                    .map_err(store_err)?;
                (
                    Some(format!("{} versions of {}", page.total, node.path)),
                    page.versions,
                )
            }
            Some(after) => {
                let last_seen = session
                    .service
                    .find_version(&session.owner, &node, after)
                    .await
                    .map_err(store_err)?;
                let versions = session
                    .service
                    .list_versions_next(&session.owner, &last_seen, self.limit)
                    .await
                    .map_err(store_err)?;
                (None, versions)
            }
        };

        let mut lines: Vec<String> = header.into_iter().collect();
        if versions.is_empty() {
            lines.push("No more versions".to_string());
        }
        lines.extend(versions.iter().map(super::format_version));
        Ok(lines.join("\n"))
    }
}
