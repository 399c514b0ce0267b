use clap::Args;

use store::{ObjectType, TreePath};

use crate::op::SessionError;

#[derive(Args, Debug, Clone)]
pub struct Ls {
    /// Directory to list
    #[arg(default_value = "/")]
    pub path: TreePath,
}

#[derive(Debug, thiserror::Error)]
pub enum LsError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("failed to list {0}: {1}")]
    Store(TreePath, store::StoreError),
}

#[async_trait::async_trait]
impl crate::op::Op for Ls {
    type Error = LsError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = ctx.session().await?;
        let entries = session
            .service
            .list(&session.owner, &self.path)
            .await
            .map_err(|e| LsError::Store(self.path.clone(), e))?;

        if entries.is_empty() {
            return Ok("No items found".to_string());
        }

        let mut output = String::new();
        for entry in entries {
            let name = entry.node.path.name().unwrap_or_default();
            let line = match (entry.node.object_type, entry.newest) {
                (ObjectType::File, Some(newest)) => {
                    format!("{:<5} {:>10}  {}  {}", "FILE", newest.size, newest.linked_at, name)
                }
                (ObjectType::File, None) => format!("{:<5} {:>10}  {}", "FILE", "-", name),
                (object_type, _) => format!("{:<5} {:>10}  {}/", object_type.as_str(), "", name),
            };
            output.push_str(&line);
            output.push('\n');
        }
        Ok(output.trim_end().to_string())
    }
}
