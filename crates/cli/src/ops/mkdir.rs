use clap::Args;

use store::{StoreError, TreePath};

use crate::op::SessionError;

#[derive(Args, Debug, Clone)]
pub struct Mkdir {
    /// Directory to create
    pub path: TreePath,

    /// Create missing parent directories as needed
    #[arg(short, long)]
    pub parents: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum MkdirError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("cannot create {0}: {1}")]
    Store(TreePath, StoreError),
}

#[async_trait::async_trait]
impl crate::op::Op for Mkdir {
    type Error = MkdirError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = ctx.session().await?;
        session
            .ensure_root()
            .await
            .map_err(|e| MkdirError::Store(TreePath::root(), e))?;

        let mut targets = vec![self.path.clone()];
        if self.parents {
            let mut current = self.path.parent();
            while let Some(parent) = current {
                if parent.is_root() {
                    break;
                }
                current = parent.parent();
                targets.push(parent);
            }
            targets.reverse();
        }

        let mut created = Vec::new();
        for target in targets {
            if self.parents {
                match session.service.resolve(&session.owner, &target).await {
                    Ok(_) => continue,
                    Err(StoreError::NotFound(_)) => {}
                    Err(e) => return Err(MkdirError::Store(target, e)),
                }
            }
            let node = session
                .service
                .create_dir(&session.owner, &target)
                .await
                .map_err(|e| MkdirError::Store(target.clone(), e))?;
            created.push(format!("Created {} ({})", node.path, node.object_id));
        }

        if created.is_empty() {
            return Ok(format!("{} already exists", self.path));
        }
        Ok(created.join("\n"))
    }
}
