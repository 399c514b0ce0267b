//! Document operations composed from the tree, the version links and the
//! blob store.
//!
//! Each operation runs its relational statements in one transaction. Blob
//! payloads are streamed to the blob store before that transaction begins,
//! and removed again if it does not commit. They are deleted only after the
//! transaction that orphaned them has committed. Orphaned ids go through the
//! `pending_blob_delete` ledger so a failed delete is retried by
//! [`DocumentService::sweep_pending_deletes`] instead of being forgotten.
//!
//! Mutating transactions take the SQLite write lock when they begin, and
//! hold it only for their statements, never across a blob-store call.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;

use tracing::{debug, info, warn, Instrument};

use crate::database::models::{CopiedNode, NewBlob, TreeNode, VersionedFile};
use crate::database::{link_queries, pending_queries, tree_queries, Database};
use crate::error::{Result, StoreError};
use crate::storage::{BlobStorage, ByteStream, DeleteReport, ObjectStoreConfig};
use crate::types::{BlobId, NodeId, ObjectType, OwnerId, TreePath};

/// A child in a directory listing. FILE children carry their newest version
/// when they have one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub node: TreeNode,
    pub newest: Option<VersionedFile>,
}

/// First page of a version listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPage {
    pub versions: Vec<VersionedFile>,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedFile {
    pub node: TreeNode,
    pub version: VersionedFile,
}

/// What a remove touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveOutcome {
    /// Tree nodes deleted, empty for a version removal
    pub removed: Vec<NodeId>,
    /// Blobs whose last link went away
    pub orphaned: Vec<BlobId>,
    /// Orphaned payloads the blob store did not confirm deleting. They stay
    /// in the ledger until a sweep succeeds.
    pub pending: Vec<BlobId>,
}

/// Multi-tenant document store. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DocumentService {
    db: Database,
    storage: BlobStorage,
}

/// Run an operation on its own task so that dropping the caller's future
/// cannot stop it between commit and the blob-store step.
async fn detached<T, F>(operation: F) -> Result<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(operation.in_current_span()).await?
}

fn validate_blob(blob: &NewBlob) -> Result<()> {
    if blob.checksum.is_empty() {
        return Err(StoreError::InvalidUpload("missing checksum".to_string()));
    }
    if blob.size < 0 {
        return Err(StoreError::InvalidUpload(format!(
            "negative size {}",
            blob.size
        )));
    }
    Ok(())
}

impl DocumentService {
    pub fn new(db: Database, storage: BlobStorage) -> Self {
        Self { db, storage }
    }

    /// Open a file backed database with the configured blob store.
    pub async fn open(db_path: &Path, config: ObjectStoreConfig) -> Result<Self> {
        let db = Database::new(db_path).await?;
        let storage = BlobStorage::new(config).await?;
        Ok(Self::new(db, storage))
    }

    /// In-memory database and blob store.
    pub async fn ephemeral() -> Result<Self> {
        let db = Database::in_memory().await?;
        Ok(Self::new(db, BlobStorage::memory()))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn storage(&self) -> &BlobStorage {
        &self.storage
    }

    pub async fn resolve(&self, owner: &OwnerId, path: &TreePath) -> Result<TreeNode> {
        let mut conn = self.db.acquire().await?;
        tree_queries::find_by_path(&mut conn, owner, path)
            .await?
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    pub async fn get_node(&self, owner: &OwnerId, id: &NodeId) -> Result<TreeNode> {
        let mut conn = self.db.acquire().await?;
        tree_queries::find_by_id(&mut conn, owner, id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Children of the ROOT or DIR at `path`.
    #[tracing::instrument(skip_all, fields(owner = %owner, path = %path))]
    pub async fn list(&self, owner: &OwnerId, path: &TreePath) -> Result<Vec<TreeEntry>> {
        let mut tx = self.db.begin().await?;

        let node = tree_queries::find_by_path(&mut tx, owner, path)
            .await?
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        if !node.object_type.is_container() {
            return Err(StoreError::illegal_type("ROOT or DIR", node.object_type));
        }

        let children = tree_queries::list_children(&mut tx, owner, &node).await?;
        let mut entries = Vec::with_capacity(children.len());
        for child in children {
            let newest = match child.object_type {
                ObjectType::File => link_queries::list_newest(&mut tx, owner, &child.object_id, 1)
                    .await?
                    .pop(),
                ObjectType::Root | ObjectType::Dir => None,
            };
            entries.push(TreeEntry {
                node: child,
                newest,
            });
        }

        tx.commit().await?;
        Ok(entries)
    }

    #[tracing::instrument(skip_all, fields(owner = %owner, node = %node.object_id, limit = limit))]
    pub async fn list_versions_first_page(
        &self,
        owner: &OwnerId,
        node: &TreeNode,
        limit: u32,
    ) -> Result<VersionPage> {
        if node.object_type != ObjectType::File {
            return Err(StoreError::illegal_type("FILE", node.object_type));
        }
        let mut tx = self.db.begin().await?;
        let versions = link_queries::list_newest(&mut tx, owner, &node.object_id, limit).await?;
        let total = link_queries::count_versions(&mut tx, owner, &node.object_id).await?;
        tx.commit().await?;
        Ok(VersionPage { versions, total })
    }

    #[tracing::instrument(skip_all, fields(owner = %owner, after = %last_seen.file_id, limit = limit))]
    pub async fn list_versions_next(
        &self,
        owner: &OwnerId,
        last_seen: &VersionedFile,
        limit: u32,
    ) -> Result<Vec<VersionedFile>> {
        let mut conn = self.db.acquire().await?;
        link_queries::list_after(&mut conn, owner, last_seen, limit).await
    }

    /// One version of a node by blob id.
    pub async fn find_version(
        &self,
        owner: &OwnerId,
        node: &TreeNode,
        file_id: &BlobId,
    ) -> Result<VersionedFile> {
        let mut conn = self.db.acquire().await?;
        link_queries::find_version(&mut conn, owner, &node.object_id, file_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("version {file_id} of {}", node.path)))
    }

    /// Payload of a version as a stream of chunks. The version must still be
    /// linked for `owner`.
    #[tracing::instrument(skip_all, fields(owner = %owner, file = %version.file_id))]
    pub async fn get_version_data(
        &self,
        owner: &OwnerId,
        version: &VersionedFile,
    ) -> Result<ByteStream> {
        {
            let mut conn = self.db.acquire().await?;
            link_queries::find_version(&mut conn, owner, &version.object_id, &version.file_id)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("version {}", version.file_id)))?;
        }
        self.storage
            .get_stream(owner, &version.file_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("payload {}", version.file_id)))
    }

    #[tracing::instrument(skip_all, fields(owner = %owner))]
    pub async fn create_root(&self, owner: &OwnerId) -> Result<TreeNode> {
        let this = self.clone();
        let owner = *owner;
        detached(async move {
            this.create_node(&owner, &TreePath::root(), ObjectType::Root)
                .await
        })
        .await
    }

    #[tracing::instrument(skip_all, fields(owner = %owner, path = %path))]
    pub async fn create_dir(&self, owner: &OwnerId, path: &TreePath) -> Result<TreeNode> {
        let this = self.clone();
        let (owner, path) = (*owner, path.clone());
        detached(async move { this.create_node(&owner, &path, ObjectType::Dir).await }).await
    }

    async fn create_node(
        &self,
        owner: &OwnerId,
        path: &TreePath,
        object_type: ObjectType,
    ) -> Result<TreeNode> {
        let mut tx = self.db.begin_write().await?;
        let node = tree_queries::create(&mut tx, owner, path, object_type).await?;
        tx.commit().await?;
        info!(node = %node.object_id, object_type = %object_type, "node created");
        Ok(node)
    }

    /// Create a FILE at `path` with its first version.
    #[tracing::instrument(skip_all, fields(owner = %owner, path = %path, size = blob.size))]
    pub async fn create_file(
        &self,
        owner: &OwnerId,
        path: &TreePath,
        blob: NewBlob,
        data: ByteStream,
    ) -> Result<CreatedFile> {
        validate_blob(&blob)?;
        let this = self.clone();
        let (owner, path) = (*owner, path.clone());
        detached(async move {
            let file_id = BlobId::new();
            this.upload(&owner, &file_id, &blob, data).await?;
            let created = this.commit_file(&owner, &path, &file_id, &blob).await;
            let created = this.keep_payload_if(created, &owner, &file_id).await?;
            info!(node = %created.node.object_id, file = %file_id, "file created");
            Ok(created)
        })
        .await
    }

    /// Attach a new version to an existing FILE.
    #[tracing::instrument(skip_all, fields(owner = %owner, node = %node.object_id, size = blob.size))]
    pub async fn add_version(
        &self,
        owner: &OwnerId,
        node: &TreeNode,
        blob: NewBlob,
        data: ByteStream,
    ) -> Result<VersionedFile> {
        if node.object_type != ObjectType::File {
            return Err(StoreError::illegal_type("FILE", node.object_type));
        }
        validate_blob(&blob)?;
        let this = self.clone();
        let (owner, node_id) = (*owner, node.object_id);
        detached(async move {
            // skip the upload for a node that cannot take it
            {
                let mut conn = this.db.acquire().await?;
                if !tree_queries::is_type(&mut conn, &owner, &node_id, ObjectType::File).await? {
                    return Err(StoreError::InsertFailure("file"));
                }
            }
            let file_id = BlobId::new();
            this.upload(&owner, &file_id, &blob, data).await?;
            let version = this.commit_version(&owner, &node_id, &file_id, &blob).await;
            let version = this.keep_payload_if(version, &owner, &file_id).await?;
            info!(file = %file_id, "version added");
            Ok(version)
        })
        .await
    }

    async fn commit_file(
        &self,
        owner: &OwnerId,
        path: &TreePath,
        file_id: &BlobId,
        blob: &NewBlob,
    ) -> Result<CreatedFile> {
        let mut tx = self.db.begin_write().await?;
        let node = tree_queries::create(&mut tx, owner, path, ObjectType::File).await?;
        let version =
            link_queries::create_blob_with_link(&mut tx, owner, &node.object_id, file_id, blob)
                .await?;
        tx.commit().await?;
        Ok(CreatedFile { node, version })
    }

    /// The blob insert itself refuses a node that is not an owned FILE.
    async fn commit_version(
        &self,
        owner: &OwnerId,
        node_id: &NodeId,
        file_id: &BlobId,
        blob: &NewBlob,
    ) -> Result<VersionedFile> {
        let mut tx = self.db.begin_write().await?;
        let version =
            link_queries::create_blob_with_link(&mut tx, owner, node_id, file_id, blob).await?;
        tx.commit().await?;
        Ok(version)
    }

    /// Stream the payload into the blob store and check it against the
    /// declared size. Nothing is left behind on failure.
    async fn upload(
        &self,
        owner: &OwnerId,
        file_id: &BlobId,
        blob: &NewBlob,
        data: ByteStream,
    ) -> Result<()> {
        debug!(file = %file_id, size = blob.size, "uploading payload");
        let written = match self.storage.put_stream(owner, file_id, data).await {
            Ok(written) => written,
            Err(e) => {
                self.discard_payload(owner, file_id).await;
                return Err(e);
            }
        };
        if written != blob.size as u64 {
            self.discard_payload(owner, file_id).await;
            return Err(StoreError::InvalidUpload(format!(
                "declared size {} but received {written} bytes",
                blob.size
            )));
        }
        Ok(())
    }

    /// Pass a commit result through, removing the uploaded payload when the
    /// metadata never committed.
    async fn keep_payload_if<T>(
        &self,
        committed: Result<T>,
        owner: &OwnerId,
        file_id: &BlobId,
    ) -> Result<T> {
        if committed.is_err() {
            self.discard_payload(owner, file_id).await;
        }
        committed
    }

    async fn discard_payload(&self, owner: &OwnerId, file_id: &BlobId) {
        if let Err(e) = self.storage.delete(owner, file_id).await {
            warn!(file = %file_id, error = %e, "failed to remove uncommitted payload");
        }
    }

    /// Move a FILE or a whole DIR subtree to `dest`. Returns the number of
    /// nodes whose path changed.
    #[tracing::instrument(skip_all, fields(owner = %owner, node = %node.object_id, dest = %dest))]
    pub async fn move_node(&self, owner: &OwnerId, node: &TreeNode, dest: &TreePath) -> Result<u64> {
        let this = self.clone();
        let (owner, node, dest) = (*owner, node.clone(), dest.clone());
        detached(async move {
            let mut tx = this.db.begin_write().await?;
            let moved = match node.object_type {
                ObjectType::File => tree_queries::move_file(&mut tx, &owner, &node, &dest).await?,
                ObjectType::Dir => tree_queries::move_dir(&mut tx, &owner, &node, &dest).await?,
                ObjectType::Root => {
                    return Err(StoreError::illegal_type("FILE or DIR", node.object_type))
                }
            };
            let moved = match moved {
                Some(n) if n > 0 => n,
                _ => return Err(StoreError::UpdateFailure("tree")),
            };
            tx.commit().await?;
            info!(moved, "node moved");
            Ok(moved)
        })
        .await
    }

    /// Copy a FILE or a DIR subtree to `dest`. Copied files share the source
    /// blobs by reference: only the newest one, or the whole history.
    #[tracing::instrument(skip_all, fields(owner = %owner, node = %node.object_id, dest = %dest, only_newest = only_newest))]
    pub async fn copy_node(
        &self,
        owner: &OwnerId,
        node: &TreeNode,
        dest: &TreePath,
        only_newest: bool,
    ) -> Result<Vec<CopiedNode>> {
        let this = self.clone();
        let (owner, node, dest) = (*owner, node.clone(), dest.clone());
        detached(async move {
            let mut tx = this.db.begin_write().await?;
            let copies = match node.object_type {
                ObjectType::File => tree_queries::copy_file(&mut tx, &owner, &node, &dest)
                    .await?
                    .into_iter()
                    .collect(),
                ObjectType::Dir => tree_queries::copy_dir(&mut tx, &owner, &node, &dest).await?,
                ObjectType::Root => {
                    return Err(StoreError::illegal_type("FILE or DIR", node.object_type))
                }
            };
            if copies.is_empty() {
                return Err(StoreError::InsertFailure("tree"));
            }

            for copy in copies.iter().filter(|c| c.object_type == ObjectType::File) {
                let linked = if only_newest {
                    link_queries::copy_newest_link(
                        &mut tx,
                        &owner,
                        &copy.source_id,
                        &copy.destination_id,
                    )
                    .await?
                } else {
                    link_queries::copy_all_links(
                        &mut tx,
                        &owner,
                        &copy.source_id,
                        &copy.destination_id,
                    )
                    .await?
                };
                if linked == 0 {
                    return Err(StoreError::IllegalState("failed to copy a file"));
                }
            }

            tx.commit().await?;
            info!(copied = copies.len(), "node copied");
            Ok(copies)
        })
        .await
    }

    /// Remove a node, or with `recursive` its whole subtree, together with
    /// every link from the removed nodes.
    #[tracing::instrument(skip_all, fields(owner = %owner, node = %node.object_id, recursive = recursive))]
    pub async fn remove_node(
        &self,
        owner: &OwnerId,
        node: &TreeNode,
        recursive: bool,
    ) -> Result<RemoveOutcome> {
        let this = self.clone();
        let (owner, node) = (*owner, node.clone());
        detached(async move {
            let mut tx = this.db.begin_write().await?;
            let removed = if recursive {
                tree_queries::delete_subtree(&mut tx, &owner, &node).await?
            } else {
                tree_queries::delete_leaf(&mut tx, &owner, &node)
                    .await?
                    .into_iter()
                    .collect()
            };
            if removed.is_empty() {
                return Err(StoreError::DeleteFailure("tree"));
            }

            let mut orphaned = Vec::new();
            for id in &removed {
                let unlinked = link_queries::remove_all_links_from(&mut tx, &owner, id).await?;
                orphaned.extend(unlinked.into_iter().filter(|u| u.orphaned).map(|u| u.file_id));
            }
            pending_queries::enqueue(&mut tx, &owner, &orphaned).await?;
            tx.commit().await?;
            info!(removed = removed.len(), orphaned = orphaned.len(), "node removed");

            let pending = this.release_blobs(&owner, &orphaned).await;
            Ok(RemoveOutcome {
                removed,
                orphaned,
                pending,
            })
        })
        .await
    }

    /// Detach one version from a FILE.
    #[tracing::instrument(skip_all, fields(owner = %owner, node = %node.object_id, file = %file_id))]
    pub async fn remove_version(
        &self,
        owner: &OwnerId,
        node: &TreeNode,
        file_id: &BlobId,
    ) -> Result<RemoveOutcome> {
        let this = self.clone();
        let (owner, node_id, file_id) = (*owner, node.object_id, *file_id);
        detached(async move {
            let mut tx = this.db.begin_write().await?;
            let unlinked = link_queries::remove_link(&mut tx, &owner, &node_id, &file_id)
                .await?
                .ok_or(StoreError::DeleteFailure("link"))?;
            let orphaned: Vec<BlobId> = unlinked
                .orphaned
                .then_some(unlinked.file_id)
                .into_iter()
                .collect();
            pending_queries::enqueue(&mut tx, &owner, &orphaned).await?;
            tx.commit().await?;
            info!(orphaned = unlinked.orphaned, "version removed");

            let pending = this.release_blobs(&owner, &orphaned).await;
            Ok(RemoveOutcome {
                removed: Vec::new(),
                orphaned,
                pending,
            })
        })
        .await
    }

    /// Retry deletion of up to `limit` queued orphan payloads, oldest first.
    #[tracing::instrument(skip_all, fields(limit = limit))]
    pub async fn sweep_pending_deletes(&self, limit: u32) -> Result<DeleteReport> {
        let this = self.clone();
        detached(async move {
            let queued = {
                let mut conn = this.db.acquire().await?;
                pending_queries::list_pending(&mut conn, limit).await?
            };

            let mut by_owner: BTreeMap<OwnerId, Vec<BlobId>> = BTreeMap::new();
            for entry in queued {
                by_owner.entry(entry.owner_id).or_default().push(entry.file_id);
            }

            let mut report = DeleteReport::default();
            for (owner, file_ids) in by_owner {
                let failed = this.release_blobs(&owner, &file_ids).await;
                report
                    .deleted
                    .extend(file_ids.iter().filter(|id| !failed.contains(id)));
                report.failed.extend(failed);
            }
            info!(
                deleted = report.deleted.len(),
                failed = report.failed.len(),
                "pending deletes swept"
            );
            Ok(report)
        })
        .await
    }

    /// Delete committed orphans from the blob store and clear the confirmed
    /// ones from the ledger. Returns the ids still pending.
    async fn release_blobs(&self, owner: &OwnerId, file_ids: &[BlobId]) -> Vec<BlobId> {
        if file_ids.is_empty() {
            return Vec::new();
        }
        let report = self.storage.delete_many(owner, file_ids).await;
        if !report.failed.is_empty() {
            warn!(owner = %owner, failed = report.failed.len(), "orphaned payloads left pending");
        }
        if !report.deleted.is_empty() {
            let cleared = match self.db.acquire().await {
                Ok(mut conn) => pending_queries::clear(&mut conn, owner, &report.deleted).await,
                Err(e) => Err(e.into()),
            };
            if let Err(e) = cleared {
                // a later sweep deletes them again, which tolerates missing payloads
                warn!(owner = %owner, error = %e, "failed to clear pending deletes");
            }
        }
        report.failed
    }
}
