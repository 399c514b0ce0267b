use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::{BlobId, NodeId, ObjectType, OwnerId, Timestamp, TreePath};

/// One entry of the hierarchical namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TreeNode {
    pub object_id: NodeId,
    pub object_type: ObjectType,
    pub path: TreePath,
    pub owner_id: OwnerId,
    pub created_at: Timestamp,
}

/// Client supplied metadata for a new blob version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBlob {
    pub checksum: String,
    pub size: i64,
}

/// A row of `file_view`: a blob together with the link that attaches it to
/// a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct VersionedFile {
    pub object_id: NodeId,
    pub file_id: BlobId,
    pub checksum: String,
    pub size: i64,
    pub owner_id: OwnerId,
    pub uploaded_at: Timestamp,
    pub linked_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Link {
    pub object_id: NodeId,
    pub file_id: BlobId,
    pub linked_at: Timestamp,
}

/// Result of removing a link. `orphaned` is true when it was the last link
/// to the blob, in which case the blob row is gone as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Unlinked {
    pub file_id: BlobId,
    pub orphaned: bool,
}

/// Source to destination identity pair produced by a tree copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CopiedNode {
    pub source_id: NodeId,
    pub destination_id: NodeId,
    pub object_type: ObjectType,
}
