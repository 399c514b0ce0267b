//! Multi-tenant versioned file tree
//!
//! This crate keeps a hierarchical namespace of directories and files per
//! owner in SQLite, and stores every file version as an immutable payload in
//! pluggable object storage (S3/MinIO/local filesystem/memory).
//!
//! # Features
//!
//! - Materialized paths: subtree move, copy and delete are single statements
//! - Copy by reference: copied files share their blobs, nothing is duplicated
//! - Reference counted blobs, released when their last link goes away
//! - Keyset pagination over version history
//!
//! # Example
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use doctree_store::{single_chunk, DocumentService, NewBlob, OwnerId, TreePath};
//!
//! # async fn example() -> Result<(), doctree_store::StoreError> {
//! let service = DocumentService::ephemeral().await?;
//! let owner = OwnerId::new();
//! service.create_root(&owner).await?;
//!
//! let data = Bytes::from_static(b"hello");
//! let blob = NewBlob { checksum: "c0".into(), size: data.len() as i64 };
//! service
//!     .create_file(&owner, &TreePath::parse("/hello.txt")?, blob, single_chunk(data))
//!     .await?;
//!
//! for entry in service.list(&owner, &TreePath::root()).await? {
//!     println!("{} {:?}", entry.node.path, entry.newest.map(|v| v.checksum));
//! }
//! # Ok(())
//! # }
//! ```

pub mod database;
mod document;
mod error;
mod storage;
pub mod types;

pub use database::models::{CopiedNode, Link, NewBlob, TreeNode, Unlinked, VersionedFile};
pub use database::pending_queries::PendingDelete;
pub use database::Database;
pub use document::{CreatedFile, DocumentService, RemoveOutcome, TreeEntry, VersionPage};
pub use error::{Result, StoreError};
pub use storage::{single_chunk, BlobStorage, ByteStream, DeleteReport, ObjectStoreConfig};
pub use types::{
    BlobId, NodeId, ObjectType, OwnerId, PathError, Timestamp, TreePath, UnknownObjectType,
};
