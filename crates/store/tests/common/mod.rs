//! Shared test utilities for document store integration tests
#![allow(dead_code)]

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use doctree_store::{
    BlobStorage, CreatedFile, Database, DocumentService, NewBlob, ObjectStoreConfig, ObjectType,
    OwnerId, TreeNode, TreePath, VersionedFile,
};

pub use doctree_store::single_chunk;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{
    GetOptions, GetResult, ListResult, MultipartUpload, ObjectMeta, ObjectStore, PutMultipartOpts,
    PutOptions, PutPayload, PutResult,
};

/// Set up an in-memory service with a fresh owner and its ROOT
pub async fn setup_test_env() -> (DocumentService, OwnerId) {
    let service = DocumentService::ephemeral().await.unwrap();
    let owner = OwnerId::new();
    service.create_root(&owner).await.unwrap();
    (service, owner)
}

/// Set up a service over a SQLite file and a local blob directory. The
/// returned directory must outlive the service.
pub async fn setup_file_env() -> (DocumentService, OwnerId, tempfile::TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = ObjectStoreConfig::Local {
        path: temp_dir.path().join("blobs"),
    };
    let service = DocumentService::open(&temp_dir.path().join("db.sqlite"), config)
        .await
        .unwrap();
    let owner = OwnerId::new();
    service.create_root(&owner).await.unwrap();
    (service, owner, temp_dir)
}

pub fn path(p: &str) -> TreePath {
    TreePath::parse(p).unwrap()
}

pub fn blob_for(checksum: &str, data: &Bytes) -> NewBlob {
    NewBlob {
        checksum: checksum.to_string(),
        size: data.len() as i64,
    }
}

pub async fn mkdir(service: &DocumentService, owner: &OwnerId, p: &str) -> TreeNode {
    service.create_dir(owner, &path(p)).await.unwrap()
}

pub async fn put(
    service: &DocumentService,
    owner: &OwnerId,
    p: &str,
    checksum: &str,
    content: &'static [u8],
) -> CreatedFile {
    let data = Bytes::from_static(content);
    service
        .create_file(owner, &path(p), blob_for(checksum, &data), single_chunk(data))
        .await
        .unwrap()
}

/// Read a whole version payload back into memory
pub async fn read_version(
    service: &DocumentService,
    owner: &OwnerId,
    version: &VersionedFile,
) -> Bytes {
    let chunks: Vec<Bytes> = service
        .get_version_data(owner, version)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    chunks.concat().into()
}

pub async fn node(service: &DocumentService, owner: &OwnerId, p: &str) -> TreeNode {
    service.resolve(owner, &path(p)).await.unwrap()
}

/// Every path of an owner in user form, sorted by stored path
pub async fn all_paths(db: &Database, owner: &OwnerId) -> Vec<String> {
    let rows: Vec<(TreePath, ObjectType)> =
        sqlx::query_as("SELECT path, object_type FROM tree WHERE owner_id = ?1 ORDER BY path")
            .bind(owner)
            .fetch_all(&**db)
            .await
            .unwrap();
    rows.into_iter().map(|(p, _)| p.to_string()).collect()
}

pub async fn count(db: &Database, table: &str) -> i64 {
    let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(&**db)
        .await
        .unwrap();
    n
}

/// In-memory object store whose deletes can be switched to fail
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: InMemory,
    fail_deletes: AtomicBool,
}

impl FlakyStore {
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

impl fmt::Display for FlakyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FlakyStore")
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn put_opts(
        &self,
        location: &ObjectPath,
        payload: PutPayload,
        opts: PutOptions,
    ) -> object_store::Result<PutResult> {
        self.inner.put_opts(location, payload, opts).await
    }

    async fn put_multipart_opts(
        &self,
        location: &ObjectPath,
        opts: PutMultipartOpts,
    ) -> object_store::Result<Box<dyn MultipartUpload>> {
        self.inner.put_multipart_opts(location, opts).await
    }

    async fn get_opts(
        &self,
        location: &ObjectPath,
        options: GetOptions,
    ) -> object_store::Result<GetResult> {
        self.inner.get_opts(location, options).await
    }

    async fn delete(&self, location: &ObjectPath) -> object_store::Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(object_store::Error::Generic {
                store: "FlakyStore",
                source: "delete refused".into(),
            });
        }
        self.inner.delete(location).await
    }

    fn list(&self, prefix: Option<&ObjectPath>) -> BoxStream<'_, object_store::Result<ObjectMeta>> {
        self.inner.list(prefix).boxed()
    }

    async fn list_with_delimiter(
        &self,
        prefix: Option<&ObjectPath>,
    ) -> object_store::Result<ListResult> {
        self.inner.list_with_delimiter(prefix).await
    }

    async fn copy(&self, from: &ObjectPath, to: &ObjectPath) -> object_store::Result<()> {
        self.inner.copy(from, to).await
    }

    async fn copy_if_not_exists(
        &self,
        from: &ObjectPath,
        to: &ObjectPath,
    ) -> object_store::Result<()> {
        self.inner.copy_if_not_exists(from, to).await
    }
}

/// Service over a [`FlakyStore`], returned alongside for toggling failures
pub async fn setup_flaky_env() -> (DocumentService, OwnerId, Arc<FlakyStore>) {
    let store = Arc::new(FlakyStore::default());
    let db = Database::in_memory().await.unwrap();
    let service = DocumentService::new(db, BlobStorage::from_object_store(store.clone()));
    let owner = OwnerId::new();
    service.create_root(&owner).await.unwrap();
    (service, owner, store)
}
