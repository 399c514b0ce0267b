//! Object storage backend for blob payloads (S3/MinIO/local filesystem/memory).
//!
//! Payloads are keyed `{owner_id}.{file_id}`; no part of the key comes from a
//! user supplied path.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::buffered::BufWriter;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::{Result, StoreError};
use crate::types::{BlobId, OwnerId};

/// Configuration for the object storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectStoreConfig {
    /// In-memory storage (for testing)
    #[default]
    Memory,

    /// Local filesystem storage
    Local {
        /// Path to the storage directory
        path: PathBuf,
    },

    /// S3-compatible storage (AWS S3, MinIO, etc.)
    S3 {
        /// S3 endpoint URL (e.g., "http://localhost:9000" for MinIO)
        endpoint: String,
        /// Access key ID
        access_key: String,
        /// Secret access key
        secret_key: String,
        /// Bucket name
        bucket: String,
        /// Optional region (defaults to "us-east-1")
        region: Option<String>,
    },
}

/// Outcome of a batched delete. Ids are partitioned, never dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: Vec<BlobId>,
    pub failed: Vec<BlobId>,
}

/// Payload bytes in chunks, as uploaded or as read back.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// A payload that is already in memory, as a one-chunk stream.
pub fn single_chunk(data: impl Into<Bytes>) -> ByteStream {
    let data = data.into();
    futures::stream::once(async move { Ok(data) }).boxed()
}

/// Blob payload storage shared by every tenant.
#[derive(Debug, Clone)]
pub struct BlobStorage {
    inner: Arc<dyn ObjectStore>,
}

impl BlobStorage {
    /// Create a new storage backend from configuration.
    pub async fn new(config: ObjectStoreConfig) -> Result<Self> {
        let inner: Arc<dyn ObjectStore> = match &config {
            ObjectStoreConfig::Memory => Arc::new(InMemory::new()),

            ObjectStoreConfig::Local { path } => {
                tokio::fs::create_dir_all(path).await?;
                Arc::new(
                    LocalFileSystem::new_with_prefix(path)
                        .map_err(|e| StoreError::InvalidConfig(e.to_string()))?,
                )
            }

            ObjectStoreConfig::S3 {
                endpoint,
                access_key,
                secret_key,
                bucket,
                region,
            } => {
                let builder = AmazonS3Builder::new()
                    .with_endpoint(endpoint)
                    .with_access_key_id(access_key)
                    .with_secret_access_key(secret_key)
                    .with_bucket_name(bucket)
                    .with_region(region.as_deref().unwrap_or("us-east-1"))
                    .with_allow_http(endpoint.starts_with("http://"));

                let store: Arc<dyn ObjectStore> = Arc::new(
                    builder
                        .build()
                        .map_err(|e| StoreError::InvalidConfig(e.to_string()))?,
                );

                // Fail fast if the bucket doesn't exist
                let prefix = ObjectPath::from("");
                let mut stream = store.list(Some(&prefix));
                match stream.try_next().await {
                    Ok(_) => {}
                    Err(object_store::Error::NotFound { .. }) => {
                        return Err(StoreError::BucketNotFound(bucket.clone()));
                    }
                    Err(e) => {
                        let msg = e.to_string();
                        if msg.contains("NoSuchBucket")
                            || msg.contains("bucket") && msg.contains("not")
                        {
                            return Err(StoreError::BucketNotFound(bucket.clone()));
                        }
                        return Err(e.into());
                    }
                }
                drop(stream);

                store
            }
        };

        Ok(Self { inner })
    }

    /// In-memory backend.
    pub fn memory() -> Self {
        Self {
            inner: Arc::new(InMemory::new()),
        }
    }

    /// Wrap an already built store.
    pub fn from_object_store(inner: Arc<dyn ObjectStore>) -> Self {
        Self { inner }
    }

    /// The backing store, for listing and diagnostics.
    pub fn object_store(&self) -> &Arc<dyn ObjectStore> {
        &self.inner
    }

    fn blob_path(owner: &OwnerId, file_id: &BlobId) -> ObjectPath {
        ObjectPath::from(format!("{owner}.{file_id}"))
    }

    /// Recover the blob id from a key or from a backend specific location
    /// ending in the key.
    fn parse_blob_key(location: &str) -> Option<BlobId> {
        let (_, file_id) = location.rsplit_once('.')?;
        file_id.parse().ok()
    }

    pub async fn put(&self, owner: &OwnerId, file_id: &BlobId, data: Bytes) -> Result<()> {
        let path = Self::blob_path(owner, file_id);
        self.inner.put(&path, data.into()).await?;
        Ok(())
    }

    /// Write a payload chunk by chunk. Small payloads go out as one put,
    /// larger ones as a multipart upload. Returns the number of bytes written.
    pub async fn put_stream(
        &self,
        owner: &OwnerId,
        file_id: &BlobId,
        mut data: ByteStream,
    ) -> Result<u64> {
        let path = Self::blob_path(owner, file_id);
        let mut writer = BufWriter::new(Arc::clone(&self.inner), path);
        let mut written = 0u64;
        while let Some(chunk) = data.try_next().await? {
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.shutdown().await?;
        Ok(written)
    }

    /// Stream a payload back. `None` if it does not exist.
    pub async fn get_stream(
        &self,
        owner: &OwnerId,
        file_id: &BlobId,
    ) -> Result<Option<ByteStream>> {
        let path = Self::blob_path(owner, file_id);
        match self.inner.get(&path).await {
            Ok(result) => Ok(Some(result.into_stream().map_err(std::io::Error::from).boxed())),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, owner: &OwnerId, file_id: &BlobId) -> Result<Option<Bytes>> {
        let path = Self::blob_path(owner, file_id);
        match self.inner.get(&path).await {
            Ok(result) => {
                let bytes = result.bytes().await?;
                Ok(Some(bytes))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, owner: &OwnerId, file_id: &BlobId) -> Result<bool> {
        let path = Self::blob_path(owner, file_id);
        match self.inner.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete one payload. A missing payload counts as deleted.
    pub async fn delete(&self, owner: &OwnerId, file_id: &BlobId) -> Result<()> {
        let path = Self::blob_path(owner, file_id);
        match self.inner.delete(&path).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete many payloads of one owner through the store's batched delete.
    ///
    /// Individual failures are logged and reported in
    /// [`DeleteReport::failed`] rather than returned as an error.
    pub async fn delete_many(&self, owner: &OwnerId, file_ids: &[BlobId]) -> DeleteReport {
        if file_ids.is_empty() {
            return DeleteReport::default();
        }

        let locations = futures::stream::iter(
            file_ids
                .iter()
                .map(|file_id| Ok::<_, object_store::Error>(Self::blob_path(owner, file_id)))
                .collect::<Vec<_>>(),
        )
        .boxed();
        let results: Vec<_> = self.inner.delete_stream(locations).collect().await;

        let mut confirmed = HashSet::new();
        for result in results {
            match result {
                Ok(path) => {
                    if let Some(file_id) = Self::parse_blob_key(path.as_ref()) {
                        confirmed.insert(file_id);
                    }
                }
                Err(object_store::Error::NotFound { path, .. }) => {
                    if let Some(file_id) = Self::parse_blob_key(&path) {
                        confirmed.insert(file_id);
                    }
                }
                Err(e) => {
                    tracing::warn!(owner = %owner, error = %e, "blob delete failed");
                }
            }
        }

        let (deleted, failed) = file_ids
            .iter()
            .copied()
            .partition(|file_id| confirmed.contains(file_id));
        DeleteReport { deleted, failed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = BlobStorage::memory();
        let owner = OwnerId::new();
        let file_id = BlobId::new();
        let data = Bytes::from("hello world");

        storage.put(&owner, &file_id, data.clone()).await.unwrap();
        let retrieved = storage.get(&owner, &file_id).await.unwrap().unwrap();
        assert_eq!(retrieved, data);
        assert!(storage.exists(&owner, &file_id).await.unwrap());

        // keys are owner scoped
        assert!(storage.get(&OwnerId::new(), &file_id).await.unwrap().is_none());

        storage.delete(&owner, &file_id).await.unwrap();
        assert!(!storage.exists(&owner, &file_id).await.unwrap());
        // already gone
        storage.delete(&owner, &file_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_local_storage_key_layout() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = ObjectStoreConfig::Local {
            path: temp_dir.path().to_path_buf(),
        };
        let storage = BlobStorage::new(config).await.unwrap();
        let owner = OwnerId::new();
        let file_id = BlobId::new();

        storage
            .put(&owner, &file_id, Bytes::from("test data"))
            .await
            .unwrap();

        let on_disk = temp_dir.path().join(format!("{owner}.{file_id}"));
        assert!(on_disk.exists());
    }

    #[tokio::test]
    async fn test_delete_many_partitions_ids() {
        let storage = BlobStorage::memory();
        let owner = OwnerId::new();
        let stored: Vec<_> = (0..3).map(|_| BlobId::new()).collect();
        for file_id in &stored {
            storage.put(&owner, file_id, Bytes::from("x")).await.unwrap();
        }
        let never_stored = BlobId::new();
        let mut ids = stored.clone();
        ids.push(never_stored);

        let report = storage.delete_many(&owner, &ids).await;
        assert!(report.failed.is_empty());
        assert_eq!(report.deleted, ids);
        for file_id in &stored {
            assert!(!storage.exists(&owner, file_id).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_streamed_put_and_get() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = ObjectStoreConfig::Local {
            path: temp_dir.path().to_path_buf(),
        };
        let storage = BlobStorage::new(config).await.unwrap();
        let owner = OwnerId::new();
        let file_id = BlobId::new();

        // larger than one buffered part, so the upload goes multipart
        let chunk = Bytes::from(vec![7u8; 1024 * 1024]);
        let chunks: Vec<std::io::Result<Bytes>> = (0..12).map(|_| Ok(chunk.clone())).collect();
        let written = storage
            .put_stream(&owner, &file_id, futures::stream::iter(chunks).boxed())
            .await
            .unwrap();
        assert_eq!(written, 12 * 1024 * 1024);

        let stream = storage.get_stream(&owner, &file_id).await.unwrap().unwrap();
        let read: Vec<Bytes> = stream.try_collect().await.unwrap();
        let total: usize = read.iter().map(|b| b.len()).sum();
        assert_eq!(total, 12 * 1024 * 1024);
        assert!(read.iter().all(|b| b.iter().all(|&x| x == 7)));

        let empty = BlobId::new();
        let written = storage
            .put_stream(&owner, &empty, single_chunk(Bytes::new()))
            .await
            .unwrap();
        assert_eq!(written, 0);
        assert!(storage.exists(&owner, &empty).await.unwrap());
        assert!(storage
            .get_stream(&owner, &BlobId::new())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_failed_stream_surfaces_error() {
        let storage = BlobStorage::memory();
        let owner = OwnerId::new();
        let chunks: Vec<std::io::Result<Bytes>> = vec![
            Ok(Bytes::from("partial")),
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "client went away")),
        ];
        let err = storage
            .put_stream(&owner, &BlobId::new(), futures::stream::iter(chunks).boxed())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }

    #[test]
    fn test_config_toml() {
        let config: ObjectStoreConfig = toml::from_str(
            r#"
            type = "local"
            path = "/var/lib/doctree/blobs"
            "#,
        )
        .unwrap();
        assert_eq!(
            config,
            ObjectStoreConfig::Local {
                path: PathBuf::from("/var/lib/doctree/blobs")
            }
        );
    }
}
