//! Blob hosting for assets the platform should fetch by URL.

use std::collections::HashMap;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::{ObjectStoreExt, WriteMultipart};
use thiserror::Error;
use tokio::io::AsyncReadExt;

/// Bytes read from the staged file per write into the multipart upload.
const READ_CHUNK_BYTES: usize = 1024 * 1024;
/// Parts allowed in flight before reading more of the file.
const MAX_PARTS_IN_FLIGHT: usize = 4;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("bucket '{0}' is not configured")]
    UnknownBucket(String),

    #[error("object store error: {0}")]
    Store(#[from] object_store::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Stores a local file under `bucket/key` and returns a URL the platform can
/// fetch.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put_file(&self, bucket: &str, key: &str, file: &FsPath)
        -> Result<String, BlobError>;
}

struct Bucket {
    store: Arc<dyn object_store::ObjectStore>,
    public_base_url: String,
}

/// [`BlobStore`] over one `object_store` backend per bucket.
#[derive(Default)]
pub struct ObjectStoreBlobStore {
    buckets: HashMap<String, Bucket>,
}

impl ObjectStoreBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `store` as the backend for `bucket`; objects are served from
    /// `{public_base_url}/{key}`.
    #[must_use]
    pub fn with_bucket(
        mut self,
        bucket: impl Into<String>,
        store: Arc<dyn object_store::ObjectStore>,
        public_base_url: impl Into<String>,
    ) -> Self {
        self.buckets.insert(
            bucket.into(),
            Bucket {
                store,
                public_base_url: public_base_url.into(),
            },
        );
        self
    }

    /// S3 bucket configured from the standard `AWS_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::Store`] if the S3 client cannot be built.
    pub fn s3_from_env(bucket: &str) -> Result<Self, BlobError> {
        let store = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .build()?;
        let public_base_url = format!("https://{bucket}.s3.amazonaws.com");
        Ok(Self::new().with_bucket(bucket, Arc::new(store), public_base_url))
    }
}

#[async_trait]
impl BlobStore for ObjectStoreBlobStore {
    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        file: &FsPath,
    ) -> Result<String, BlobError> {
        let target = self
            .buckets
            .get(bucket)
            .ok_or_else(|| BlobError::UnknownBucket(bucket.to_owned()))?;

        let location = Path::from(key);
        let upload = target.store.put_multipart(&location).await?;
        let mut writer = WriteMultipart::new(upload);

        let size = match copy_file(&mut writer, file).await {
            Ok(size) => size,
            Err(e) => {
                if let Err(abort) = writer.abort().await {
                    tracing::warn!(bucket, key, error = %abort, "failed to abort multipart upload");
                }
                return Err(e);
            }
        };
        writer.finish().await?;

        tracing::info!(bucket, key, size_bytes = size, "asset hosted in blob store");
        Ok(format!(
            "{}/{}",
            target.public_base_url.trim_end_matches('/'),
            location
        ))
    }
}

/// Streams `path` into `writer` without holding the whole file in memory.
async fn copy_file(writer: &mut WriteMultipart, path: &FsPath) -> Result<u64, BlobError> {
    let io_error = |source| BlobError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = tokio::fs::File::open(path).await.map_err(io_error)?;
    let mut buf = vec![0u8; READ_CHUNK_BYTES];
    let mut size = 0u64;
    loop {
        let read = file.read(&mut buf).await.map_err(io_error)?;
        if read == 0 {
            return Ok(size);
        }
        writer.wait_for_capacity(MAX_PARTS_IN_FLIGHT).await?;
        writer.write(&buf[..read]);
        size += read as u64;
    }
}
