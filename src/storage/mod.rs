//! Storage module - key-addressable byte stores ("buckets") for templates and data.
//!
//! A bucket is opened from a URL for every logical operation and dropped afterwards:
//! - `file` - directory-backed bucket on the local filesystem
//! - `http` - objects served over HTTP(S) below a base URL
//! - `fetch` - size-bounded, time-bounded reads on top of either backend

pub mod fetch;
pub mod filesystem;
pub mod http;

pub use fetch::{ArtifactFetcher, FetchedArtifact};
pub use filesystem::FilesystemBucket;
pub use http::HttpBucket;

use async_trait::async_trait;
use reqwest::Url;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Errors raised while opening a bucket or reading an object from it.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("open bucket: {0}")]
    Unavailable(String),
    #[error("open key {key}: object not found")]
    NotFound { key: String },
    #[error("open key {key}: {reason}")]
    Inaccessible { key: String, reason: String },
    #[error("open key {key}: invalid key")]
    InvalidKey { key: String },
    #[error("read {key}: {source}")]
    Read {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{operation} timed out after {}s", .timeout.as_secs())]
    Timeout {
        operation: String,
        timeout: Duration,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Streaming reader over a single stored object.
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Open a read stream for `key`.
    async fn open_reader(&self, key: &str) -> StorageResult<ObjectReader>;

    /// Lightweight reachability check used by the health endpoint.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str;
}

/// Open the bucket addressed by `bucket_url`.
///
/// The scheme selects the backend. `token` is only used by HTTP buckets, where it is
/// sent as a bearer token.
pub async fn open_bucket(
    bucket_url: &str,
    token: Option<&str>,
) -> StorageResult<Box<dyn ObjectStorage>> {
    let url = Url::parse(bucket_url)
        .map_err(|e| StorageError::Unavailable(format!("invalid bucket URL {bucket_url}: {e}")))?;

    match url.scheme() {
        "file" => {
            let root = url.to_file_path().map_err(|_| {
                StorageError::Unavailable(format!("invalid file bucket URL: {bucket_url}"))
            })?;
            Ok(Box::new(FilesystemBucket::open(root).await?))
        }
        "http" | "https" => Ok(Box::new(HttpBucket::open(url, token)?)),
        other => Err(StorageError::Unavailable(format!(
            "unsupported bucket scheme: {other}"
        ))),
    }
}

/// Reject keys that could escape the bucket root or that address nothing.
pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.starts_with('\\')
        || key.split(['/', '\\']).any(|segment| segment == "..");

    if invalid {
        return Err(StorageError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(())
}
