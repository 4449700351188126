//! Size-bounded artifact fetching.

use super::{open_bucket, StorageError, StorageResult};
use crate::config::ServerConfig;
use log::debug;
use std::time::Duration;
use tokio::io::AsyncReadExt;

/// Bytes read from the bucket, along with the key and bound used to read them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArtifact {
    pub key: String,
    pub max_bytes: u64,
    pub bytes: Vec<u8>,
}

impl FetchedArtifact {
    /// Whether the object may have been cut off at `max_bytes`.
    pub fn is_at_limit(&self) -> bool {
        self.bytes.len() as u64 >= self.max_bytes
    }
}

/// Reads single objects from the configured bucket.
///
/// Every call opens its own bucket connection and drops it before returning.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactFetcher<'a> {
    bucket_url: &'a str,
    bucket_token: Option<&'a str>,
    timeout: Duration,
}

impl<'a> ArtifactFetcher<'a> {
    pub fn new(config: &'a ServerConfig) -> Self {
        Self {
            bucket_url: &config.bucket_url,
            bucket_token: config.bucket_token.as_deref(),
            timeout: config.fetch_timeout,
        }
    }

    /// Fetch at most `max_bytes` of the object stored under `key`.
    ///
    /// Larger objects are truncated to exactly `max_bytes`, not rejected. The whole
    /// operation, including opening the bucket, is bounded by the fetch timeout.
    pub async fn fetch(&self, key: &str, max_bytes: u64) -> StorageResult<FetchedArtifact> {
        match tokio::time::timeout(self.timeout, self.fetch_unbounded(key, max_bytes)).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout {
                operation: format!("fetch {key}"),
                timeout: self.timeout,
            }),
        }
    }

    async fn fetch_unbounded(&self, key: &str, max_bytes: u64) -> StorageResult<FetchedArtifact> {
        let bucket = open_bucket(self.bucket_url, self.bucket_token).await?;
        let reader = bucket.open_reader(key).await?;

        let mut bytes = Vec::new();
        reader
            .take(max_bytes)
            .read_to_end(&mut bytes)
            .await
            .map_err(|source| StorageError::Read {
                key: key.to_string(),
                source,
            })?;

        debug!(
            "Fetched '{}' from {} bucket ({} bytes, limit {})",
            key,
            bucket.backend_name(),
            bytes.len(),
            max_bytes
        );

        Ok(FetchedArtifact {
            key: key.to_string(),
            max_bytes,
            bytes,
        })
    }
}
