//! Where a document's JSON data comes from.

use log::debug;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::storage::{ArtifactFetcher, StorageError};

/// A JSON object handed to the template as `data.json`.
pub type DocumentData = Map<String, Value>;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("cannot specify both 'data' and 'dataKey'")]
    ConflictingDataSource,
    #[error(transparent)]
    Fetch(#[from] StorageError),
    #[error("invalid JSON: {source}")]
    InvalidJson {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// The data source a request asked for. At most one is ever set.
#[derive(Debug, Clone, PartialEq)]
pub enum DataSource {
    None,
    Inline(DocumentData),
    Stored(String),
}

impl DataSource {
    /// Combine the two optional request fields, rejecting requests that set both.
    ///
    /// An empty data key counts as unset.
    pub fn from_parts(
        inline: Option<DocumentData>,
        key: Option<String>,
    ) -> Result<Self, DataError> {
        let key = key.filter(|k| !k.is_empty());
        match (inline, key) {
            (Some(_), Some(_)) => Err(DataError::ConflictingDataSource),
            (Some(data), None) => Ok(Self::Inline(data)),
            (None, Some(key)) => Ok(Self::Stored(key)),
            (None, None) => Ok(Self::None),
        }
    }
}

/// Turns a [`DataSource`] into the data passed to the compiler.
pub struct DataResolver<'a> {
    fetcher: ArtifactFetcher<'a>,
    max_data_size: u64,
}

impl<'a> DataResolver<'a> {
    pub fn new(fetcher: ArtifactFetcher<'a>, max_data_size: u64) -> Self {
        Self {
            fetcher,
            max_data_size,
        }
    }

    pub async fn resolve(&self, source: DataSource) -> Result<Option<DocumentData>, DataError> {
        match source {
            DataSource::None => Ok(None),
            DataSource::Inline(data) => Ok(Some(data)),
            DataSource::Stored(key) => {
                let artifact = self.fetcher.fetch(&key, self.max_data_size).await?;
                if artifact.is_at_limit() {
                    debug!(
                        "Data '{}' reached the {} byte ceiling and may be truncated",
                        key, artifact.max_bytes
                    );
                }
                // A stored `null` means the same as no data at all.
                serde_json::from_slice::<Option<DocumentData>>(&artifact.bytes)
                    .map_err(|source| DataError::InvalidJson { key, source })
            }
        }
    }
}
