//! Bucket served over HTTP(S).
//!
//! Objects live at `<base>/<key>` and are fetched with a plain `GET`, which covers
//! public S3-style buckets as well as authenticated object endpoints that accept a
//! bearer token (e.g. Supabase Storage).

use super::{validate_key, ObjectReader, ObjectStorage, StorageError, StorageResult};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{StatusCode, Url};
use tokio_util::io::StreamReader;

pub struct HttpBucket {
    base: Url,
    client: reqwest::Client,
    token: Option<String>,
}

impl std::fmt::Debug for HttpBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBucket")
            .field("base", &self.base.as_str())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl HttpBucket {
    pub fn open(mut base: Url, token: Option<&str>) -> StorageResult<Self> {
        if base.cannot_be_a_base() {
            return Err(StorageError::Unavailable(format!(
                "invalid bucket base URL: {base}"
            )));
        }
        // Queries and fragments would be clobbered when joining keys.
        base.set_query(None);
        base.set_fragment(None);

        let client = reqwest::Client::builder()
            .user_agent(concat!("typst-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StorageError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base,
            client,
            token: token.filter(|t| !t.is_empty()).map(str::to_string),
        })
    }

    /// URL of the object stored under `key`, with every path segment percent-encoded.
    pub fn object_url(&self, key: &str) -> StorageResult<Url> {
        validate_key(key)?;

        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| StorageError::InvalidKey {
                key: key.to_string(),
            })?
            .pop_if_empty()
            .extend(key.split('/'));
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ObjectStorage for HttpBucket {
    async fn open_reader(&self, key: &str) -> StorageResult<ObjectReader> {
        let url = self.object_url(key)?;
        log::debug!("GET {}", url);

        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| StorageError::Inaccessible {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(StorageError::NotFound {
                    key: key.to_string(),
                })
            }
            status => {
                return Err(StorageError::Inaccessible {
                    key: key.to_string(),
                    reason: format!("unexpected status {status}"),
                })
            }
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other));
        Ok(Box::new(StreamReader::new(Box::pin(stream))))
    }

    async fn health_check(&self) -> StorageResult<()> {
        // Any HTTP answer proves the endpoint is reachable; only transport errors count.
        self.authorize(self.client.head(self.base.clone()))
            .send()
            .await
            .map(|_| ())
            .map_err(|e| StorageError::Unavailable(e.to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}
