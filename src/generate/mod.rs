//! Generate module - the `POST /generate` pipeline.
//!
//! A request moves through validation, data resolution, template fetch and
//! compilation; any step can end it with a [`GenerateError`].
//! - `data` - inline or stored JSON data for the template
//! - `handlers` - HTTP entry point and route registration

pub mod data;
pub mod handlers;

pub use data::{DataError, DataResolver, DataSource, DocumentData};
pub use handlers::config;

use actix_web::http::StatusCode;
use actix_web::ResponseError;
use serde::Deserialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::typst::CompileError;

/// Body of `POST /generate`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    /// Key of the Typst template in the bucket. Missing, `null` and `""` are all rejected.
    #[schema(example = "invoice.typ")]
    pub template_key: Option<String>,
    /// Inline data, written to `data.json` next to the template.
    #[schema(value_type = Option<Object>)]
    pub data: Option<DocumentData>,
    /// Key of a JSON object in the bucket to use as data instead of `data`.
    #[schema(example = "invoice-data.json")]
    pub data_key: Option<String>,
}

/// A request whose shape has been checked; only storage and compilation can fail now.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub template_key: String,
    pub data_source: DataSource,
}

impl GenerateRequest {
    pub fn validate(self) -> Result<ValidatedRequest, GenerateError> {
        let template_key = self
            .template_key
            .filter(|key| !key.is_empty())
            .ok_or(GenerateError::MissingTemplateKey)?;
        let data_source = DataSource::from_parts(self.data, self.data_key)?;
        Ok(ValidatedRequest {
            template_key,
            data_source,
        })
    }
}

/// Everything that can end a generate request early. Rendered as plain text.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("invalid request")]
    InvalidRequest(#[source] serde_json::Error),
    /// Body could not be read, usually because it exceeds the payload limit.
    #[error("invalid request")]
    UnreadableBody(#[source] actix_web::Error),
    #[error("templateKey is required")]
    MissingTemplateKey,
    #[error("cannot specify both 'data' and 'dataKey'")]
    ConflictingDataSource,
    #[error("failed to fetch data: {0}")]
    Data(#[source] DataError),
    #[error("failed to fetch template: {0}")]
    Template(#[source] crate::storage::StorageError),
    #[error(transparent)]
    Compile(#[from] CompileError),
}

impl From<DataError> for GenerateError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::ConflictingDataSource => Self::ConflictingDataSource,
            other => Self::Data(other),
        }
    }
}

impl ResponseError for GenerateError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_)
            | Self::UnreadableBody(_)
            | Self::MissingTemplateKey
            | Self::ConflictingDataSource => StatusCode::BAD_REQUEST,
            Self::Data(_) | Self::Template(_) | Self::Compile(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
