//! Health module - readiness of the compiler and the bucket.

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use log::{debug, error};
use thiserror::Error;

use crate::config::ServerConfig;
use crate::state::AppState;
use crate::storage::{open_bucket, StorageError};
use crate::typst::{find_executable, TypstCompiler};

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("{0} not found")]
    CompilerNotFound(String),
    #[error("failed to open bucket")]
    BucketUnavailable(#[source] StorageError),
}

impl ResponseError for HealthError {
    fn status_code(&self) -> StatusCode {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Check that the compiler executable resolves on `PATH` and that the bucket opens.
///
/// Neither check compiles or reads anything.
pub async fn check_health(
    config: &ServerConfig,
    compiler: &dyn TypstCompiler,
) -> Result<(), HealthError> {
    let executable = compiler.executable();
    match find_executable(executable) {
        Some(path) => debug!("Compiler resolved to {}", path.display()),
        None => return Err(HealthError::CompilerNotFound(executable.to_string())),
    }

    let reachable = async {
        let bucket = open_bucket(&config.bucket_url, config.bucket_token.as_deref()).await?;
        bucket.health_check().await
    };
    match tokio::time::timeout(config.fetch_timeout, reachable).await {
        Ok(result) => result.map_err(HealthError::BucketUnavailable),
        Err(_) => Err(HealthError::BucketUnavailable(StorageError::Timeout {
            operation: "open bucket".to_string(),
            timeout: config.fetch_timeout,
        })),
    }
}

#[utoipa::path(
    tag = "Health",
    get,
    path = "/health",
    responses(
        (status = 200, description = "Compiler and bucket are available", body = String),
        (status = 503, description = "Compiler missing or bucket unreachable", body = String)
    )
)]
pub async fn health(state: web::Data<AppState>) -> Result<HttpResponse, HealthError> {
    check_health(&state.config, state.compiler.as_ref())
        .await
        .inspect_err(|e| match e {
            HealthError::BucketUnavailable(source) => error!("Health check failed: {}: {}", e, source),
            HealthError::CompilerNotFound(_) => error!("Health check failed: {}", e),
        })?;
    Ok(HttpResponse::Ok().content_type("text/plain; charset=utf-8").body("OK"))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health));
}
