use actix_web::{http::header, web, HttpResponse};
use log::{debug, error, info, warn};

use super::{DataResolver, GenerateError, GenerateRequest, ValidatedRequest};
use crate::state::AppState;
use crate::storage::ArtifactFetcher;
use crate::typst::{compile_typst_with, OUTPUT_FILE_NAME};

#[utoipa::path(
    tag = "Document Generation",
    post,
    path = "/generate",
    request_body = GenerateRequest,
    responses(
        (status = 200, description = "Compiled PDF", content_type = "application/pdf", body = Vec<u8>),
        (status = 400, description = "Malformed or conflicting request", body = String),
        (status = 500, description = "Storage or compilation failure", body = String)
    )
)]
pub async fn generate_document(
    state: web::Data<AppState>,
    body: Result<web::Bytes, actix_web::Error>,
) -> Result<HttpResponse, GenerateError> {
    let body = body.map_err(|e| {
        warn!("Rejected request body: {}", e);
        GenerateError::UnreadableBody(e)
    })?;
    let request: GenerateRequest =
        serde_json::from_slice(&body).map_err(GenerateError::InvalidRequest)?;
    info!(
        "Received generate request for template '{}'",
        request.template_key.as_deref().unwrap_or_default()
    );

    let request = request.validate()?;
    let pdf = run_pipeline(&state, request).await.inspect_err(|e| {
        error!("Failed to generate document: {}", e);
    })?;

    info!("Generated document ({} bytes)", pdf.len());
    Ok(HttpResponse::Ok()
        .content_type("application/pdf")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{OUTPUT_FILE_NAME}\""),
        ))
        .body(pdf))
}

/// Resolve data, fetch the template and compile it.
async fn run_pipeline(state: &AppState, request: ValidatedRequest) -> Result<Vec<u8>, GenerateError> {
    let config = &state.config;
    let fetcher = ArtifactFetcher::new(config);

    let data = DataResolver::new(fetcher, config.max_data_size)
        .resolve(request.data_source)
        .await?;
    debug!("Resolved data ({} top-level keys)", data.as_ref().map_or(0, |d| d.len()));

    let template = fetcher
        .fetch(&request.template_key, config.max_template_size)
        .await
        .map_err(GenerateError::Template)?;
    debug!(
        "Fetched template '{}' ({} bytes)",
        template.key,
        template.bytes.len()
    );

    let pdf = compile_typst_with(state.compiler.as_ref(), &template.bytes, data.as_ref()).await?;
    Ok(pdf)
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/generate", web::post().to(generate_document));
}
