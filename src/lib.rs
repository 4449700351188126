use actix_web::http::KeepAlive;
use actix_web::middleware::Compress;
use actix_web::{web, App, HttpServer};
use actix_web_prometheus::PrometheusMetricsBuilder;
use anyhow::{anyhow, Context};
use std::time::Duration;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod config;
pub mod generate;
pub mod health;
pub mod logging;
pub mod state;
pub mod storage;
pub mod typst;

pub use crate::config::{Cli, ServerConfig};
pub use crate::state::AppState;

/// Register every HTTP route of the service.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.configure(generate::config).configure(health::config);
}

/// Body size limit for extractors, derived from the data ceiling.
pub fn payload_config(config: &ServerConfig) -> web::PayloadConfig {
    web::PayloadConfig::new(config.max_request_size())
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    #[derive(OpenApi)]
    #[openapi(
        paths(crate::generate::handlers::generate_document, crate::health::health),
        components(schemas(generate::GenerateRequest)),
        tags(
            (name = "Document Generation", description = "Compile stored Typst templates to PDF."),
            (name = "Health", description = "Readiness of the compiler and the bucket.")
        )
    )]
    struct ApiDoc;

    let config = cli.server_config();
    let compiler = cli.build_compiler();
    log::debug!("Using {:?}", config);
    log::info!(
        "Templates from {} (template limit {} bytes, data limit {} bytes), compiler '{}'",
        config.bucket_url,
        config.max_template_size,
        config.max_data_size,
        compiler.executable()
    );

    let app_state = web::Data::new(AppState::new(config.clone(), compiler));

    let port = cli.listen_port();
    let prometheus = PrometheusMetricsBuilder::new("typst_gateway")
        .endpoint("/metrics")
        .build()
        .map_err(|e| anyhow!("failed to create Prometheus metrics middleware: {e}"))?;

    log::info!("Starting server at http://0.0.0.0:{}", port);

    HttpServer::new(move || {
        App::new()
            .wrap(Compress::default())
            .wrap(prometheus.clone())
            .app_data(app_state.clone())
            .app_data(payload_config(&config))
            .configure(routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
    })
    .keep_alive(KeepAlive::Os)
    .client_request_timeout(Duration::from_secs(10))
    .shutdown_timeout(10)
    .bind(("0.0.0.0", port))
    .with_context(|| format!("failed to bind port {port}"))?
    .run()
    .await
    .context("server error")?;

    log::info!("Server stopped");
    Ok(())
}
