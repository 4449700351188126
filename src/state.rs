use std::sync::Arc;

use crate::config::ServerConfig;
use crate::typst::TypstCompiler;

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub compiler: Arc<dyn TypstCompiler>,
}

impl AppState {
    pub fn new(config: ServerConfig, compiler: Arc<dyn TypstCompiler>) -> Self {
        Self { config, compiler }
    }
}
