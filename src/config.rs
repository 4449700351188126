//! Process configuration: command-line/environment parsing and the immutable
//! [`ServerConfig`] handed to every component.

use clap::{builder::NonEmptyStringValueParser, Parser, ValueEnum};
use std::sync::Arc;
use std::time::Duration;

use crate::typst::{ContainerTypstCompiler, LocalTypstCompiler, TypstCompiler};

pub const DEFAULT_PORT: u16 = 8080;
/// 1 MiB.
pub const DEFAULT_MAX_TEMPLATE_SIZE: u64 = 1024 * 1024;
/// 10 MiB.
pub const DEFAULT_MAX_DATA_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_TYPST_IMAGE: &str = "ghcr.io/typst/typst:0.14.2";

/// Per-process configuration shared read-only by all requests.
#[derive(Clone)]
pub struct ServerConfig {
    pub bucket_url: String,
    pub bucket_token: Option<String>,
    pub max_template_size: u64,
    pub max_data_size: u64,
    pub fetch_timeout: Duration,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bucket_url", &self.bucket_url)
            .field("bucket_token", &self.bucket_token.as_ref().map(|_| "<redacted>"))
            .field("max_template_size", &self.max_template_size)
            .field("max_data_size", &self.max_data_size)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish()
    }
}

impl ServerConfig {
    pub fn new(bucket_url: impl Into<String>) -> Self {
        Self {
            bucket_url: bucket_url.into(),
            bucket_token: None,
            max_template_size: DEFAULT_MAX_TEMPLATE_SIZE,
            max_data_size: DEFAULT_MAX_DATA_SIZE,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Set both size ceilings. A zero value keeps the default for that ceiling.
    pub fn with_limits(mut self, max_template_size: u64, max_data_size: u64) -> Self {
        self.max_template_size = if max_template_size == 0 {
            DEFAULT_MAX_TEMPLATE_SIZE
        } else {
            max_template_size
        };
        self.max_data_size = if max_data_size == 0 {
            DEFAULT_MAX_DATA_SIZE
        } else {
            max_data_size
        };
        self
    }

    pub fn with_bucket_token(mut self, token: Option<String>) -> Self {
        self.bucket_token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Largest accepted `/generate` body: the inline data ceiling plus room for the
    /// surrounding request envelope.
    pub fn max_request_size(&self) -> usize {
        const ENVELOPE_HEADROOM: u64 = 64 * 1024;
        usize::try_from(self.max_data_size.saturating_add(ENVELOPE_HEADROOM)).unwrap_or(usize::MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CompilerKind {
    /// Run the `typst` binary installed on this host
    Local,
    /// Run typst inside a throwaway container
    Container,
}

/// Generate PDFs from Typst templates stored in object storage.
#[derive(Debug, Parser)]
#[command(name = "typst-gateway", version)]
pub struct Cli {
    /// HTTP port to listen on (a numeric PORT environment variable takes precedence)
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Verbose output (debug logging)
    #[arg(short, long)]
    pub verbose: bool,

    /// URL of the bucket holding templates and data (file://, http://, https://)
    #[arg(long, env = "BUCKET_URL", value_parser = NonEmptyStringValueParser::new())]
    pub bucket_url: String,

    /// Bearer token sent to HTTP buckets
    #[arg(long, env = "BUCKET_TOKEN", hide_env_values = true)]
    pub bucket_token: Option<String>,

    /// Maximum template size in bytes (unset, invalid or non-positive = 1048576)
    #[arg(
        long,
        env = "MAX_TEMPLATE_SIZE",
        default_value_t = 0,
        allow_hyphen_values = true,
        value_parser = parse_size_ceiling
    )]
    pub max_template_size: u64,

    /// Maximum data file size in bytes (unset, invalid or non-positive = 10485760)
    #[arg(
        long,
        env = "MAX_DATA_SIZE",
        default_value_t = 0,
        allow_hyphen_values = true,
        value_parser = parse_size_ceiling
    )]
    pub max_data_size: u64,

    /// Where typst runs
    #[arg(long, env = "TYPST_COMPILER", value_enum, default_value_t = CompilerKind::Local)]
    pub compiler: CompilerKind,

    /// typst executable used by the local compiler
    #[arg(long, env = "TYPST_BIN", default_value = "typst")]
    pub typst_bin: String,

    /// Image used by the container compiler
    #[arg(long, env = "TYPST_IMAGE", default_value = DEFAULT_TYPST_IMAGE)]
    pub typst_image: String,

    /// Container CLI used by the container compiler
    #[arg(long, env = "CONTAINER_RUNTIME", default_value = "docker")]
    pub container_runtime: String,
}

/// Size ceilings never fail startup: anything that is not a positive integer
/// maps to 0, which [`ServerConfig::with_limits`] turns into the default.
fn parse_size_ceiling(value: &str) -> Result<u64, String> {
    Ok(value.trim().parse::<i64>().map_or(0, |n| n.max(0) as u64))
}

/// `PORT` overrides the flag, but only when it is a valid port number.
fn resolve_port(flag: u16, env: Option<&str>) -> u16 {
    env.and_then(|value| value.trim().parse().ok()).unwrap_or(flag)
}

impl Cli {
    pub fn listen_port(&self) -> u16 {
        resolve_port(self.port, std::env::var("PORT").ok().as_deref())
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::new(self.bucket_url.clone())
            .with_bucket_token(self.bucket_token.clone())
            .with_limits(self.max_template_size, self.max_data_size)
    }

    pub fn build_compiler(&self) -> Arc<dyn TypstCompiler> {
        match self.compiler {
            CompilerKind::Local => Arc::new(LocalTypstCompiler::new(self.typst_bin.clone())),
            CompilerKind::Container => Arc::new(ContainerTypstCompiler::new(
                self.container_runtime.clone(),
                self.typst_image.clone(),
            )),
        }
    }
}
