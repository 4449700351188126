//! Logger setup for the binary.

use env_logger::Env;

/// Initialise `env_logger`. `RUST_LOG` wins over the verbose flag when set.
pub fn init(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();
}
