//! Tracing subscriber setup.

use personacast_core::config::{LogFormat, LoggingConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directives for a verbosity count.
///
/// `-v` and `-vv` override the configured level; `RUST_LOG` overrides both.
pub fn default_directives(verbose: u8, config: &LoggingConfig) -> String {
    match verbose {
        0 => format!("personacast={}", config.level.as_str()),
        1 => "personacast=debug,tower_http=debug".to_string(),
        _ => "personacast=trace,tower_http=trace".to_string(),
    }
}

/// Install the global subscriber. Logs go to stderr.
pub fn init(verbose: u8, config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directives(verbose, config).into());
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}
