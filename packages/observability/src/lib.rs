//! # Observability
//!
//! Process-wide logging setup shared by the SNOTI binaries.
//!
//! Library crates only use `tracing` macros. A binary calls
//! [`init_with_config`] once at startup to decide where events go:
//!
//! - no log path: compact, human-readable lines on stderr
//! - a log path: one JSON object per line appended to that file
//!   (optionally mirrored to stderr)
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "snoti-trigger".into(),
//!     default_level: "debug".into(),
//!     ..Default::default()
//! })?;
//! tracing::info!("ready");
//! ```
//!
//! `RUST_LOG` always takes precedence over `default_level`.

mod file;
mod json_layer;

pub use file::{default_log_path, LogFileWriter};
pub use json_layer::{JsonLayer, LogEntry};

use std::io;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, written into every JSON line.
    pub service_name: String,

    /// Default filter (e.g. "info", "snoti_connection=debug").
    /// Overridden by `RUST_LOG`.
    pub default_level: String,

    /// Append JSONL to this file instead of writing to stderr.
    pub log_path: Option<PathBuf>,

    /// With a log path, also write compact lines to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// Fails if the log file cannot be opened or a global subscriber is
/// already installed.
pub fn init_with_config(config: LogConfig) -> io::Result<()> {
    let filter = || env_filter(&config.default_level);

    let Some(log_path) = config.log_path.clone() else {
        return tracing_subscriber::registry()
            .with(stderr_layer().with_filter(filter()))
            .try_init()
            .map_err(io::Error::other);
    };

    let writer = LogFileWriter::new(&log_path)?;
    let json_layer = JsonLayer::new(config.service_name.clone(), writer);
    let stderr = config
        .also_stderr
        .then(|| stderr_layer().with_filter(filter()));

    tracing_subscriber::registry()
        .with(json_layer.with_filter(filter()))
        .with(stderr)
        .try_init()
        .map_err(io::Error::other)?;

    tracing::info!(log_path = %log_path.display(), "observability initialized");
    Ok(())
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn stderr_layer<S>() -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_target(true)
        .compact()
        .with_writer(io::stderr)
}
