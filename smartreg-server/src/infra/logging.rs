use std::{fs::OpenOptions, sync::Mutex};

use anyhow::Context;
use tracing_subscriber::{
    EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::infra::config::LoggingConfig;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,tower_http=warn";

/// Installs the global subscriber: stderr plus an optional append-only file.
///
/// Stdout is left to the outcome lines printed by `register`.
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    let file_layer = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| {
                    format!("failed to open log file {}", path.display())
                })?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_thread_names(true)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .with(
            fmt::layer()
                .with_thread_names(true)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(())
}
