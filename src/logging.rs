//! Tracing subscriber setup
//!
//! `RUST_LOG` takes precedence; otherwise `LOG_LEVEL` (trace/debug/info/warn/error)
//! sets the level for our own crate while dependencies stay at warn.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::constants;

const NOISY_CRATES: &[&str] = &["reqwest", "hyper", "hyper_util", "rustls", "x11rb", "h2"];

fn level_from_env() -> &'static str {
    match std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => "trace",
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    }
}

/// Build the default filter directive for a level
fn default_directives(level: &str) -> String {
    let mut directives = vec![level.to_string()];
    directives.extend(NOISY_CRATES.iter().map(|c| format!("{c}=warn")));
    directives.join(",")
}

fn build_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(level_from_env())))
}

/// Install the global subscriber.
///
/// With `log_dir` set, a daily-rotated file is written there as well; the
/// returned guard must live until exit so buffered lines get flushed.
pub fn init(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let console = tracing_subscriber::fmt::layer().with_filter(build_filter());

    let Some(dir) = log_dir else {
        tracing_subscriber::registry()
            .with(console)
            .try_init()
            .context("Failed to install tracing subscriber")?;
        return Ok(None);
    };

    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let appender = tracing_appender::rolling::daily(dir, constants::config::LOG_FILENAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(build_filter());

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(Some(guard))
}
