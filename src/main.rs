#![forbid(unsafe_code)]

mod ai;
mod capture;
mod config;
mod constants;
mod error;
mod hotkeys;
mod logging;
mod renderer;
mod session;
mod types;
mod x11_utils;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ai::AnthropicClient;
use capture::{CaptureSource, UnavailableCapture, X11Capture};
use config::Settings;
use constants::render::SHUTDOWN_TIMEOUT;
use hotkeys::listener::bindings_from_settings;
use hotkeys::{HotkeyBus, spawn_listeners};
use renderer::{HeadlessRenderer, run_loop, run_x11};
use session::{Executor, ExecutorConfig, OverlaySession, SessionConfig};

#[derive(Parser, Debug)]
#[command(name = "game-partner")]
#[command(about = "Always-on-top AI companion overlay for games on X11")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log responses instead of drawing an overlay
    #[arg(long)]
    headless: bool,

    /// Validate the settings file and exit
    #[arg(long)]
    check_config: bool,

    /// Print the default settings as TOML and exit
    #[arg(long)]
    print_default_config: bool,

    /// Also write a daily log file next to the settings file
    #[arg(long)]
    log_file: bool,
}

fn log_dir(config: Option<&Path>) -> PathBuf {
    let path = config.map(Path::to_path_buf).unwrap_or_else(Settings::default_path);
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_default_config {
        print!("{}", Settings::default().to_toml_string()?);
        return Ok(());
    }

    let log_directory = cli.log_file.then(|| log_dir(cli.config.as_deref()));
    let _log_guard = logging::init(log_directory.as_deref())?;

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) if cli.check_config => {
            error!(error = %e, "Configuration is invalid");
            std::process::exit(1);
        }
        Err(e) => return Err(e).context("Failed to load configuration"),
    };
    if cli.check_config {
        info!("Configuration is valid");
        return Ok(());
    }
    info!(model = %settings.api.model, position = %settings.overlay.position, "Configuration loaded");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    runtime.block_on(run(settings, cli.headless))
}

async fn run(settings: Settings, headless: bool) -> Result<()> {
    let capture: Arc<dyn CaptureSource> = match X11Capture::connect(settings.capture.max_width) {
        Ok(capture) => Arc::new(capture),
        Err(e) => {
            warn!(error = %e, "Screen capture unavailable; every request will fail until restart");
            Arc::new(UnavailableCapture::new(e.to_string()))
        }
    };
    let ai = AnthropicClient::new(&settings.api, settings.session.request_timeout())
        .context("Failed to build HTTP client")?;

    let session = OverlaySession::new(SessionConfig::from_settings(&settings));
    let executor = Executor::new(session, capture, Arc::new(ai), ExecutorConfig::from_settings(&settings));
    let snapshots = executor.subscribe();

    let bus = HotkeyBus::new();
    let bindings = bindings_from_settings(&settings.hotkeys);
    // Listener threads block on device reads; they are left running and end with the process
    let _listeners = match spawn_listeners(&bindings, bus.hotkey_sender()) {
        Ok(handles) => {
            for (action, binding) in &handles.active {
                info!(action = action.name(), binding = %binding, "Hotkey registered");
            }
            info!(
                devices = handles.threads.len(),
                unavailable = handles.dropped.len(),
                "Hotkey listeners started"
            );
            if handles.active.is_empty() {
                warn!("No hotkeys could be registered; the overlay can only be closed by signal");
            }
            Some(handles)
        }
        Err(e) => {
            error!(error = %e, "Hotkeys disabled");
            None
        }
    };

    let dialog = bus.dialog_sender();
    let renderer = thread::Builder::new()
        .name("renderer".into())
        .spawn(move || {
            if !headless {
                match run_x11(snapshots.clone(), dialog.clone()) {
                    Ok(()) => return,
                    Err(e) => warn!(error = %format!("{e:#}"), "X11 overlay unavailable, running headless"),
                }
            }
            run_loop(&mut HeadlessRenderer::new(), snapshots, dialog);
        })
        .context("Failed to spawn renderer thread")?;

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    let session = executor.run(bus.subscribe(), shutdown).await;
    info!(
        responses = session.history().len(),
        last_request = ?session.history().latest().map(|r| r.request_id),
        screenshots = session.screenshots().len(),
        recent_busy_notices = session.notices().len(),
        position = %session.overlay().position,
        "Session ended"
    );

    // The renderer stops once it has drawn the terminal snapshot
    let join = tokio::task::spawn_blocking(move || renderer.join());
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, join).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(_))) => error!("Renderer thread panicked"),
        Ok(Err(e)) => error!(error = %e, "Failed to join renderer thread"),
        Err(_) => warn!(timeout = ?SHUTDOWN_TIMEOUT, "Renderer did not stop in time"),
    }
    Ok(())
}

async fn wait_for_signal() {
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    tokio::select! {
        _ = terminate => {}
        _ = interrupt => {}
    }
}

/// First signal shuts the session down; a second one exits immediately
async fn watch_signals(shutdown: CancellationToken) {
    wait_for_signal().await;
    info!("Shutdown requested");
    shutdown.cancel();

    wait_for_signal().await;
    warn!("Second signal received, exiting now");
    std::process::exit(130);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_flags() {
        let cli = Cli::parse_from(["game-partner", "--headless", "--config", "/tmp/gp.toml", "--log-file"]);
        assert!(cli.headless);
        assert!(cli.log_file);
        assert!(!cli.check_config);
        assert_eq!(cli.config.as_deref(), Some(Path::new("/tmp/gp.toml")));
    }

    #[test]
    fn test_log_dir_next_to_config() {
        assert_eq!(log_dir(Some(Path::new("/etc/gp/config.toml"))), PathBuf::from("/etc/gp"));
        assert_eq!(log_dir(None), Settings::default_path().parent().unwrap().to_path_buf());
    }
}
