//! Ezydesk - native shell for the Ezy exam-authoring web client.
//!
//! The binary hosts the remote web application, runs the request channel
//! the content talks back over (PDF export, bucket upload, window
//! control), and coordinates self-update against the file host.

// Hide console window on Windows (logs go to file instead)
#![cfg_attr(windows, windows_subsystem = "windows")]

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use directories::ProjectDirs;
use tokio::sync::mpsc;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ezydesk_app::activation;
use ezydesk_app::config::{AppConfig, UPDATE_DIALOG_SIZE};
use ezydesk_app::exporter::HeadlessExporter;
use ezydesk_app::store::OssHttpStore;
use ezydesk_app::window::WindowRegistry;
use ezydesk_channel::{
    AppState, ChannelConfig, HostCommand, OutboundMessage, Server, ServerConfig, WindowHost,
};
use ezydesk_core::{platform_installer, CheckOutcome, UpdateCoordinator, UpdateSettings};

/// Ezydesk - desktop shell for the Ezy exam-authoring client
#[derive(Parser, Debug)]
#[command(name = "ezydesk", version, about)]
struct Args {
    /// Remote web application URL to load
    #[arg(long)]
    remote_url: Option<String>,

    /// Version manifest base URL
    #[arg(long)]
    manifest_url: Option<String>,

    /// Installer artifact base URL
    #[arg(long)]
    download_url: Option<String>,

    /// Request channel port
    #[arg(long)]
    port: Option<u16>,

    /// Directory exported documents are saved into
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// Skip the startup update check
    #[arg(long)]
    no_update_check: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Activation link (`ezy-web-tool://...`) relayed by the OS
    activation_url: Option<String>,
}

/// Get the logs directory path.
fn logs_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "ezy", "Ezydesk").map(|dirs| dirs.data_dir().join("logs"))
}

/// Initialize logging with file rotation.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_level = if args.debug { "debug" } else { &args.log_level };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ezydesk={},warn", log_level)));

    if let Some(log_dir) = logs_dir() {
        if std::fs::create_dir_all(&log_dir).is_ok() {
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(5)
                .filename_prefix("ezydesk")
                .filename_suffix("log")
                .build(&log_dir)
                .ok();

            if let Some(appender) = file_appender {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);

                if args.debug {
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(fmt::layer().with_writer(std::io::stdout))
                        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                        .init();
                } else {
                    // Release mode: file only, the shell is windowless.
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                        .init();
                }

                tracing::info!("logging to {:?}", log_dir);
                return Some(guard);
            }
        }
    }

    // Fallback: console logging only.
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    tracing::warn!("file logging unavailable, using console only");
    None
}

/// Environment configuration with CLI flags layered on top.
fn resolve_config(args: &Args) -> AppConfig {
    let mut config = AppConfig::from_env();
    if let Some(url) = &args.remote_url {
        config.remote_url = url.clone();
    }
    if let Some(url) = &args.manifest_url {
        config.manifest_base_url = url.clone();
    }
    if let Some(url) = &args.download_url {
        config.download_base_url = url.clone();
    }
    if let Some(port) = args.port {
        config.channel_port = port;
    }
    if let Some(dir) = &args.save_dir {
        config.save_dir = Some(dir.clone());
    }
    config
}

/// Startup version check: shrink the main window to the update dialog
/// footprint and tell the content when a different build is published.
async fn startup_version_check(state: &AppState) {
    match state.coordinator.check_for_update().await {
        Ok(CheckOutcome::UpdateAvailable(info)) => {
            tracing::info!(version = %info.version, "update available");
            state
                .windows
                .resize(UPDATE_DIALOG_SIZE.0, UPDATE_DIALOG_SIZE.1);
            let payload = serde_json::to_value(&info).unwrap_or(serde_json::Value::Null);
            state.broadcast(OutboundMessage::event("update-available", payload));
        }
        Ok(CheckOutcome::UpToDate) => {
            tracing::info!("application is up to date");
        }
        Err(err) => {
            tracing::warn!("version check failed: {}", err);
            state.broadcast(OutboundMessage::event(
                "notice",
                serde_json::json!({ "title": "提示", "message": "请检查网络" }),
            ));
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Keep the guard alive for the duration of the program.
    let _log_guard = init_logging(&args);

    tracing::info!("starting Ezydesk {}...", env!("CARGO_PKG_VERSION"));

    let config = resolve_config(&args);
    tracing::debug!(?config, "resolved configuration");

    let exporter = Arc::new(HeadlessExporter::discover());
    let windows = Arc::new(WindowRegistry::new());

    if let Some(link) = args.activation_url.as_deref() {
        // Second-instance activation: export, save, and exit.
        match activation::handle(
            link,
            exporter.as_ref(),
            windows.as_ref(),
            config.save_dir.clone(),
        )
        .await
        {
            Ok(path) => tracing::info!(path = %path.display(), "activation export complete"),
            Err(err) => tracing::error!("activation failed: {}", err),
        }
        return Ok(());
    }

    let store = Arc::new(OssHttpStore::new()?);

    let mut settings = UpdateSettings::new(
        &config.manifest_base_url,
        &config.download_base_url,
        env!("CARGO_PKG_VERSION"),
    );
    settings.artifact_dir = config.artifact_dir.clone();
    let coordinator = Arc::new(
        UpdateCoordinator::new(settings)
            .map_err(|err| anyhow::anyhow!("update coordinator: {}", err))?,
    );

    let (host_tx, mut host_rx) = mpsc::unbounded_channel();
    let state = AppState::new(
        coordinator,
        Arc::from(platform_installer()),
        exporter,
        store,
        windows.clone(),
        host_tx,
        ChannelConfig {
            content_base_url: config.remote_url.clone(),
            login_url: config.login_url(),
            save_dir: config.save_dir.clone(),
        },
    );

    let server = Server::new(
        ServerConfig::default().with_port(config.channel_port),
        state.clone(),
    )
    .map_err(|err| anyhow::anyhow!("request channel: {}", err))?;
    tokio::spawn(async move {
        if let Err(err) = server.run().await {
            tracing::error!("request channel error: {}", err);
        }
    });

    if let Err(err) = windows.open_main(&config.remote_url) {
        tracing::error!("failed to open main window: {}", err);
    }

    if !args.no_update_check {
        startup_version_check(&state).await;
    }

    // Serve until the channel hands the process over to an installer or
    // the user interrupts.
    loop {
        tokio::select! {
            command = host_rx.recv() => match command {
                Some(HostCommand::Exit { delay }) => {
                    tokio::time::sleep(delay).await;
                    tracing::info!("exiting for installer handoff");
                    return Ok(());
                }
                None => break,
            },
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!("interrupt received");
                break;
            }
        }
    }

    tracing::info!("Ezydesk shutting down");
    Ok(())
}
