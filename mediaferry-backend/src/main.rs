//! mediaferry-backend - Main entry point
//!
//! Resolves the root folder, opens the database and settings, starts the
//! pipeline and serves the HTTP API until Ctrl+C or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mediaferry_backend::db::MediaStore;
use mediaferry_backend::program::Program;
use mediaferry_backend::settings::SettingsManager;
use mediaferry_backend::{build_router, AppState};
use mediaferry_common::config::{CompiledDefaults, RootFolderInitializer, RootFolderResolver};
use mediaferry_common::db::init_database;
use mediaferry_common::events::EventBus;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Command-line arguments for mediaferry-backend
#[derive(Parser, Debug)]
#[command(name = "mediaferry-backend")]
#[command(about = "Media request pipeline and HTTP API")]
#[command(version)]
struct Args {
    /// Folder holding the database and settings.json
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "MEDIAFERRY_PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "MEDIAFERRY_HOST")]
    host: Option<String>,

    /// Log at debug level
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG pins the filter for the whole run
    let env_filter = EnvFilter::try_from_default_env().ok();
    let pinned = env_filter.is_some();
    let (filter, filter_handle) = reload::Layer::new(
        env_filter.unwrap_or_else(|| EnvFilter::new(log_level(args.debug, "info", false))),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting MediaFerry backend v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let resolver = RootFolderResolver::new("mediaferry").with_cli_arg(args.root_folder.clone());
    let toml_config = resolver.load_toml().unwrap_or_default();

    let initializer = RootFolderInitializer::new(resolver.resolve());
    initializer
        .ensure_directory_exists()
        .context("Failed to create root folder")?;
    info!("Root folder: {}", initializer.root_folder().display());

    let pool = init_database(&initializer.database_path())
        .await
        .context("Failed to initialize database")?;
    info!("Database: {}", initializer.database_path().display());

    let settings = Arc::new(
        SettingsManager::open(initializer.settings_path()).context("Failed to load settings")?,
    );
    let mut level = log_level(args.debug, &toml_config.logging.level, settings.current().debug);
    if !pinned {
        set_log_level(&filter_handle, &level);
    }

    let bus = EventBus::new(100);
    let program = Program::new(Arc::clone(&settings), MediaStore::new(pool), bus)
        .await
        .context("Failed to initialize services")?;
    let mut handles = program.start();
    if !pinned {
        let mut rx = settings.subscribe();
        let cancel = program.cancel_token();
        let cli_debug = args.debug;
        let toml_level = toml_config.logging.level.clone();
        handles.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                let next = log_level(cli_debug, &toml_level, rx.borrow_and_update().debug);
                if next != level {
                    info!("Log level changed to {}", next);
                    set_log_level(&filter_handle, &next);
                    level = next;
                }
            }
        }));
    }

    let defaults = CompiledDefaults::for_current_platform();
    let host = args
        .host
        .or(toml_config.bind_address)
        .unwrap_or(defaults.bind_address);
    let port = args.port.or(toml_config.port).unwrap_or(defaults.port);
    let addr = format!("{}:{}", host, port);

    let app = build_router(AppState::new(Arc::clone(&program)));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(program.cancel_token()))
        .await
        .context("Server error")?;

    program.shutdown();
    for handle in handles {
        if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
            warn!("Background task did not stop in time");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Filter directive when RUST_LOG is unset: `--debug` or the runtime `debug`
/// setting force debug, otherwise the TOML `logging.level` applies
fn log_level(cli_debug: bool, toml_level: &str, settings_debug: bool) -> String {
    if cli_debug || settings_debug {
        "debug".to_string()
    } else if toml_level.trim().is_empty() {
        "info".to_string()
    } else {
        toml_level.to_string()
    }
}

fn set_log_level(handle: &FilterHandle, level: &str) {
    match EnvFilter::try_new(level) {
        Ok(filter) => {
            if let Err(e) = handle.reload(filter) {
                error!("Failed to change log level: {}", e);
            }
        }
        Err(e) => warn!("Invalid log level {}: {}", level, e),
    }
}

/// Resolves on Ctrl+C, SIGTERM or when the program is cancelled
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
        _ = cancel.cancelled() => {
            info!("Program cancelled, shutting down");
        },
    }
    cancel.cancel();
}
