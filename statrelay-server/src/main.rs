// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  statrelay: credential-holding relay for statistics queries
//
//  Server:  axum on the tokio multi-thread runtime
//  Config:  YAML file, .env, then environment overrides
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use clap::Parser;
use statrelay_core::RelayConfig;
use statrelay_observability::logger;
use statrelay_proxy::{RelayState, build_router, server};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "statrelay", version, about = "Statistics relay with server-side credentials")]
struct Cli {
    /// Path to configuration file (skipped when absent)
    #[arg(short, long, default_value = "statrelay.yaml")]
    config: PathBuf,

    /// Log level, used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Dotenv file to load instead of `./.env`
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Environment ──
    // Real environment variables win over dotenv entries.
    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)?;
        }
        None => match dotenvy::dotenv() {
            Ok(_) => {}
            Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        },
    }

    // ── Config ──
    let config = RelayConfig::load(&cli.config)?;

    // ── Tracing ──
    logger::init(&cli.log_level, config.observability.log_format)?;

    info!(version = env!("CARGO_PKG_VERSION"), "statrelay starting");
    if cli.config.exists() {
        info!(path = %cli.config.display(), "Loaded config file");
    }

    // ── Credentials ──
    let credential = match config.credential() {
        Ok(credential) => credential,
        Err(e) => {
            error!(error = %e, "Please provide both CLIENT_ID and CLIENT_SECRET");
            return Err(e.into());
        }
    };

    // ── Relay ──
    let state = RelayState::from_config(&config, credential)?;
    info!(
        token_url = %config.upstream.token_url,
        statistics_url = %config.upstream.statistics_url,
        token_cache = config.token_cache.enabled,
        metrics = state.metrics.is_enabled(),
        "Relay configured"
    );

    let listener = server::bind(&config).await?;
    server::serve(listener, build_router(state), shutdown_signal()).await?;

    info!("statrelay stopped");
    Ok(())
}

/// Resolves on SIGINT (Ctrl+C) or SIGTERM (docker stop).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
