mod auth;
mod config;
mod ssh;
mod user;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::auth::PublicKeyAuthenticator;
use crate::config::Config;
use crate::user::UserDirectory;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "sftpgate", about = "Single-user SFTP server with public-key authentication")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "/etc/sftpgate/config.yaml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Global state shared across all connection handlers.  Read-only after
/// startup, so handlers need no locking.
pub struct AppState {
    pub config: Arc<Config>,
    pub authenticator: PublicKeyAuthenticator,
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // ---- CLI ----
    let cli = Cli::parse();

    // ---- Config ----
    let config = config::load_config(&cli.config)?;
    let config = Arc::new(config);

    // ---- Tracing ----
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!(config_path = %cli.config, "starting sftpgate");

    // ---- User directory (fail fast on an unreadable key file) ----
    let directory = UserDirectory::load(&config.user.name, &config.user.authorized_key_path)
        .context("failed to initialise the user directory")?;
    let authenticator = PublicKeyAuthenticator::new(directory);

    // ---- App state ----
    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        authenticator,
    });

    // ---- Serve until shutdown ----
    let server_handle = tokio::spawn({
        let state = Arc::clone(&state);
        async move {
            if let Err(e) = ssh::start_sftp_server(state).await {
                tracing::error!(error = %e, "SFTP server failed");
            }
        }
    });

    tokio::select! {
        _ = server_handle => tracing::warn!("SFTP server task exited"),
        () = shutdown_signal() => {}
    }

    tracing::info!("sftpgate shut down cleanly");
    Ok(())
}
