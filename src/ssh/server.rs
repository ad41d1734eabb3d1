//! SSH server bootstrap and the [`russh::server::Server`] implementation.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use russh::server::{self, Server};
use russh::MethodSet;
use russh_keys::key::KeyPair;
use tracing::{info, warn};

use super::session::SftpSession;
use crate::AppState;

// ---------------------------------------------------------------------------
// Server type
// ---------------------------------------------------------------------------

/// Top-level SSH server that hands off each incoming connection to an
/// [`SftpSession`] handler.
pub struct SftpServer {
    state: Arc<AppState>,
}

impl SftpServer {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

impl server::Server for SftpServer {
    type Handler = SftpSession;

    fn new_client(&mut self, peer_addr: Option<SocketAddr>) -> Self::Handler {
        info!(peer = ?peer_addr, "new SSH client connection");
        SftpSession::new(Arc::clone(&self.state), peer_addr)
    }
}

// ---------------------------------------------------------------------------
// Host key loading
// ---------------------------------------------------------------------------

/// Load the server host key from the configured path.  Falls back to an
/// ephemeral Ed25519 key if the file is absent or unreadable; clients will
/// see a changed host key until a persistent one is provisioned.
fn load_host_key(path: &str) -> KeyPair {
    match russh_keys::load_secret_key(path, None) {
        Ok(key) => {
            info!(path = %path, "loaded SSH host key");
            key
        }
        Err(e) => {
            warn!(
                path = %path,
                error = %e,
                "failed to load SSH host key; generating ephemeral Ed25519 key"
            );
            KeyPair::generate_ed25519()
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Start the SFTP listener.  Runs until the server is shut down or an
/// unrecoverable error occurs.
pub async fn start_sftp_server(state: Arc<AppState>) -> Result<()> {
    let listen_addr: SocketAddr = state.config.server.listen.parse().with_context(|| {
        format!(
            "invalid SSH listen address: {:?}",
            state.config.server.listen
        )
    })?;

    let host_key = load_host_key(&state.config.server.host_key_path);

    let config = Arc::new(server::Config {
        keys: vec![host_key],
        methods: MethodSet::PUBLICKEY,
        inactivity_timeout: Some(Duration::from_secs(state.config.server.inactivity_timeout)),
        auth_rejection_time: Duration::from_secs(1),
        auth_rejection_time_initial: Some(Duration::from_secs(0)),
        max_auth_attempts: state.config.server.max_auth_attempts,
        ..Default::default()
    });

    info!(address = %listen_addr, "starting SFTP server");

    let mut sftp_server = SftpServer::new(state);
    sftp_server
        .run_on_address(config, listen_addr)
        .await
        .context("SFTP server exited with error")?;

    Ok(())
}
