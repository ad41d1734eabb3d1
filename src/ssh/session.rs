//! SSH session handler implementing the `russh` [`Handler`] trait.
//!
//! Each inbound connection is served by a dedicated [`SftpSession`].  The
//! handler performs public-key authentication against the configured account
//! and starts the SFTP subsystem on authenticated channels.  Exec requests
//! and other subsystems are refused.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use base64::Engine as _;
use russh::server::{Auth, Handler, Msg, Session};
use russh::{Channel, ChannelId};
use russh_keys::key::PublicKey;
use russh_keys::PublicKeyBase64;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use super::subsystem::SftpSubsystem;
use crate::auth::SessionContext;
use crate::AppState;

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Per-connection SSH session state.
pub struct SftpSession {
    state: Arc<AppState>,
    peer_addr: Option<SocketAddr>,
    authenticated_user: Option<String>,
    /// Channels opened but not yet claimed by a subsystem request.
    channels: HashMap<ChannelId, Channel<Msg>>,
}

impl SftpSession {
    /// Create a new session for an incoming connection.
    pub fn new(state: Arc<AppState>, peer_addr: Option<SocketAddr>) -> Self {
        Self {
            state,
            peer_addr,
            authenticated_user: None,
            channels: HashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Fingerprint helper
// ---------------------------------------------------------------------------

/// Compute the SHA-256 fingerprint of an SSH public key, returned as a
/// base64-encoded string prefixed with `SHA256:` (matching the format used
/// by `ssh-keygen -l`).
fn fingerprint_of<K: PublicKeyBase64>(key: &K) -> String {
    let blob_b64 = key.public_key_base64();
    let blob = base64::engine::general_purpose::STANDARD
        .decode(blob_b64.as_bytes())
        .unwrap_or_default();
    let hash = Sha256::digest(&blob);
    let encoded = base64::engine::general_purpose::STANDARD_NO_PAD.encode(hash);
    format!("SHA256:{encoded}")
}

// ---------------------------------------------------------------------------
// Handler implementation
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
impl Handler for SftpSession {
    type Error = anyhow::Error;

    /// Authenticate a client by public key.
    ///
    /// The engine hands us the already-parsed key; we render it back to its
    /// one-line text form and pass it through the same decode-and-compare
    /// path as the configured key, so both sides of the comparison go
    /// through identical validation.
    async fn auth_publickey(&mut self, user: &str, key: &PublicKey) -> Result<Auth, Self::Error> {
        let fingerprint = fingerprint_of(key);
        info!(
            peer = ?self.peer_addr,
            user = %user,
            fingerprint = %fingerprint,
            "SSH public-key auth attempt"
        );

        let offered = format!("{} {}", key.name(), key.public_key_base64());
        let ctx = SessionContext {
            peer_addr: self.peer_addr,
        };

        if self.state.authenticator.authenticate(user, &offered, &ctx) {
            self.authenticated_user = Some(user.to_string());
            Ok(Auth::Accept)
        } else {
            Ok(Auth::Reject {
                proceed_with_methods: None,
            })
        }
    }

    /// Accept new channel-open requests for sessions; the channel is held
    /// until the client asks for the `sftp` subsystem on it.
    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    /// Serve the `sftp` subsystem on an established channel; refuse
    /// everything else.
    async fn subsystem_request(
        &mut self,
        channel_id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if name != "sftp" {
            warn!(
                peer = ?self.peer_addr,
                subsystem = %name,
                "refusing unsupported subsystem"
            );
            session.channel_failure(channel_id);
            return Ok(());
        }

        let channel = match self.channels.remove(&channel_id) {
            Some(channel) => channel,
            None => {
                warn!(peer = ?self.peer_addr, "sftp requested on unknown channel");
                session.channel_failure(channel_id);
                return Ok(());
            }
        };

        info!(
            peer = ?self.peer_addr,
            user = ?self.authenticated_user,
            "starting SFTP subsystem"
        );
        session.channel_success(channel_id);

        let subsystem = SftpSubsystem::new(&self.state.config.server.root_dir);
        tokio::spawn(async move {
            russh_sftp::server::run(channel.into_stream(), subsystem).await;
        });

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use russh_keys::key::KeyPair;

    #[test]
    fn fingerprint_has_sha256_prefix_and_no_padding() {
        let key = KeyPair::generate_ed25519();
        let fingerprint = fingerprint_of(&key);
        assert!(fingerprint.starts_with("SHA256:"));
        assert!(!fingerprint.ends_with('='));
    }

    #[test]
    fn fingerprint_is_stable_per_key() {
        let key = KeyPair::generate_ed25519();
        assert_eq!(fingerprint_of(&key), fingerprint_of(&key));

        let other = KeyPair::generate_ed25519();
        assert_ne!(fingerprint_of(&key), fingerprint_of(&other));
    }
}
