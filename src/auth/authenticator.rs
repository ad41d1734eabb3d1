//! The per-attempt accept/reject decision.
//!
//! The transport engine calls [`PublicKeyAuthenticator::authenticate`] once
//! per SSH authentication attempt, possibly concurrently across connections.
//! Every failure mode (unknown user, undecodable configured key,
//! undecodable offered key) is contained here and becomes a reject; no
//! error crosses back into the engine, and the peer learns nothing about
//! which stage failed.

use std::net::SocketAddr;

use tracing::{info, warn};

use crate::auth::{codec, compare};
use crate::user::UserDirectory;

// ---------------------------------------------------------------------------
// Session context
// ---------------------------------------------------------------------------

/// Opaque per-attempt handle supplied by the transport layer.  Carried for
/// log correlation only; the decision never depends on it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionContext {
    pub peer_addr: Option<SocketAddr>,
}

// ---------------------------------------------------------------------------
// Authenticator
// ---------------------------------------------------------------------------

/// Decides login attempts against the single configured account.
#[derive(Debug, Clone)]
pub struct PublicKeyAuthenticator {
    directory: UserDirectory,
}

impl PublicKeyAuthenticator {
    pub fn new(directory: UserDirectory) -> Self {
        Self { directory }
    }

    /// Accept or reject one login attempt.
    ///
    /// `offered_key` is the one-line text form of the key the client sent.
    /// The configured key is re-decoded on every attempt; no decoded state
    /// is cached, so repeated calls with identical inputs yield identical
    /// results.
    pub fn authenticate(&self, username: &str, offered_key: &str, ctx: &SessionContext) -> bool {
        let user = match self.directory.lookup(username) {
            Some(user) => user,
            None => {
                warn!(
                    user = %username,
                    peer = ?ctx.peer_addr,
                    "login attempt for unknown user"
                );
                return false;
            }
        };

        let configured = match codec::decode(user.key()) {
            Ok(key) => key,
            Err(e) => {
                warn!(
                    user = %username,
                    peer = ?ctx.peer_addr,
                    error = %e,
                    "configured authorized key is invalid"
                );
                return false;
            }
        };

        let offered = match codec::decode(offered_key) {
            Ok(key) => key,
            Err(e) => {
                warn!(
                    user = %username,
                    peer = ?ctx.peer_addr,
                    error = %e,
                    "offered public key could not be decoded"
                );
                return false;
            }
        };

        let accepted = compare::equal(configured.as_ref(), offered.as_ref());
        if accepted {
            info!(user = %user.name(), peer = ?ctx.peer_addr, "public keys match");
        } else {
            warn!(user = %user.name(), peer = ?ctx.peer_addr, "public keys do not match");
        }
        accepted
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testutil::ed25519_line;

    const MATERIAL: [u8; 32] = [0xA5; 32];

    fn authenticator() -> PublicKeyAuthenticator {
        let stored = ed25519_line(&MATERIAL, Some("alice@laptop"));
        PublicKeyAuthenticator::new(UserDirectory::new("alice", format!("{stored}\n")))
    }

    fn ctx() -> SessionContext {
        SessionContext::default()
    }

    #[test]
    fn accepts_matching_key() {
        let auth = authenticator();
        // Same key material, different comment than the stored line.
        let offered = ed25519_line(&MATERIAL, Some("alice@desktop"));
        assert!(auth.authenticate("alice", &offered, &ctx()));
    }

    #[test]
    fn rejects_unknown_user() {
        let auth = authenticator();
        let offered = ed25519_line(&MATERIAL, None);
        assert!(!auth.authenticate("bob", &offered, &ctx()));
    }

    #[test]
    fn rejects_tampered_key() {
        let auth = authenticator();
        let mut tampered = MATERIAL;
        tampered[0] ^= 0x01;
        let offered = ed25519_line(&tampered, None);
        assert!(!auth.authenticate("alice", &offered, &ctx()));
    }

    #[test]
    fn rejects_malformed_offered_key() {
        let auth = authenticator();
        assert!(!auth.authenticate("alice", "ssh-rsa not-base64!!", &ctx()));
        assert!(!auth.authenticate("alice", "ssh-unknown AAAA", &ctx()));
    }

    #[test]
    fn rejects_blank_offered_key() {
        let auth = authenticator();
        assert!(!auth.authenticate("alice", "", &ctx()));
    }

    #[test]
    fn rejects_when_configured_key_is_invalid() {
        let auth =
            PublicKeyAuthenticator::new(UserDirectory::new("alice", "ssh-rsa %%%not-a-key%%%"));
        let offered = ed25519_line(&MATERIAL, None);
        assert!(!auth.authenticate("alice", &offered, &ctx()));
    }

    #[test]
    fn rejects_when_both_sides_are_blank() {
        let auth = PublicKeyAuthenticator::new(UserDirectory::new("alice", ""));
        assert!(!auth.authenticate("alice", "", &ctx()));
    }

    #[test]
    fn repeated_attempts_are_idempotent() {
        let auth = authenticator();
        let offered = ed25519_line(&MATERIAL, None);
        let first = auth.authenticate("alice", &offered, &ctx());
        let second = auth.authenticate("alice", &offered, &ctx());
        assert!(first && second);

        let mut tampered = MATERIAL;
        tampered[31] ^= 0x80;
        let bad = ed25519_line(&tampered, None);
        assert!(!auth.authenticate("alice", &bad, &ctx()));
        assert!(!auth.authenticate("alice", &bad, &ctx()));
    }
}
