//! The single configured account and its authorized key.
//!
//! The server is single-tenant: exactly one account exists, named in the
//! configuration together with the path of its authorized-key file.  The key
//! file is read once at startup; a read failure there is fatal (fail fast)
//! and is never retried per login.

use anyhow::{Context, Result};
use tracing::info;

// ---------------------------------------------------------------------------
// Authorized user
// ---------------------------------------------------------------------------

/// The one account the server accepts logins for.  Immutable after startup.
#[derive(Debug, Clone)]
pub struct AuthorizedUser {
    name: String,
    /// The authorized-key line as read from disk.  Decoded per attempt by
    /// the authenticator, so a corrupt key shows up as a per-login reject
    /// rather than a startup crash.
    key: String,
}

impl AuthorizedUser {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// Resolves login usernames to the configured account.
#[derive(Debug, Clone)]
pub struct UserDirectory {
    user: AuthorizedUser,
}

impl UserDirectory {
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            user: AuthorizedUser {
                name: name.into(),
                key: key.into(),
            },
        }
    }

    /// Build the directory by reading the account's authorized-key file.
    pub fn load(name: &str, key_path: &str) -> Result<Self> {
        let key = std::fs::read_to_string(key_path)
            .with_context(|| format!("failed to read authorized key file: {key_path}"))?;
        info!(user = %name, path = %key_path, "loaded authorized key");
        Ok(Self::new(name, key))
    }

    /// Exact, case-sensitive lookup.  Unknown usernames resolve to `None`;
    /// at the transport boundary that is indistinguishable from a wrong-key
    /// reject.
    pub fn lookup(&self, username: &str) -> Option<&AuthorizedUser> {
        if username == self.user.name {
            Some(&self.user)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
