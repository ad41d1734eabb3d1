use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub user: UserConfig,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address for the SSH listener (e.g. `0.0.0.0:9922`).
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Path of the server host key (OpenSSH or PKCS#8 PEM).  When the file
    /// cannot be read an ephemeral Ed25519 key is generated instead.
    pub host_key_path: String,
    /// Directory served as the SFTP root.  Clients cannot see anything
    /// outside it.
    pub root_dir: String,
    /// Seconds of inactivity before a connection is dropped.
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout: u64,
    /// Failed authentication attempts allowed per connection.
    #[serde(default = "default_max_auth_attempts")]
    pub max_auth_attempts: usize,
}

fn default_listen() -> String {
    "0.0.0.0:9922".to_string()
}

fn default_inactivity_timeout() -> u64 {
    600
}

fn default_max_auth_attempts() -> usize {
    3
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    /// Login name of the single configured account.
    pub name: String,
    /// Path of the file holding the account's one-line authorized key.
    pub authorized_key_path: String,
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load and validate a [`Config`] from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Basic sanity checks that cannot be expressed purely with serde.
fn validate_config(config: &Config) -> Result<()> {
    anyhow::ensure!(!config.user.name.is_empty(), "user.name must not be empty");
    anyhow::ensure!(
        config.server.max_auth_attempts > 0,
        "server.max_auth_attempts must be at least 1"
    );
    config
        .server
        .listen
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid listen address: {:?}", config.server.listen))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
