//! Server configuration
//!
//! Loaded from a YAML file. Every field has a default, so an empty file is a
//! valid (if not very useful) configuration.

use ferrovia_common::{Group, Host, Image, Pool};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable that overrides `secret_key`
pub const SECRET_KEY_ENV: &str = "FERROVIA_SECRET_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("missing required setting: {0}")]
    Missing(&'static str),
}

/// Entities the in-memory store is seeded with
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Inventory {
    pub pools: Vec<Pool>,
    pub groups: Vec<Group>,
    pub images: Vec<Image>,
    pub hosts: Vec<Host>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TFTP listen address
    pub tftp_bind: SocketAddr,
    /// HTTP listen address for ks.cfg and postconfig
    pub http_bind: SocketAddr,
    /// Port written into `ks=` URLs, when a proxy fronts the HTTP listener
    pub advertise_port: Option<u16>,
    /// Scheme written into `ks=` URLs. The listener itself is plain HTTP,
    /// so `https` only makes sense behind a TLS proxy on `advertise_port`.
    pub kickstart_scheme: String,
    /// Directory holding install media, also the fallback TFTP root
    pub images_root: PathBuf,
    /// Key for group password decryption (base64 or passphrase)
    pub secret_key: Option<String>,
    pub callback_timeout_secs: u64,
    pub tftp_timeout_secs: u8,
    pub inventory: Inventory,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tftp_bind: SocketAddr::from(([0, 0, 0, 0], 69)),
            http_bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            advertise_port: None,
            kickstart_scheme: "http".to_string(),
            images_root: PathBuf::from("images"),
            secret_key: None,
            callback_timeout_secs: 30,
            tftp_timeout_secs: 5,
            inventory: Inventory::default(),
        }
    }
}

impl ServerConfig {
    /// Read a YAML config file and apply environment overrides
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&raw)?;
        Ok(config.with_env_overrides(std::env::var(SECRET_KEY_ENV).ok()))
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    fn with_env_overrides(mut self, secret_key: Option<String>) -> Self {
        if let Some(key) = secret_key.filter(|k| !k.is_empty()) {
            self.secret_key = Some(key);
        }
        self
    }

    /// Port to advertise in kickstart URLs, given the port the HTTP
    /// listener actually bound
    pub fn advertised_port(&self, bound: u16) -> u16 {
        self.advertise_port.unwrap_or(bound)
    }

    pub fn secret_key(&self) -> Result<&str, ConfigError> {
        self.secret_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::Missing("secret_key"))
    }
}
