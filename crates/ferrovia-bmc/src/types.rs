//! Common types for BMC operations

use crate::error::{BmcError, Result};
use serde::Serialize;
use std::time::Duration;

/// Default Redfish HTTPS port
pub const DEFAULT_REDFISH_PORT: u16 = 443;

/// Power state of a system as reported by the BMC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    /// Machine is powered on
    On,
    /// Machine is powered off
    Off,
    /// Transitioning to on
    PoweringOn,
    /// Transitioning to off
    PoweringOff,
    /// Missing or unrecognised
    Unknown,
}

impl PowerState {
    /// Parse a Redfish `PowerState` value
    pub fn from_redfish(value: Option<&str>) -> Self {
        match value {
            Some("On") => PowerState::On,
            Some("Off") => PowerState::Off,
            Some("PoweringOn") => PowerState::PoweringOn,
            Some("PoweringOff") => PowerState::PoweringOff,
            _ => PowerState::Unknown,
        }
    }

    /// Settled states in which boot overrides may be changed
    pub fn is_settled(self) -> bool {
        matches!(self, PowerState::On | PowerState::Off)
    }
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerState::On => write!(f, "on"),
            PowerState::Off => write!(f, "off"),
            PowerState::PoweringOn => write!(f, "powering on"),
            PowerState::PoweringOff => write!(f, "powering off"),
            PowerState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Redfish `ComputerSystem.Reset` types we issue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetType {
    ForceRestart,
    On,
    ForceOff,
}

impl ResetType {
    pub fn as_str(self) -> &'static str {
        match self {
            ResetType::ForceRestart => "ForceRestart",
            ResetType::On => "On",
            ResetType::ForceOff => "ForceOff",
        }
    }
}

/// Kind of management controller behind a [`crate::BmcController`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BmcFlavour {
    Redfish,
}

impl std::fmt::Display for BmcFlavour {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BmcFlavour::Redfish => write!(f, "redfish"),
        }
    }
}

/// BMC protocol to use
#[derive(Debug, Clone)]
pub enum BmcProtocol {
    /// Redfish REST API
    Redfish(RedfishConfig),
}

/// Redfish REST API configuration
#[derive(Debug, Clone)]
pub struct RedfishConfig {
    /// Base URL, e.g. `https://10.0.0.200:443`
    pub endpoint: String,
    /// Username
    pub username: String,
    /// Password
    pub password: String,
    /// Skip TLS verification (BMCs ship self-signed certs)
    pub insecure: bool,
    /// Overall per-request timeout
    pub timeout: Duration,
    /// Connect (TCP + TLS handshake) timeout
    pub connect_timeout: Duration,
}

impl RedfishConfig {
    /// Config for a BMC at `host:port`
    pub fn new(
        host: impl AsRef<str>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let host = host.as_ref().trim();
        let endpoint = if host.is_empty() {
            String::new()
        } else {
            format!("https://{}:{}", host, port)
        };
        Self::with_endpoint(endpoint, username, password)
    }

    /// Config for an explicit base URL
    pub fn with_endpoint(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
            insecure: true,
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
        }
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Require valid TLS certificates
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Reject configs with missing parameters before any network traffic
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(BmcError::InvalidConfig("missing host address".to_string()));
        }
        if self.username.is_empty() {
            return Err(BmcError::InvalidConfig("missing username".to_string()));
        }
        if self.password.is_empty() {
            return Err(BmcError::InvalidConfig("missing password".to_string()));
        }
        Ok(())
    }
}

/// One network interface reported by the BMC
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IfaceConfig {
    pub iface_name: String,
    pub ip_address: String,
    pub mac_address: String,
    /// e.g. `"10000 Mbps"`
    pub speed: String,
    /// Redfish link status, e.g. `"LinkUp"`
    pub status: String,
}

impl IfaceConfig {
    /// Link is up (`LinkUp` on interfaces, `Up` on adapter ports)
    pub fn is_active(&self) -> bool {
        self.status == "LinkUp" || self.status == "Up"
    }
}
