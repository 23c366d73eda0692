//! Provisioning entities
//!
//! These mirror the records owned by the persistence layer. The core only
//! reads them and writes back the narrow progress/reimage fields.

use crate::error::Error;
use crate::network::{normalize_mac, validate_address};
use crate::stage::Stage;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Treat `None`, `Some("")` and whitespace-only values as unset
pub fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// A DHCP pool: the network a host address must live in
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pool {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    /// Base network address, e.g. `10.0.0.0`
    pub net_address: String,
    /// Prefix length in bits
    pub netmask: u8,
    pub gateway: String,
    pub start_address: String,
    pub end_address: String,
    /// Relay agent identifier when leases arrive through a DHCP relay
    #[serde(default)]
    pub dhcp_relay: Option<String>,
}

/// Per-group install switches, stored as a JSON blob on the group
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupOptions {
    #[serde(default, rename = "erasedisks")]
    pub erase_disks: bool,
    #[serde(default)]
    pub ssh: bool,
    #[serde(default, rename = "createvmfs")]
    pub create_vmfs: bool,
    #[serde(default, rename = "allowlegacycpu")]
    pub allow_legacy_cpu: bool,
}

impl GroupOptions {
    /// Decode the stored options blob. An empty blob means "all defaults".
    pub fn from_json(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw).map_err(|e| Error::InvalidOptions(e.to_string()))
    }
}

/// A provisioning policy shared by several hosts
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Group {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    pub image_id: u64,
    /// JSON-encoded [`GroupOptions`]
    #[serde(default)]
    pub options: String,
    /// Comma separated NTP servers
    #[serde(default)]
    pub ntp: String,
    #[serde(default)]
    pub dns: String,
    #[serde(default)]
    pub syslog: Option<String>,
    #[serde(default)]
    pub vlan: Option<String>,
    #[serde(default)]
    pub boot_disk: Option<String>,
    /// Base64-encoded kickstart override
    #[serde(default)]
    pub ks: Option<String>,
    /// Encrypted root password
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub callback_url: Option<String>,
}

impl Group {
    pub fn parsed_options(&self) -> Result<GroupOptions> {
        GroupOptions::from_json(&self.options)
    }

    /// NTP servers with blanks removed
    pub fn ntp_servers(&self) -> Vec<String> {
        self.ntp
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Installation media tree on disk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Image {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    pub path: PathBuf,
}

impl Image {
    /// Last path component of the media tree, used as boot.cfg `prefix=`
    pub fn leaf_dir(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// A physical host known to the provisioning service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Host {
    pub id: u64,
    pub ip: String,
    pub mac: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub domain: String,
    pub pool_id: u64,
    pub group_id: u64,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub progress_text: String,
    #[serde(default)]
    pub reimage: bool,
    /// Base64-encoded kickstart override
    #[serde(default)]
    pub ks: Option<String>,
}

impl Host {
    pub fn set_stage(&mut self, stage: Stage) {
        self.progress = stage.percent();
        self.progress_text = stage.label().to_string();
    }

    pub fn fqdn(&self) -> String {
        format!("{}.{}", self.hostname, self.domain)
    }

    /// Check the host address against its pool and normalize the MAC.
    ///
    /// Used when an address is registered; the error text is shown to the
    /// operator as-is.
    pub fn validate_for_pool(&mut self, pool: &Pool) -> Result<()> {
        if !validate_address(&self.ip, pool)? {
            return Err(Error::OutOfPool);
        }
        self.mac = normalize_mac(&self.mac)?;
        Ok(())
    }
}

/// A host with its pool, group and image resolved
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostRecord {
    #[serde(flatten)]
    pub host: Host,
    pub pool: Pool,
    pub group: Group,
    pub image: Image,
}

impl HostRecord {
    /// Copy of the record with the stored group password cleared,
    /// safe to hand to callbacks and API clients
    pub fn scrubbed(&self) -> HostRecord {
        let mut record = self.clone();
        record.group.password.clear();
        record
    }
}
