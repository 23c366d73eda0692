//! Provisioning stages
//!
//! A host's progress is stored as a percentage plus a free-text label. The
//! `Stage` enum names every value the provisioning flow writes, in order, so
//! callers can compare stages instead of raw integers.

use serde::{Deserialize, Serialize};

/// A discrete step of the provisioning flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Nothing requested yet (or reset by an operator)
    Pending,
    /// Boot loader fetched over TFTP
    MbootEfi,
    /// Crypto module fetched over TFTP
    Crypto64Efi,
    /// Patched boot.cfg fetched, installer is loading
    Installation,
    /// Kickstart script served
    Kickstart,
    /// Post-install customization running
    Customization,
    /// Provisioning finished
    Completed,
}

impl Stage {
    /// All stages in provisioning order
    pub const ALL: [Stage; 7] = [
        Stage::Pending,
        Stage::MbootEfi,
        Stage::Crypto64Efi,
        Stage::Installation,
        Stage::Kickstart,
        Stage::Customization,
        Stage::Completed,
    ];

    /// Progress percentage persisted for this stage
    pub fn percent(self) -> u8 {
        match self {
            Stage::Pending => 0,
            Stage::MbootEfi => 10,
            Stage::Crypto64Efi => 12,
            Stage::Installation => 15,
            Stage::Kickstart => 50,
            Stage::Customization => 75,
            Stage::Completed => 100,
        }
    }

    /// Progress text persisted for this stage
    pub fn label(self) -> &'static str {
        match self {
            Stage::Pending => "",
            Stage::MbootEfi => "mboot.efi",
            Stage::Crypto64Efi => "crypto64.efi",
            Stage::Installation => "installation",
            Stage::Kickstart => "kickstart",
            Stage::Customization => "customization",
            Stage::Completed => "completed",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}% {}", self.percent(), self.label())
    }
}
