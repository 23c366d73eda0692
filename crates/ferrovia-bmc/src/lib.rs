//! ferrovia BMC control
//!
//! Out-of-band control of a host's baseboard management controller: power
//! actions, one-time boot overrides and BIOS network boot settings.
//!
//! # Supported Protocols
//!
//! - **Redfish**: DMTF REST API, session authenticated
//!
//! # Example
//!
//! ```no_run
//! use ferrovia_bmc::{configure_vlan_and_boot, connect, BmcProtocol, RedfishConfig};
//!
//! # async fn example() -> ferrovia_bmc::Result<()> {
//! let config = RedfishConfig::new("10.0.0.200", 443, "admin", "password");
//! let controller = connect(BmcProtocol::Redfish(config))?;
//!
//! // Tag PXE traffic with VLAN 100, boot over HTTP once, reboot
//! configure_vlan_and_boot(controller.as_ref(), 100).await?;
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod error;
pub mod redfish;
pub mod types;

pub use controller::{configure_vlan_and_boot, connect, BmcController};
pub use error::{BmcError, Result};
pub use redfish::RedfishController;
pub use types::{
    BmcFlavour, BmcProtocol, IfaceConfig, PowerState, RedfishConfig, ResetType,
    DEFAULT_REDFISH_PORT,
};
