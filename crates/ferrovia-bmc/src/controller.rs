//! BMC controller trait and the operations built on it

use async_trait::async_trait;
use tracing::info;

use crate::error::Result;
use crate::redfish::RedfishController;
use crate::types::{BmcFlavour, BmcProtocol, IfaceConfig};

/// Out-of-band operations on one BMC
///
/// Every call is self-contained: implementations open a session, do their
/// work and release the session before returning, on success or failure.
#[async_trait]
pub trait BmcController: Send + Sync {
    /// Network interfaces known to the BMC, optionally only those with link
    async fn get_host_config(&self, only_active: bool) -> Result<Vec<IfaceConfig>>;

    /// Set the BIOS network boot VLAN and enable VLAN tagging
    async fn set_vlan_id(&self, vlan_id: u16) -> Result<()>;

    /// Boot from UEFI HTTP on the next boot only
    async fn set_one_time_http_boot(&self) -> Result<()>;

    /// Hard reset every system
    async fn reboot_server(&self) -> Result<()>;

    /// Power on every system
    async fn start_server(&self) -> Result<()>;

    /// Hard power off every system
    async fn stop_server(&self) -> Result<()>;

    /// Base URL of the BMC
    fn endpoint(&self) -> &str;

    fn flavour(&self) -> BmcFlavour;
}

/// Build a controller for the given protocol, rejecting incomplete configs
pub fn connect(protocol: BmcProtocol) -> Result<Box<dyn BmcController>> {
    match protocol {
        BmcProtocol::Redfish(config) => Ok(Box::new(RedfishController::new(config)?)),
    }
}

/// Set the boot VLAN, arm a one-time HTTP boot and reboot.
///
/// Stops at the first failing step; the error names the step.
pub async fn configure_vlan_and_boot(controller: &dyn BmcController, vlan_id: u16) -> Result<()> {
    controller
        .set_vlan_id(vlan_id)
        .await
        .map_err(|e| e.during("set VLAN ID"))?;
    controller
        .set_one_time_http_boot()
        .await
        .map_err(|e| e.during("set one-time HTTP boot"))?;
    controller
        .reboot_server()
        .await
        .map_err(|e| e.during("reboot"))?;

    info!(endpoint = %controller.endpoint(), vlan_id, "VLAN set, HTTP boot armed, server rebooting");
    Ok(())
}
