//! Post-install provisioning
//!
//! Runs in the background once a host has fetched its kickstart (or when an
//! operator re-triggers it) and walks the host to completion.

use ferrovia_common::{present, HostRecord, Stage};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ProvisionError;
use crate::store::HostStore;

/// Sequences the final stages and the completion callback
#[derive(Clone)]
pub struct ProvisioningCoordinator {
    store: Arc<dyn HostStore>,
    client: reqwest::Client,
}

impl ProvisioningCoordinator {
    /// `callback_timeout` bounds each callback request end to end
    pub fn new(store: Arc<dyn HostStore>, callback_timeout: Duration) -> Result<Self, ProvisionError> {
        let client = reqwest::Client::builder().timeout(callback_timeout).build()?;
        Ok(Self { store, client })
    }

    /// Run in the background; failures are logged
    pub fn spawn(&self, record: HostRecord) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let host_id = record.host.id;
            if let Err(e) = coordinator.run(record).await {
                warn!(host_id, error = %e, "Provisioning stopped");
            }
        })
    }

    /// Drive a host from customization to completed.
    ///
    /// Malformed group options stop the run before any write. A failing
    /// callback does not.
    pub async fn run(&self, record: HostRecord) -> Result<(), ProvisionError> {
        let host_id = record.host.id;
        record.group.parsed_options()?;
        debug!(host_id, hostname = %record.host.hostname, "Started provisioning worker");

        self.advance(host_id, Stage::Customization).await?;
        // Waiting for the installed host to answer is handled outside this service
        info!(host_id, ip = %record.host.ip, "Post-configuration completed");
        self.advance(host_id, Stage::Completed).await?;

        if let Some(url) = present(&record.group.callback_url) {
            let mut payload = record.scrubbed();
            payload.host.set_stage(Stage::Completed);
            match self.client.post(url).json(&payload).send().await {
                Ok(response) => {
                    info!(host_id, callback = %url, status = %response.status(), "Callback delivered")
                }
                Err(e) => warn!(host_id, callback = %url, error = %e, "Callback failed"),
            }
        }
        Ok(())
    }

    async fn advance(&self, host_id: u64, stage: Stage) -> Result<(), ProvisionError> {
        self.store.save_progress(host_id, stage).await?;
        info!(host_id, progress = stage.percent(), stage = stage.label(), "Host progress updated");
        Ok(())
    }
}
