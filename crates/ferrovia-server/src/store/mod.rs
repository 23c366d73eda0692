//! Host state storage
//!
//! The provisioning core reads hosts with their pool, group and image
//! resolved, and writes back only two narrow fields: progress and the
//! reimage flag. Full CRUD belongs to whatever owns the inventory.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use ferrovia_common::{Host, HostRecord, Pool, Stage};
use thiserror::Error;

/// Errors from storage operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Rejected by address/MAC validation; the message is user facing
    #[error(transparent)]
    Validation(#[from] ferrovia_common::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage backend for host provisioning state
///
/// The trait is object-safe and can be used with `Arc<dyn HostStore>`.
#[async_trait]
pub trait HostStore: Send + Sync {
    /// Host by its IPv4 address, the identity used by TFTP and HTTP clients
    async fn host_by_ip(&self, ip: &str) -> Result<Option<HostRecord>>;

    async fn host_by_id(&self, id: u64) -> Result<Option<HostRecord>>;

    /// Persist `progress` and `progress_text` only
    async fn save_progress(&self, host_id: u64, stage: Stage) -> Result<()>;

    /// Persist the `reimage` flag only
    async fn set_reimage(&self, host_id: u64, reimage: bool) -> Result<()>;
}

/// Check a host address against its pool before it is stored.
///
/// Normalizes the MAC in place. The error message is meant for the operator.
pub fn validate_host_address(host: &mut Host, pool: &Pool) -> Result<()> {
    host.validate_for_pool(pool)?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::Inventory;
    use ferrovia_common::{Group, Host, Image, Pool};
    use std::path::PathBuf;
    use std::sync::Arc;

    pub(crate) fn inventory() -> Inventory {
        Inventory {
            pools: vec![Pool {
                id: 1,
                name: "lab".to_string(),
                net_address: "10.0.0.0".to_string(),
                netmask: 24,
                gateway: "10.0.0.1".to_string(),
                start_address: "10.0.0.10".to_string(),
                end_address: "10.0.0.50".to_string(),
                dhcp_relay: None,
            }],
            groups: vec![Group {
                id: 1,
                image_id: 1,
                options: r#"{"ssh":true}"#.to_string(),
                ..Default::default()
            }],
            images: vec![Image {
                id: 1,
                name: "esxi".to_string(),
                path: PathBuf::from("images/ESXi-8.0U2"),
            }],
            hosts: vec![Host {
                id: 7,
                ip: "10.0.0.25".to_string(),
                mac: "00-11-22-33-44-55".to_string(),
                hostname: "esx01".to_string(),
                domain: "lab.local".to_string(),
                pool_id: 1,
                group_id: 1,
                progress: 0,
                progress_text: String::new(),
                reimage: true,
                ks: None,
            }],
        }
    }

    async fn test_store_progress(store: Arc<dyn HostStore>) {
        let record = store.host_by_ip("10.0.0.25").await.unwrap().unwrap();
        assert_eq!(record.host.id, 7);
        assert_eq!(record.host.mac, "00:11:22:33:44:55");
        assert_eq!(record.pool.gateway, "10.0.0.1");

        store.save_progress(7, Stage::MbootEfi).await.unwrap();
        store.set_reimage(7, false).await.unwrap();

        let record = store.host_by_id(7).await.unwrap().unwrap();
        assert_eq!(record.host.progress, 10);
        assert_eq!(record.host.progress_text, "mboot.efi");
        assert!(!record.host.reimage);
        // Narrow writes leave everything else alone
        assert_eq!(record.host.hostname, "esx01");

        assert!(store.host_by_ip("10.0.0.26").await.unwrap().is_none());
        assert!(matches!(
            store.save_progress(99, Stage::Completed).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_store_progress() {
        let store: Arc<dyn HostStore> = Arc::new(MemoryStore::from_inventory(inventory()).unwrap());
        test_store_progress(store).await;
    }
}
