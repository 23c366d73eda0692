//! In-memory storage backend
//!
//! Seeded from the configured inventory. Also used by tests.

use super::{validate_host_address, HostStore, Result, StoreError};
use crate::config::Inventory;
use async_trait::async_trait;
use ferrovia_common::{Group, Host, HostRecord, Image, Pool, Stage};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::info;

/// In-memory storage backend
#[derive(Default)]
pub struct MemoryStore {
    hosts: RwLock<HashMap<u64, Host>>,
    pools: RwLock<HashMap<u64, Pool>>,
    groups: RwLock<HashMap<u64, Group>>,
    images: RwLock<HashMap<u64, Image>>,
    /// Index: IP address -> host ID
    ip_index: RwLock<HashMap<String, u64>>,
}

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Database(format!("lock poisoned: {}", e))
}

impl MemoryStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from an inventory, validating every host address
    pub fn from_inventory(inventory: Inventory) -> Result<Self> {
        let store = Self::new();
        for pool in inventory.pools {
            store.put_pool(pool)?;
        }
        for image in inventory.images {
            store.put_image(image)?;
        }
        for group in inventory.groups {
            store.put_group(group)?;
        }
        for host in inventory.hosts {
            store.register_host(host)?;
        }
        Ok(store)
    }

    pub fn put_pool(&self, pool: Pool) -> Result<()> {
        self.pools.write().map_err(poisoned)?.insert(pool.id, pool);
        Ok(())
    }

    pub fn put_group(&self, group: Group) -> Result<()> {
        self.groups.write().map_err(poisoned)?.insert(group.id, group);
        Ok(())
    }

    pub fn put_image(&self, image: Image) -> Result<()> {
        self.images.write().map_err(poisoned)?.insert(image.id, image);
        Ok(())
    }

    /// Add a host after checking its address against its pool.
    ///
    /// The MAC is stored in normalized form. Address and MAC errors carry
    /// the operator-facing message.
    pub fn register_host(&self, mut host: Host) -> Result<()> {
        let pool = self
            .pools
            .read()
            .map_err(poisoned)?
            .get(&host.pool_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("pool {}", host.pool_id)))?;
        validate_host_address(&mut host, &pool)?;

        let mut index = self.ip_index.write().map_err(poisoned)?;
        let mut hosts = self.hosts.write().map_err(poisoned)?;
        if let Some(existing) = index.get(&host.ip) {
            if *existing != host.id {
                return Err(StoreError::AlreadyExists(format!(
                    "ip {} is assigned to host {}",
                    host.ip, existing
                )));
            }
        }
        // Re-registration with a new address releases the old one
        if let Some(previous) = hosts.get(&host.id) {
            if previous.ip != host.ip && index.get(&previous.ip) == Some(&host.id) {
                index.remove(&previous.ip);
            }
        }
        index.insert(host.ip.clone(), host.id);

        info!(host_id = host.id, ip = %host.ip, mac = %host.mac, "Registered host");
        hosts.insert(host.id, host);
        Ok(())
    }

    fn resolve(&self, host: Host) -> Result<HostRecord> {
        let pool = self
            .pools
            .read()
            .map_err(poisoned)?
            .get(&host.pool_id)
            .cloned()
            .ok_or_else(|| StoreError::InvalidData(format!("host {} references missing pool {}", host.id, host.pool_id)))?;
        let group = self
            .groups
            .read()
            .map_err(poisoned)?
            .get(&host.group_id)
            .cloned()
            .ok_or_else(|| StoreError::InvalidData(format!("host {} references missing group {}", host.id, host.group_id)))?;
        let image = self
            .images
            .read()
            .map_err(poisoned)?
            .get(&group.image_id)
            .cloned()
            .ok_or_else(|| StoreError::InvalidData(format!("group {} references missing image {}", group.id, group.image_id)))?;
        Ok(HostRecord {
            host,
            pool,
            group,
            image,
        })
    }

    fn update_host(&self, host_id: u64, update: impl FnOnce(&mut Host)) -> Result<()> {
        let mut hosts = self.hosts.write().map_err(poisoned)?;
        let host = hosts
            .get_mut(&host_id)
            .ok_or_else(|| StoreError::NotFound(format!("host {}", host_id)))?;
        update(host);
        Ok(())
    }
}

#[async_trait]
impl HostStore for MemoryStore {
    async fn host_by_ip(&self, ip: &str) -> Result<Option<HostRecord>> {
        let id = match self.ip_index.read().map_err(poisoned)?.get(ip) {
            Some(id) => *id,
            None => return Ok(None),
        };
        self.host_by_id(id).await
    }

    async fn host_by_id(&self, id: u64) -> Result<Option<HostRecord>> {
        let host = self.hosts.read().map_err(poisoned)?.get(&id).cloned();
        host.map(|h| self.resolve(h)).transpose()
    }

    async fn save_progress(&self, host_id: u64, stage: Stage) -> Result<()> {
        self.update_host(host_id, |host| host.set_stage(stage))
    }

    async fn set_reimage(&self, host_id: u64, reimage: bool) -> Result<()> {
        self.update_host(host_id, |host| host.reimage = reimage)
    }
}
