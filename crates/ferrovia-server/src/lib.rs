//! ferrovia provisioning server
//!
//! Wires the pieces of an ESXi network install together:
//!
//! - [`boot_files`]: TFTP file resolution keyed on the requesting host,
//!   including the per-host boot.cfg
//! - [`http`]: `GET /ks.cfg` and the post-configuration endpoints
//! - [`provisioning`]: the background worker that completes a host
//! - [`services`]: starts both listeners with a shared shutdown signal
//!
//! Host state lives behind the [`store::HostStore`] trait; the bundled
//! [`store::MemoryStore`] is seeded from the configuration file.

pub mod boot_files;
pub mod config;
pub mod encryption;
pub mod error;
pub mod http;
pub mod provisioning;
pub mod services;
pub mod store;

pub use boot_files::BootFileProvider;
pub use config::{ConfigError, Inventory, ServerConfig};
pub use encryption::SecretCipher;
pub use error::{ProvisionError, ServiceError};
pub use provisioning::ProvisioningCoordinator;
pub use services::{ServiceHandles, ServiceRunner};
pub use store::{validate_host_address, HostStore, MemoryStore, StoreError};
