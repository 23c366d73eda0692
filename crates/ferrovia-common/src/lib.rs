//! Shared provisioning model for ferrovia.
//!
//! Hosts, pools, groups and images as the rest of the workspace sees them,
//! the ordered provisioning [`Stage`] and the pool address validator.

pub mod error;
pub mod models;
pub mod network;
pub mod stage;

pub use error::Error;
pub use models::*;
pub use network::{netmask_from_prefix, normalize_mac, validate_address};
pub use stage::Stage;

pub type Result<T> = std::result::Result<T, Error>;
