//! ferrovia boot content
//!
//! Generated files served during an ESXi network install:
//!
//! - **boot.cfg**: the vendor boot configuration from the install media,
//!   patched so the installer fetches its kickstart from us and comes up with
//!   the host's static network settings.
//! - **ks.cfg**: the per-host kickstart script, rendered from the built-in
//!   template or a host/group override.
//!
//! # Example
//!
//! ```
//! use ferrovia_boot::{patch_boot_cfg, BootConfigContext};
//!
//! let ctx = BootConfigContext {
//!     kickstart_url: "https://10.0.0.2:8443/ks.cfg".to_string(),
//!     mac: "00:11:22:33:44:55".to_string(),
//!     ip: "10.0.0.25".to_string(),
//!     netmask: "255.255.255.0".to_string(),
//!     gateway: "10.0.0.1".to_string(),
//!     vlan: None,
//!     allow_legacy_cpu: false,
//!     prefix: "ESXi-8.0U2".to_string(),
//! };
//!
//! let patched = patch_boot_cfg(b"prefix=/old\nkernelopt=runweasel\n", &ctx).unwrap();
//! let text = String::from_utf8(patched).unwrap();
//! assert!(text.contains("kernelopt=runweasel ks=https://10.0.0.2:8443/ks.cfg"));
//! assert!(text.contains("prefix=ESXi-8.0U2"));
//! ```

pub mod bootcfg;
pub mod error;
pub mod kickstart;

pub use bootcfg::*;
pub use error::*;
pub use kickstart::*;
