use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid IP address: {0}")]
    InvalidAddress(String),

    #[error("invalid network: {0}")]
    InvalidNetwork(String),

    #[error("the ip address is not in the scope of the dhcp pool associated with the group")]
    OutOfPool,

    #[error("invalid MAC address: {0}")]
    InvalidMac(String),

    #[error("invalid group options: {0}")]
    InvalidOptions(String),
}
