//! Error types for the TFTP server

use std::net::SocketAddr;
use thiserror::Error;

/// Error type for TFTP operations
#[derive(Debug, Error)]
pub enum TftpError {
    /// Failed to bind to socket
    #[error("failed to bind to {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// No file source for the requested name
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// The provider refused the request (unknown client, bad state, ...)
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Invalid TFTP packet
    #[error("invalid TFTP packet: {0}")]
    InvalidPacket(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The file changed size underneath an active transfer
    #[error("short read on {filename}: expected {expected} bytes at offset {offset}")]
    ShortRead {
        filename: String,
        offset: u64,
        expected: usize,
    },

    /// Transfer timeout
    #[error("transfer timeout for {filename}")]
    Timeout { filename: String },

    /// Transfer aborted by client
    #[error("transfer aborted: {reason}")]
    Aborted { reason: String },
}

/// Result type for TFTP operations
pub type Result<T> = std::result::Result<T, TftpError>;
