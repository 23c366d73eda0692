//! ferrovia TFTP server
//!
//! Read-only TFTP (RFC 1350) with option negotiation (RFC 2347), block size
//! (RFC 2348), timeout/transfer size (RFC 2349) and windowed transfers
//! (RFC 7440).
//!
//! The server knows nothing about hosts or images. Every read request is
//! turned into a [`BootRequest`] (who asked, for what, on which of our
//! addresses) and handed to a [`FileProvider`], which answers with a
//! [`BootFile`]: either an in-memory buffer or a file on disk that is
//! streamed block by block.
//!
//! # Example
//!
//! ```ignore
//! use async_trait::async_trait;
//! use ferrovia_tftp::{BootFile, BootRequest, FileProvider, TftpServer};
//! use std::sync::Arc;
//!
//! struct Images;
//!
//! #[async_trait]
//! impl FileProvider for Images {
//!     async fn open(&self, request: &BootRequest) -> ferrovia_tftp::Result<BootFile> {
//!         BootFile::from_path(format!("images/{}", request.filename.trim_start_matches('/'))).await
//!     }
//! }
//!
//! let server = TftpServer::bind("0.0.0.0:69".parse()?, Arc::new(Images)).await?;
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! server.run(shutdown_rx).await?;
//! ```

pub mod error;
pub mod packet;
pub mod server;

pub use error::*;
pub use packet::*;
pub use server::*;
