//! TFTP server implementation
//!
//! One task per read request. Each transfer gets its own ephemeral socket,
//! connected to the client, which also tells us which local address the
//! client reached us on.

use crate::error::{Result, TftpError};
use crate::packet::{ErrorCode, TftpOptions, TftpPacket};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::SeekFrom;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, watch};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Default block size (RFC 1350)
pub const DEFAULT_BLOCK_SIZE: u16 = 512;

/// Maximum block size (RFC 2348)
pub const MAX_BLOCK_SIZE: u16 = 65464;

/// Default timeout in seconds
pub const DEFAULT_TIMEOUT: u8 = 5;

/// Maximum retries per window
pub const MAX_RETRIES: u32 = 5;

/// Default window size (RFC 1350 single-block lockstep)
pub const DEFAULT_WINDOW_SIZE: u16 = 1;

/// Maximum window size we accept
pub const MAX_WINDOW_SIZE: u16 = 64;

/// One read request, as seen by a [`FileProvider`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootRequest {
    /// Address and port the request came from
    pub remote: SocketAddr,
    /// Filename exactly as the client sent it
    pub filename: String,
    /// Our address on the interface the client reached
    pub local: IpAddr,
}

impl BootRequest {
    pub fn remote_ip(&self) -> IpAddr {
        self.remote.ip()
    }
}

/// Content to send for a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootFile {
    /// Generated content
    Buffer(Bytes),
    /// File on disk, size taken from its metadata when it was resolved
    File { path: PathBuf, size: u64 },
}

impl BootFile {
    /// Resolve a path on disk to a file source, recording its exact size
    pub async fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let meta = tokio::fs::metadata(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TftpError::FileNotFound(path.display().to_string())
            } else {
                TftpError::IoError(e)
            }
        })?;
        if !meta.is_file() {
            return Err(TftpError::FileNotFound(path.display().to_string()));
        }
        Ok(BootFile::File {
            path,
            size: meta.len(),
        })
    }

    /// Size advertised through the `tsize` option
    pub fn size(&self) -> u64 {
        match self {
            BootFile::Buffer(data) => data.len() as u64,
            BootFile::File { size, .. } => *size,
        }
    }

    async fn reader(&self) -> Result<BlockReader> {
        Ok(match self {
            BootFile::Buffer(data) => BlockReader::Buffer(data.clone()),
            BootFile::File { path, size } => BlockReader::File {
                file: File::open(path).await?,
                name: path.display().to_string(),
                size: *size,
            },
        })
    }
}

/// Random access over a [`BootFile`], needed for window retransmits
enum BlockReader {
    Buffer(Bytes),
    File { file: File, name: String, size: u64 },
}

impl BlockReader {
    async fn read_block(&mut self, offset: u64, block_size: usize) -> Result<Bytes> {
        match self {
            BlockReader::Buffer(data) => {
                let start = (offset as usize).min(data.len());
                let end = (start + block_size).min(data.len());
                Ok(data.slice(start..end))
            }
            BlockReader::File { file, name, size } => {
                let remaining = size.saturating_sub(offset);
                let expected = remaining.min(block_size as u64) as usize;
                let mut block = vec![0u8; expected];
                if expected > 0 {
                    file.seek(SeekFrom::Start(offset)).await?;
                    file.read_exact(&mut block).await.map_err(|e| {
                        if e.kind() == std::io::ErrorKind::UnexpectedEof {
                            TftpError::ShortRead {
                                filename: name.clone(),
                                offset,
                                expected,
                            }
                        } else {
                            TftpError::IoError(e)
                        }
                    })?;
                }
                Ok(Bytes::from(block))
            }
        }
    }
}

/// Resolves read requests to content
#[async_trait]
pub trait FileProvider: Send + Sync {
    /// Resolve a request. Errors abort the transfer and are reported to the
    /// client as a TFTP error packet.
    async fn open(&self, request: &BootRequest) -> Result<BootFile>;
}

/// Event emitted by the TFTP server
#[derive(Debug, Clone)]
pub enum TftpEvent {
    Started { bind_addr: SocketAddr },
    TransferStarted {
        client: SocketAddr,
        filename: String,
        size: u64,
    },
    TransferCompleted {
        client: SocketAddr,
        filename: String,
        bytes_sent: u64,
    },
    TransferFailed {
        client: SocketAddr,
        filename: String,
        error: String,
    },
    Stopped,
}

/// TFTP server
pub struct TftpServer {
    socket: UdpSocket,
    file_provider: Arc<dyn FileProvider>,
    event_sender: broadcast::Sender<TftpEvent>,
    default_timeout: u8,
}

impl TftpServer {
    /// Bind the listening socket
    pub async fn bind(bind_addr: SocketAddr, file_provider: Arc<dyn FileProvider>) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| TftpError::BindFailed {
                addr: bind_addr,
                source: e,
            })?;
        let (event_sender, _) = broadcast::channel(1024);
        Ok(Self {
            socket,
            file_provider,
            event_sender,
            default_timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Retransmit timeout used when the client does not negotiate one
    pub fn with_timeout(mut self, secs: u8) -> Self {
        self.default_timeout = secs.max(1);
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Subscribe to server events
    pub fn subscribe(&self) -> broadcast::Receiver<TftpEvent> {
        self.event_sender.subscribe()
    }

    /// Serve until `shutdown` flips to `true`
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let bind_addr = self.local_addr()?;
        info!(addr = %bind_addr, "TFTP server started");
        let _ = self.event_sender.send(TftpEvent::Started { bind_addr });

        let mut buf = [0u8; 65535];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, src)) => {
                            let transfer = Transfer {
                                local_bind: bind_addr.ip(),
                                client: src,
                                file_provider: self.file_provider.clone(),
                                event_sender: self.event_sender.clone(),
                                default_timeout: self.default_timeout,
                            };
                            let data = buf[..len].to_vec();

                            tokio::spawn(async move {
                                if let Err(e) = transfer.handle(data).await {
                                    error!(error = %e, client = %src, "Error handling TFTP request");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Error receiving packet");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("TFTP server shutting down");
                        let _ = self.event_sender.send(TftpEvent::Stopped);
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for TftpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TftpServer")
            .field("socket", &self.socket.local_addr().ok())
            .finish_non_exhaustive()
    }
}

/// State for a single request
struct Transfer {
    local_bind: IpAddr,
    client: SocketAddr,
    file_provider: Arc<dyn FileProvider>,
    event_sender: broadcast::Sender<TftpEvent>,
    default_timeout: u8,
}

impl Transfer {
    async fn handle(self, data: Vec<u8>) -> Result<()> {
        // The transfer socket doubles as our TID and tells us which local
        // address routes back to the client.
        let socket = UdpSocket::bind(SocketAddr::new(self.local_bind, 0)).await?;
        socket.connect(self.client).await?;

        let packet = match TftpPacket::parse(&data) {
            Ok(packet) => packet,
            Err(e) => {
                return send_error(&socket, ErrorCode::IllegalOperation, &e.to_string()).await;
            }
        };

        match packet {
            TftpPacket::ReadRequest {
                filename, options, ..
            } => {
                let request = BootRequest {
                    remote: self.client,
                    filename,
                    local: socket.local_addr()?.ip(),
                };
                self.read(&socket, request, options).await
            }
            TftpPacket::WriteRequest { .. } => {
                send_error(&socket, ErrorCode::AccessViolation, "Write not supported").await
            }
            _ => send_error(&socket, ErrorCode::IllegalOperation, "Unexpected packet").await,
        }
    }

    fn failed(&self, filename: &str, error: impl Into<String>) {
        let _ = self.event_sender.send(TftpEvent::TransferFailed {
            client: self.client,
            filename: filename.to_string(),
            error: error.into(),
        });
    }

    async fn read(&self, socket: &UdpSocket, request: BootRequest, options: TftpOptions) -> Result<()> {
        let filename = request.filename.clone();
        debug!(client = %self.client, filename = %filename, local = %request.local, "Read request");

        let file = match self.file_provider.open(&request).await {
            Ok(file) => file,
            Err(e) => {
                warn!(client = %self.client, filename = %filename, error = %e, "Transfer refused");
                self.failed(&filename, e.to_string());
                return send_error(socket, ErrorCode::from(&e), &e.to_string()).await;
            }
        };

        let mut reader = match file.reader().await {
            Ok(reader) => reader,
            Err(e) => {
                self.failed(&filename, e.to_string());
                send_error(socket, ErrorCode::NotDefined, &e.to_string()).await?;
                return Err(e);
            }
        };

        let file_size = file.size();
        let mut block_size = options
            .blksize
            .map(|b| b.clamp(8, MAX_BLOCK_SIZE))
            .unwrap_or(DEFAULT_BLOCK_SIZE);
        let mut window_size = options
            .windowsize
            .map(|w| w.clamp(1, MAX_WINDOW_SIZE))
            .unwrap_or(DEFAULT_WINDOW_SIZE);
        let timeout_duration =
            Duration::from_secs(options.timeout.unwrap_or(self.default_timeout).max(1) as u64);

        // RFC 2347: only echo options the client asked for. A client that
        // rejects the OACK gets a plain 512-byte lockstep transfer.
        if !options.is_empty() {
            let oack = TftpPacket::oack(TftpOptions {
                blksize: options.blksize.map(|_| block_size),
                tsize: options.tsize.map(|_| file_size),
                timeout: options.timeout,
                windowsize: options.windowsize.map(|_| window_size),
            });
            socket.send(&oack.encode()).await?;

            let mut ack_buf = [0u8; 512];
            match timeout(timeout_duration, socket.recv(&mut ack_buf)).await {
                Ok(Ok(len)) => match TftpPacket::parse(&ack_buf[..len])? {
                    TftpPacket::Ack { block: 0 } => {}
                    TftpPacket::Error { code, message } => {
                        warn!(
                            client = %self.client,
                            code = ?code,
                            message = %message,
                            "Client rejected OACK, falling back to defaults"
                        );
                        block_size = DEFAULT_BLOCK_SIZE;
                        window_size = DEFAULT_WINDOW_SIZE;
                    }
                    _ => {
                        return send_error(socket, ErrorCode::IllegalOperation, "Expected ACK").await;
                    }
                },
                Ok(Err(e)) => return Err(TftpError::IoError(e)),
                Err(_) => {
                    self.failed(&filename, "Timeout waiting for OACK acknowledgment");
                    return Err(TftpError::Timeout { filename });
                }
            }
        }

        let _ = self.event_sender.send(TftpEvent::TransferStarted {
            client: self.client,
            filename: filename.clone(),
            size: file_size,
        });

        let sent = self
            .send_blocks(socket, &mut reader, &filename, block_size, window_size, timeout_duration)
            .await;

        match sent {
            Ok(true) => {
                info!(client = %self.client, filename = %filename, bytes = file_size, "Transfer completed");
                let _ = self.event_sender.send(TftpEvent::TransferCompleted {
                    client: self.client,
                    filename,
                    bytes_sent: file_size,
                });
                Ok(())
            }
            // Client sent an error packet mid-transfer; already reported.
            Ok(false) => Ok(()),
            Err(e) => {
                self.failed(&filename, e.to_string());
                if matches!(e, TftpError::IoError(_) | TftpError::ShortRead { .. }) {
                    let _ = send_error(socket, ErrorCode::NotDefined, &e.to_string()).await;
                }
                Err(e)
            }
        }
    }

    /// Windowed DATA/ACK loop (RFC 7440; window 1 is plain RFC 1350).
    ///
    /// Returns `Ok(false)` when the client aborted with an error packet.
    async fn send_blocks(
        &self,
        socket: &UdpSocket,
        reader: &mut BlockReader,
        filename: &str,
        block_size: u16,
        window_size: u16,
        timeout_duration: Duration,
    ) -> Result<bool> {
        let block_len = block_size as usize;
        let mut block_num: u16 = 1;
        let mut offset: u64 = 0;
        let mut retries = 0;

        loop {
            let window_start_block = block_num;
            let window_start_offset = offset;
            let mut sent_count: u16 = 0;
            let mut is_final_window = false;

            for _ in 0..window_size {
                let data = reader.read_block(offset, block_len).await?;
                let is_last_block = data.len() < block_len;
                let current_block = window_start_block.wrapping_add(sent_count);

                offset += data.len() as u64;
                socket.send(&TftpPacket::data(current_block, data).encode()).await?;
                sent_count += 1;

                // A short (possibly empty) block ends the transfer
                if is_last_block {
                    is_final_window = true;
                    break;
                }
            }

            let window_last_block = window_start_block.wrapping_add(sent_count - 1);

            'ack: loop {
                let mut ack_buf = [0u8; 512];
                match timeout(timeout_duration, socket.recv(&mut ack_buf)).await {
                    Ok(Ok(len)) => match TftpPacket::parse(&ack_buf[..len])? {
                        TftpPacket::Ack { block } if block == window_last_block => {
                            block_num = window_last_block.wrapping_add(1);
                            retries = 0;
                            break 'ack;
                        }
                        TftpPacket::Ack { block } => {
                            let acked = block.wrapping_sub(window_start_block).wrapping_add(1);
                            if acked > 0 && acked < sent_count {
                                // Partial window: resend from the first missing block
                                offset = window_start_offset + acked as u64 * block_len as u64;
                                block_num = block.wrapping_add(1);
                                is_final_window = false;
                                debug!(client = %self.client, acked = block, "Partial window ACK");
                                break 'ack;
                            }
                            // Stale ACK from an earlier window
                            continue 'ack;
                        }
                        TftpPacket::Error { code, message } => {
                            warn!(client = %self.client, code = ?code, message = %message, "Client error");
                            self.failed(filename, message);
                            return Ok(false);
                        }
                        _ => {
                            retries += 1;
                            if retries >= MAX_RETRIES {
                                return Err(TftpError::Timeout {
                                    filename: filename.to_string(),
                                });
                            }
                        }
                    },
                    Ok(Err(e)) => return Err(TftpError::IoError(e)),
                    Err(_) => {
                        retries += 1;
                        if retries >= MAX_RETRIES {
                            return Err(TftpError::Timeout {
                                filename: filename.to_string(),
                            });
                        }
                        offset = window_start_offset;
                        block_num = window_start_block;
                        is_final_window = false;
                        debug!(client = %self.client, retry = retries, "Window timeout, retransmitting");
                        break 'ack;
                    }
                }
            }

            if is_final_window {
                return Ok(true);
            }
        }
    }
}

async fn send_error(socket: &UdpSocket, code: ErrorCode, message: &str) -> Result<()> {
    socket.send(&TftpPacket::error(code, message).encode()).await?;
    Ok(())
}
