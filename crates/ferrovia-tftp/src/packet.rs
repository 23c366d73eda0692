//! TFTP packet codec
//!
//! Parsing and encoding of the six TFTP packet types, including the option
//! extension (OACK) used for blksize/tsize/timeout/windowsize negotiation.

use crate::error::{Result, TftpError};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// TFTP opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Opcode {
    Rrq = 1,
    Wrq = 2,
    Data = 3,
    Ack = 4,
    Error = 5,
    /// Option acknowledgment (RFC 2347)
    Oack = 6,
}

impl TryFrom<u16> for Opcode {
    type Error = TftpError;

    fn try_from(value: u16) -> Result<Self> {
        Ok(match value {
            1 => Opcode::Rrq,
            2 => Opcode::Wrq,
            3 => Opcode::Data,
            4 => Opcode::Ack,
            5 => Opcode::Error,
            6 => Opcode::Oack,
            _ => return Err(TftpError::InvalidPacket(format!("unknown opcode: {}", value))),
        })
    }
}

/// TFTP error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    NotDefined = 0,
    FileNotFound = 1,
    AccessViolation = 2,
    DiskFull = 3,
    IllegalOperation = 4,
    UnknownTransferId = 5,
    FileAlreadyExists = 6,
    NoSuchUser = 7,
    /// Option negotiation failed (RFC 2347)
    OptionNegotiationFailed = 8,
}

impl From<u16> for ErrorCode {
    fn from(value: u16) -> Self {
        match value {
            1 => ErrorCode::FileNotFound,
            2 => ErrorCode::AccessViolation,
            3 => ErrorCode::DiskFull,
            4 => ErrorCode::IllegalOperation,
            5 => ErrorCode::UnknownTransferId,
            6 => ErrorCode::FileAlreadyExists,
            7 => ErrorCode::NoSuchUser,
            8 => ErrorCode::OptionNegotiationFailed,
            _ => ErrorCode::NotDefined,
        }
    }
}

impl From<&TftpError> for ErrorCode {
    /// Error code reported to the client when a transfer is refused
    fn from(err: &TftpError) -> Self {
        match err {
            TftpError::FileNotFound(_) => ErrorCode::FileNotFound,
            TftpError::AccessDenied(_) => ErrorCode::AccessViolation,
            TftpError::InvalidPacket(_) => ErrorCode::IllegalOperation,
            _ => ErrorCode::NotDefined,
        }
    }
}

/// TFTP transfer mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Octet,
    NetAscii,
}

impl TransferMode {
    fn parse(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("octet") {
            Ok(TransferMode::Octet)
        } else if s.eq_ignore_ascii_case("netascii") {
            Ok(TransferMode::NetAscii)
        } else {
            Err(TftpError::InvalidPacket(format!("unknown mode: {}", s)))
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            TransferMode::Octet => "octet",
            TransferMode::NetAscii => "netascii",
        }
    }
}

/// Negotiable options (RFC 2347, 2348, 2349, 7440)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TftpOptions {
    pub blksize: Option<u16>,
    pub tsize: Option<u64>,
    pub timeout: Option<u8>,
    pub windowsize: Option<u16>,
}

impl TftpOptions {
    pub fn is_empty(&self) -> bool {
        self.blksize.is_none()
            && self.tsize.is_none()
            && self.timeout.is_none()
            && self.windowsize.is_none()
    }

    /// Read NUL-separated `name\0value\0` pairs. Unknown names and
    /// unparseable values are ignored, as RFC 2347 requires.
    fn parse<'a>(mut parts: impl Iterator<Item = &'a [u8]>) -> Self {
        let mut options = TftpOptions::default();
        while let (Some(key), Some(value)) = (parts.next(), parts.next()) {
            if key.is_empty() {
                break;
            }
            let key = String::from_utf8_lossy(key).to_ascii_lowercase();
            let value = String::from_utf8_lossy(value);
            match key.as_str() {
                "blksize" => options.blksize = value.parse().ok(),
                "tsize" => options.tsize = value.parse().ok(),
                "timeout" => options.timeout = value.parse().ok(),
                "windowsize" => options.windowsize = value.parse().ok(),
                _ => {}
            }
        }
        options
    }

    fn encode(&self, buf: &mut BytesMut) {
        let pairs = [
            ("blksize", self.blksize.map(|v| v.to_string())),
            ("tsize", self.tsize.map(|v| v.to_string())),
            ("timeout", self.timeout.map(|v| v.to_string())),
            ("windowsize", self.windowsize.map(|v| v.to_string())),
        ];
        for (name, value) in pairs {
            if let Some(value) = value {
                put_cstr(buf, name);
                put_cstr(buf, &value);
            }
        }
    }
}

fn put_cstr(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
}

/// TFTP packet types
#[derive(Debug, Clone, PartialEq)]
pub enum TftpPacket {
    ReadRequest {
        filename: String,
        mode: TransferMode,
        options: TftpOptions,
    },
    WriteRequest {
        filename: String,
        mode: TransferMode,
        options: TftpOptions,
    },
    Data { block: u16, data: Bytes },
    Ack { block: u16 },
    Error { code: ErrorCode, message: String },
    Oack { options: TftpOptions },
}

impl TftpPacket {
    /// Parse a TFTP packet from bytes
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 2 {
            return Err(TftpError::InvalidPacket("packet too short".to_string()));
        }

        let mut buf = data;
        let opcode = Opcode::try_from(buf.get_u16())?;

        match opcode {
            Opcode::Rrq | Opcode::Wrq => Self::parse_request(buf, opcode == Opcode::Wrq),
            Opcode::Data => {
                let block = Self::read_block_number(&mut buf, "data")?;
                Ok(TftpPacket::Data {
                    block,
                    data: Bytes::copy_from_slice(buf),
                })
            }
            Opcode::Ack => {
                let block = Self::read_block_number(&mut buf, "ack")?;
                Ok(TftpPacket::Ack { block })
            }
            Opcode::Error => {
                let code = ErrorCode::from(Self::read_block_number(&mut buf, "error")?);
                let message = buf
                    .split(|&b| b == 0)
                    .next()
                    .map(|b| String::from_utf8_lossy(b).into_owned())
                    .unwrap_or_default();
                Ok(TftpPacket::Error { code, message })
            }
            Opcode::Oack => Ok(TftpPacket::Oack {
                options: TftpOptions::parse(buf.split(|&b| b == 0)),
            }),
        }
    }

    fn read_block_number(buf: &mut &[u8], kind: &str) -> Result<u16> {
        if buf.len() < 2 {
            return Err(TftpError::InvalidPacket(format!("{} packet too short", kind)));
        }
        Ok(buf.get_u16())
    }

    fn parse_request(data: &[u8], is_write: bool) -> Result<Self> {
        let mut parts = data.split(|&b| b == 0);

        let filename = parts
            .next()
            .filter(|b| !b.is_empty())
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .ok_or_else(|| TftpError::InvalidPacket("missing filename".to_string()))?;

        let mode = parts
            .next()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .ok_or_else(|| TftpError::InvalidPacket("missing mode".to_string()))
            .and_then(|m| TransferMode::parse(&m))?;

        let options = TftpOptions::parse(parts);

        Ok(if is_write {
            TftpPacket::WriteRequest {
                filename,
                mode,
                options,
            }
        } else {
            TftpPacket::ReadRequest {
                filename,
                mode,
                options,
            }
        })
    }

    /// Encode the packet to bytes
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();

        match self {
            TftpPacket::ReadRequest {
                filename,
                mode,
                options,
            }
            | TftpPacket::WriteRequest {
                filename,
                mode,
                options,
            } => {
                let opcode = if matches!(self, TftpPacket::ReadRequest { .. }) {
                    Opcode::Rrq
                } else {
                    Opcode::Wrq
                };
                buf.put_u16(opcode as u16);
                put_cstr(&mut buf, filename);
                put_cstr(&mut buf, mode.as_str());
                options.encode(&mut buf);
            }
            TftpPacket::Data { block, data } => {
                buf.put_u16(Opcode::Data as u16);
                buf.put_u16(*block);
                buf.put_slice(data);
            }
            TftpPacket::Ack { block } => {
                buf.put_u16(Opcode::Ack as u16);
                buf.put_u16(*block);
            }
            TftpPacket::Error { code, message } => {
                buf.put_u16(Opcode::Error as u16);
                buf.put_u16(*code as u16);
                put_cstr(&mut buf, message);
            }
            TftpPacket::Oack { options } => {
                buf.put_u16(Opcode::Oack as u16);
                options.encode(&mut buf);
            }
        }

        buf.freeze()
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        TftpPacket::Error {
            code,
            message: message.into(),
        }
    }

    pub fn data(block: u16, data: impl Into<Bytes>) -> Self {
        TftpPacket::Data {
            block,
            data: data.into(),
        }
    }

    pub fn ack(block: u16) -> Self {
        TftpPacket::Ack { block }
    }

    pub fn oack(options: TftpOptions) -> Self {
        TftpPacket::Oack { options }
    }

    /// Build a read request, as a PXE client would send it
    pub fn read_request(filename: impl Into<String>, options: TftpOptions) -> Self {
        TftpPacket::ReadRequest {
            filename: filename.into(),
            mode: TransferMode::Octet,
            options,
        }
    }
}
