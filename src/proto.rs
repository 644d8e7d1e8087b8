//! Page-server wire format.
//!
//! All multi-byte integers are little-endian unsigned; frames have no
//! padding beyond the reserved bytes shown.
//!
//! ```text
//!   request (28 bytes)                 response (20 bytes)
//!   ┌────────────┬──────┐              ┌────────────┬──────┐
//!   │ magic      │ u32  │              │ magic      │ u32  │
//!   │ version    │ u32  │              │ version    │ u32  │
//!   │ cmd        │ u8   │              │ status     │ u8   │
//!   │ reserved   │ 3×u8 │              │ reserved   │ 3×u8 │
//!   │ offset     │ u64  │              │ length     │ u32  │
//!   │ length     │ u32  │              │ reserved   │ u32  │
//!   │ reserved   │ u32  │              └────────────┴──────┘
//!   └────────────┴──────┘
//! ```
//!
//! WRITE carries `length` payload bytes after the request frame; READ
//! replies carry `length` payload bytes after the response frame (EOF
//! status for short reads); STAT replies carry a 16-byte
//! [`DeviceStat`] payload.

use crate::error::{Error, Result};

/// "PAGE" in ASCII.
pub const PAGE_MAGIC: u32 = 0x5041_4745;
/// Wire protocol version.
pub const PROTOCOL_VERSION: u32 = 1;
/// Page size reported by STAT.
pub const PAGE_SIZE: u32 = 4096;

pub const REQUEST_FRAME_LEN: usize = 28;
pub const RESPONSE_FRAME_LEN: usize = 20;
pub const STAT_PAYLOAD_LEN: usize = 16;

/// Request commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Read = 1,
    Write = 2,
    Flush = 3,
    Discard = 4,
    Stat = 5,
}

impl Command {
    pub fn from_wire(raw: u8) -> Option<Command> {
        match raw {
            1 => Some(Command::Read),
            2 => Some(Command::Write),
            3 => Some(Command::Flush),
            4 => Some(Command::Discard),
            5 => Some(Command::Stat),
            _ => None,
        }
    }

    pub fn as_wire(self) -> u8 {
        self as u8
    }
}

/// Response status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok = 0,
    Error = 1,
    Eof = 2,
}

impl Status {
    pub fn from_wire(raw: u8) -> Option<Status> {
        match raw {
            0 => Some(Status::Ok),
            1 => Some(Status::Error),
            2 => Some(Status::Eof),
            _ => None,
        }
    }

    pub fn as_wire(self) -> u8 {
        self as u8
    }
}

#[inline]
fn le_u32(buf: &[u8]) -> u32 {
    u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
}

#[inline]
fn le_u64(buf: &[u8]) -> u64 {
    u64::from_le_bytes([
        buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
    ])
}

fn check_magic(magic: u32, version: u32) -> Result<()> {
    if magic != PAGE_MAGIC {
        return Err(Error::Protocol(format!("bad magic {magic:#010x}")));
    }
    if version != PROTOCOL_VERSION {
        return Err(Error::Protocol(format!("unsupported version {version}")));
    }
    Ok(())
}

/// A framed request: command plus byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub cmd: Command,
    pub offset: u64,
    pub length: u32,
}

impl Request {
    pub fn encode(&self) -> [u8; REQUEST_FRAME_LEN] {
        let mut buf = [0u8; REQUEST_FRAME_LEN];
        buf[0..4].copy_from_slice(&PAGE_MAGIC.to_le_bytes());
        buf[4..8].copy_from_slice(&PROTOCOL_VERSION.to_le_bytes());
        buf[8] = self.cmd.as_wire();
        buf[12..20].copy_from_slice(&self.offset.to_le_bytes());
        buf[20..24].copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8; REQUEST_FRAME_LEN]) -> Result<Self> {
        check_magic(le_u32(&buf[0..4]), le_u32(&buf[4..8]))?;
        let cmd = Command::from_wire(buf[8])
            .ok_or_else(|| Error::Protocol(format!("unknown command {}", buf[8])))?;
        Ok(Self {
            cmd,
            offset: le_u64(&buf[12..20]),
            length: le_u32(&buf[20..24]),
        })
    }
}

/// A framed response header; `length` counts the payload that follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub status: Status,
    pub length: u32,
}

impl ResponseHeader {
    pub fn encode(&self) -> [u8; RESPONSE_FRAME_LEN] {
        let mut buf = [0u8; RESPONSE_FRAME_LEN];
        buf[0..4].copy_from_slice(&PAGE_MAGIC.to_le_bytes());
        buf[4..8].copy_from_slice(&PROTOCOL_VERSION.to_le_bytes());
        buf[8] = self.status.as_wire();
        buf[12..16].copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8; RESPONSE_FRAME_LEN]) -> Result<Self> {
        check_magic(le_u32(&buf[0..4]), le_u32(&buf[4..8]))?;
        let status = Status::from_wire(buf[8])
            .ok_or_else(|| Error::Protocol(format!("unknown status {}", buf[8])))?;
        Ok(Self {
            status,
            length: le_u32(&buf[12..16]),
        })
    }
}

/// STAT payload: backing device geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStat {
    pub total_size: u64,
    pub page_size: u32,
}

impl DeviceStat {
    pub fn encode(&self) -> [u8; STAT_PAYLOAD_LEN] {
        let mut buf = [0u8; STAT_PAYLOAD_LEN];
        buf[0..8].copy_from_slice(&self.total_size.to_le_bytes());
        buf[8..12].copy_from_slice(&self.page_size.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8; STAT_PAYLOAD_LEN]) -> Self {
        Self {
            total_size: le_u64(&buf[0..8]),
            page_size: le_u32(&buf[8..12]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_layout_is_bit_exact() {
        let frame = Request {
            cmd: Command::Read,
            offset: 0x0102_0304_0506_0708,
            length: 0x0A0B_0C0D,
        }
        .encode();

        assert_eq!(&frame[0..4], &[0x45, 0x47, 0x41, 0x50]); // "EGAP" little-endian
        assert_eq!(&frame[4..8], &[1, 0, 0, 0]);
        assert_eq!(frame[8], 1);
        assert_eq!(&frame[9..12], &[0, 0, 0]);
        assert_eq!(&frame[12..20], &[8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(&frame[20..24], &[0x0D, 0x0C, 0x0B, 0x0A]);
        assert_eq!(&frame[24..28], &[0, 0, 0, 0]);
    }

    #[test]
    fn request_decode_validates_magic() {
        let mut frame = Request {
            cmd: Command::Flush,
            offset: 0,
            length: 0,
        }
        .encode();
        frame[0] ^= 0xFF;
        assert!(matches!(
            Request::decode(&frame),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn request_decode_validates_version() {
        let mut frame = Request {
            cmd: Command::Flush,
            offset: 0,
            length: 0,
        }
        .encode();
        frame[4] = 9;
        assert!(matches!(Request::decode(&frame), Err(Error::Protocol(_))));
    }

    #[test]
    fn request_decode_rejects_unknown_command() {
        let mut frame = Request {
            cmd: Command::Stat,
            offset: 0,
            length: 0,
        }
        .encode();
        frame[8] = 77;
        assert!(matches!(Request::decode(&frame), Err(Error::Protocol(_))));
    }

    #[test]
    fn response_header_round_trips_status_codes() {
        for status in [Status::Ok, Status::Error, Status::Eof] {
            let header = ResponseHeader {
                status,
                length: 4096,
            };
            let decoded = ResponseHeader::decode(&header.encode()).unwrap();
            assert_eq!(decoded, header);
        }
    }

    #[test]
    fn stat_payload_layout() {
        let stat = DeviceStat {
            total_size: 65536,
            page_size: PAGE_SIZE,
        };
        let buf = stat.encode();
        assert_eq!(&buf[0..8], &[0, 0, 1, 0, 0, 0, 0, 0]);
        assert_eq!(&buf[8..12], &[0, 16, 0, 0]);
        assert_eq!(&buf[12..16], &[0, 0, 0, 0]);
        assert_eq!(DeviceStat::decode(&buf), stat);
    }
}
