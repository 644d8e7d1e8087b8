//! Blocking client for the page-server protocol.
//!
//! One request/response exchange at a time over a single TCP stream.
//! A closed or reset connection surfaces as [`Error::Disconnected`];
//! callers decide whether to [`reconnect`](PageClient::reconnect) and
//! retry. An ERROR status from the server surfaces as
//! [`Error::Remote`] and is never retried here.

use std::io::{self, Read, Write};
use std::net::TcpStream;

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::proto::{
    Command, DeviceStat, Request, ResponseHeader, Status, RESPONSE_FRAME_LEN, STAT_PAYLOAD_LEN,
};

/// Connection to a page server.
#[derive(Debug)]
pub struct PageClient {
    stream: TcpStream,
    host: String,
    port: u16,
}

fn map_transport(err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => Error::Disconnected,
        _ => Error::Io(err),
    }
}

impl PageClient {
    /// Connects to `host:port`.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port))?;
        let _ = stream.set_nodelay(true);
        debug!(host, port, "connected to page server");
        Ok(Self {
            stream,
            host: host.to_string(),
            port,
        })
    }

    /// Replaces the underlying stream with a fresh connection.
    pub fn reconnect(&mut self) -> Result<()> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))?;
        let _ = stream.set_nodelay(true);
        debug!(host = %self.host, port = self.port, "reconnected to page server");
        self.stream = stream;
        Ok(())
    }

    fn send_request(&mut self, cmd: Command, offset: u64, length: u32, payload: &[u8]) -> Result<()> {
        trace!(?cmd, offset, length, "sending request");
        let frame = Request {
            cmd,
            offset,
            length,
        }
        .encode();
        self.stream.write_all(&frame).map_err(map_transport)?;
        if !payload.is_empty() {
            self.stream.write_all(payload).map_err(map_transport)?;
        }
        Ok(())
    }

    fn read_response(&mut self) -> Result<ResponseHeader> {
        let mut frame = [0u8; RESPONSE_FRAME_LEN];
        self.stream.read_exact(&mut frame).map_err(map_transport)?;
        ResponseHeader::decode(&frame)
    }

    fn expect_ok(&mut self) -> Result<()> {
        let header = self.read_response()?;
        match header.status {
            Status::Ok => Ok(()),
            _ => Err(Error::Remote),
        }
    }

    /// READ: returns the payload, which is shorter than `length` only
    /// when the server reported EOF.
    pub fn read(&mut self, offset: u64, length: u32) -> Result<Vec<u8>> {
        self.send_request(Command::Read, offset, length, &[])?;
        let header = self.read_response()?;
        match header.status {
            Status::Ok | Status::Eof => {
                let mut data = vec![0u8; header.length as usize];
                self.stream.read_exact(&mut data).map_err(map_transport)?;
                Ok(data)
            },
            Status::Error => Err(Error::Remote),
        }
    }

    /// WRITE: sends `data` at `offset` and waits for the ack.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.send_request(Command::Write, offset, data.len() as u32, data)?;
        self.expect_ok()
    }

    /// FLUSH: asks the server to sync its backing file.
    pub fn flush(&mut self) -> Result<()> {
        self.send_request(Command::Flush, 0, 0, &[])?;
        self.expect_ok()
    }

    /// DISCARD: punches a hole in the server's backing file.
    pub fn discard(&mut self, offset: u64, length: u32) -> Result<()> {
        self.send_request(Command::Discard, offset, length, &[])?;
        self.expect_ok()
    }

    /// STAT: returns the backing device geometry.
    pub fn stat(&mut self) -> Result<DeviceStat> {
        self.send_request(Command::Stat, 0, 0, &[])?;
        let header = self.read_response()?;
        if header.status != Status::Ok {
            return Err(Error::Remote);
        }
        if header.length as usize != STAT_PAYLOAD_LEN {
            return Err(Error::Protocol(format!(
                "stat payload of {} bytes",
                header.length
            )));
        }
        let mut payload = [0u8; STAT_PAYLOAD_LEN];
        self.stream.read_exact(&mut payload).map_err(map_transport)?;
        Ok(DeviceStat::decode(&payload))
    }
}
