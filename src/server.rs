//! TCP page server over a flat backing file.
//!
//! Serves one client at a time: accept, then loop reading framed
//! requests and writing framed responses until the client disconnects
//! or violates the protocol. The backing file is a plain region of
//! `total_size` bytes with no metadata; DISCARD punches holes but
//! preserves the size.
//!
//! ## Failure handling
//! - Bad magic/version/command or a failed bounds check: one
//!   best-effort ERROR reply, then the connection is closed.
//! - Backing-file I/O errors: ERROR reply, connection continues.
//! - Short reads (file truncated underneath us): EOF status with the
//!   partial payload.
//! - Any connection ending returns the server to `accept`.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::fs::FileExt;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::fsutil::{punch_hole, read_at_full};
use crate::proto::{
    Command, DeviceStat, Request, ResponseHeader, Status, PAGE_SIZE, REQUEST_FRAME_LEN,
};

/// Page-server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Backing file path; created when missing.
    pub file: PathBuf,
    /// Listen address.
    pub addr: String,
    /// Listen port (0 picks an ephemeral port).
    pub port: u16,
    /// Byte size for a newly created backing file. Required when the
    /// file does not exist, forbidden when it does.
    pub size: Option<u64>,
}

/// A bound page server ready to accept clients.
#[derive(Debug)]
pub struct PageServer {
    listener: TcpListener,
    file: File,
    total_size: u64,
}

impl PageServer {
    /// Opens (or creates) the backing file and binds the listener.
    pub fn bind(config: &ServerConfig) -> Result<Self> {
        let existed = config.file.exists();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&config.file)?;

        let total_size = if existed {
            if config.size.is_some() {
                return Err(Error::Config(
                    "size is only accepted when creating a new backing file".into(),
                ));
            }
            file.metadata()?.len()
        } else {
            let size = config.size.ok_or_else(|| {
                Error::Config("size is required when the backing file does not exist".into())
            })?;
            file.set_len(size)?;
            size
        };

        let listener = TcpListener::bind((config.addr.as_str(), config.port))?;
        info!(
            addr = %config.addr,
            port = listener.local_addr().map(|a| a.port()).unwrap_or(config.port),
            file = %config.file.display(),
            total_size,
            "page server listening"
        );
        Ok(Self {
            listener,
            file,
            total_size,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Backing file size in bytes.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Accept loop; serves connections one at a time, forever.
    pub fn run(&self) -> Result<()> {
        loop {
            let (stream, peer) = match self.listener.accept() {
                Ok(conn) => conn,
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    continue;
                },
            };
            debug!(%peer, "client connected");
            match self.serve_connection(stream) {
                Ok(()) => debug!(%peer, "client disconnected"),
                Err(err) => debug!(%peer, error = %err, "connection closed"),
            }
        }
    }

    /// Serves one connection until EOF or a protocol error.
    pub fn serve_connection(&self, mut stream: TcpStream) -> Result<()> {
        loop {
            let mut frame = [0u8; REQUEST_FRAME_LEN];
            match stream.read_exact(&mut frame) {
                Ok(()) => {},
                Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(err) => return Err(err.into()),
            }

            let request = match Request::decode(&frame) {
                Ok(request) => request,
                Err(err) => {
                    // best-effort error reply, then drop the client
                    let _ = self.send_reply(&mut stream, Status::Error, &[]);
                    return Err(err);
                },
            };
            debug!(cmd = ?request.cmd, offset = request.offset, length = request.length, "request");

            match request.cmd {
                Command::Read => self.handle_read(&mut stream, &request)?,
                Command::Write => self.handle_write(&mut stream, &request)?,
                Command::Flush => self.handle_flush(&mut stream)?,
                Command::Discard => self.handle_discard(&mut stream, &request)?,
                Command::Stat => self.handle_stat(&mut stream)?,
            }
        }
    }

    fn check_bounds(&self, offset: u64, length: u32) -> Result<()> {
        let out_of_bounds = Error::OutOfBounds {
            offset,
            length,
            size: self.total_size,
        };
        match offset.checked_add(length as u64) {
            Some(end) if end <= self.total_size => Ok(()),
            _ => Err(out_of_bounds),
        }
    }

    /// Validates the range; on failure sends one ERROR reply and
    /// returns the error so the connection closes.
    fn validated(&self, stream: &mut TcpStream, request: &Request) -> Result<()> {
        if let Err(err) = self.check_bounds(request.offset, request.length) {
            warn!(offset = request.offset, length = request.length, "request out of bounds");
            let _ = self.send_reply(stream, Status::Error, &[]);
            return Err(err);
        }
        Ok(())
    }

    fn handle_read(&self, stream: &mut TcpStream, request: &Request) -> Result<()> {
        self.validated(stream, request)?;
        let mut buf = vec![0u8; request.length as usize];
        match read_at_full(&self.file, &mut buf, request.offset) {
            Ok(filled) if filled == buf.len() => self.send_reply(stream, Status::Ok, &buf),
            Ok(filled) => self.send_reply(stream, Status::Eof, &buf[..filled]),
            Err(err) => {
                warn!(error = %err, "backing read failed");
                self.send_reply(stream, Status::Error, &[])
            },
        }
    }

    fn handle_write(&self, stream: &mut TcpStream, request: &Request) -> Result<()> {
        self.validated(stream, request)?;
        let mut data = vec![0u8; request.length as usize];
        stream.read_exact(&mut data)?;
        match self.file.write_all_at(&data, request.offset) {
            Ok(()) => self.send_reply(stream, Status::Ok, &[]),
            Err(err) => {
                warn!(error = %err, "backing write failed");
                self.send_reply(stream, Status::Error, &[])
            },
        }
    }

    fn handle_flush(&self, stream: &mut TcpStream) -> Result<()> {
        match self.file.sync_all() {
            Ok(()) => self.send_reply(stream, Status::Ok, &[]),
            Err(err) => {
                warn!(error = %err, "fsync failed");
                self.send_reply(stream, Status::Error, &[])
            },
        }
    }

    fn handle_discard(&self, stream: &mut TcpStream, request: &Request) -> Result<()> {
        self.validated(stream, request)?;
        match punch_hole(&self.file, request.offset, request.length as u64) {
            Ok(()) => self.send_reply(stream, Status::Ok, &[]),
            Err(err) => {
                warn!(error = %err, "hole punch failed");
                self.send_reply(stream, Status::Error, &[])
            },
        }
    }

    fn handle_stat(&self, stream: &mut TcpStream) -> Result<()> {
        // re-stat rather than trusting the cached size: the file may
        // have been resized underneath us
        let total_size = match self.file.metadata() {
            Ok(meta) => meta.len(),
            Err(err) => {
                warn!(error = %err, "stat failed");
                return self.send_reply(stream, Status::Error, &[]);
            },
        };
        let stat = DeviceStat {
            total_size,
            page_size: PAGE_SIZE,
        };
        self.send_reply(stream, Status::Ok, &stat.encode())
    }

    fn send_reply(&self, stream: &mut TcpStream, status: Status, payload: &[u8]) -> Result<()> {
        let header = ResponseHeader {
            status,
            length: payload.len() as u32,
        };
        stream.write_all(&header.encode())?;
        if !payload.is_empty() {
            stream.write_all(payload)?;
        }
        Ok(())
    }
}
