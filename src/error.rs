//! Error types shared across the crate.
//!
//! Cache-manager operations are infallible by contract (they surface
//! "not found" and "no evictable slot" as `bool`/`Option` returns), so
//! [`Error`] covers everything else: configuration validation, the page
//! server wire protocol, backing-file I/O, and transport failures seen
//! by the block device front-end.

use thiserror::Error;

/// Unified error type for the page server, client, and device front-end.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("request out of bounds: offset {offset} + length {length} exceeds size {size}")]
    OutOfBounds { offset: u64, length: u32, size: u64 },

    #[error("page server replied with error status")]
    Remote,

    #[error("connection to page server lost")]
    Disconnected,

    #[error("no evictable cache slot available")]
    CacheFull,

    #[error("fetch for sector {sector} failed: {reason}")]
    Fetch { sector: u64, reason: String },
}

/// Result alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
