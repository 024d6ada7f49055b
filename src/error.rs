//! Error types for the wire codec, peer session and crawler.
//!
//! Each component gets its own enum rather than one crate-wide error; this
//! keeps `match`es at call sites narrow and keeps `Display` messages usable
//! directly in `tracing` calls.

use thiserror::Error;

/// Failures decoding or framing a message on the wire.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("unexpected end of buffer")]
    UnexpectedEof,

    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("bad magic bytes")]
    BadMagic,

    #[error("checksum mismatch")]
    ChecksumMismatch,

    #[error("invalid command bytes")]
    InvalidCommand,

    #[error("invalid utf-8 in var-string")]
    InvalidUtf8,

    #[error("malformed addr payload")]
    MalformedAddr,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures in the lifecycle of a single peer session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("already connected")]
    AlreadyConnected,

    #[error("connect failed: {0}")]
    ConnectFailed(std::io::Error),

    #[error("connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("getaddr failed: {0}")]
    GetAddrFailed(std::io::Error),

    #[error("read timed out after {0:?}")]
    ReadTimeout(std::time::Duration),

    #[error("session not handshaked")]
    NotHandshaked,

    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level crawler failures. These are rare: per-peer failures never
/// propagate this far, they're logged and the worker moves on. This enum is
/// for conditions that should end the whole run and terminate the process.
#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("no seed endpoints available")]
    NoSeeds,

    #[error("output writer failed: {0}")]
    Output(#[from] std::io::Error),
}
