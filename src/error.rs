//! Error kinds produced by the connection-processing engine.
//!
//! Errors never propagate across [`crate::work::Work`] instances; a failing `Work` only tears
//! itself down (see `§7` of the design notes). This enum exists so that the handful of call sites
//! that *do* need to distinguish failure modes (rate limiter validation, parser callers, the HTTP
//! protocol handler's failure-response selection) can match on a stable kind rather than on
//! `io::ErrorKind` or ad-hoc strings.

use std::io;

use crate::parser::ParseError;

/// Errors surfaced by the engine.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// A caller passed an invalid argument, e.g. a negative token release.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The HTTP parser rejected a byte sequence.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Establishing the upstream connection failed.
    #[error("connect error: {0}")]
    Connect(String),

    /// A TLS handshake or record operation failed.
    #[error("tls error: {0}")]
    Tls(String),

    /// An I/O operation failed for a reason other than the recoverable kinds already
    /// handled by the non-blocking read/write loops (`WouldBlock`, `Interrupted`).
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// An operation exceeded its deadline (idle timeout, handshake timeout, ...).
    #[error("timeout")]
    Timeout,

    /// A caller attempted to consume more bytes than the configured rate allows and the
    /// caller opted out of partial grants.
    #[error("backpressure exceeded")]
    BackpressureExceeded,

    /// A plugin aborted the connection at a hook.
    #[error("plugin abort: {0}")]
    PluginAbort(String),

    /// The engine is shutting down; never reported to the user as a failure.
    #[error("shutdown")]
    Shutdown,
}

impl ProxyError {
    /// Whether this error should close the connection silently (no synthetic response),
    /// per the policy table in `§7`.
    pub fn closes_silently(&self) -> bool {
        matches!(
            self,
            ProxyError::Io(_) | ProxyError::Timeout | ProxyError::Tls(_) | ProxyError::Shutdown
        )
    }
}

impl From<&str> for ProxyError {
    fn from(s: &str) -> Self {
        ProxyError::InvalidArgument(s.to_string())
    }
}
