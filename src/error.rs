//! Error types shared across the crate.

use thiserror::Error;

use crate::types::Protocol;

/// A rejected port-list operation. Always recoverable: the caller reports it and
/// carries on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Not a decimal port number in 1..=65535
    #[error("invalid port: {0:?} (must be a number between 1 and 65535)")]
    InvalidPort(String),

    /// Contains `-` but is not `start-end` with 1 <= start < end <= 65535
    #[error("invalid port range: {0:?} (use start-end, e.g. 22-80)")]
    InvalidRange(String),

    /// Range spans more ports than a single add may insert
    #[error("too many ports selected ({start}-{end}); the maximum allowed is {max}")]
    RangeTooLarge { start: u16, end: u16, max: usize },

    #[error("invalid protocol: {0:?}")]
    UnknownProtocol(String),

    #[error("port out of range: {0}")]
    OutOfRange(u32),

    #[error("port {port} is already in the list for protocol {protocol}")]
    Duplicate { protocol: Protocol, port: u16 },

    #[error("maximum number of ports reached ({max})")]
    CapacityExceeded { max: usize },

    #[error("port {port} not found in the list for protocol {protocol}")]
    NotFound { protocol: Protocol, port: u16 },
}

/// Errors from the scan control API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("a scan is already in progress")]
    AlreadyRunning,

    /// The worker went away without emitting its report
    #[error("scan worker ended without a report")]
    Aborted,
}
