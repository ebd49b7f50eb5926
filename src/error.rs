//! Error types for sockbridge

use std::time::Duration;

use thiserror::Error;

use crate::common::{Direction, Operation};

/// Main error type for sockbridge
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// Outbound peer could not be reached
    #[error("Dial {address} failed: {source}")]
    Dial {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Read or write failure while relaying
    #[error("Relay {direction} failed: {source}")]
    Relay {
        direction: Direction,
        #[source]
        source: std::io::Error,
    },

    /// Destination accepted fewer bytes than submitted
    #[error("Short write {direction}: {written} of {expected} bytes")]
    ShortWrite {
        direction: Direction,
        written: usize,
        expected: usize,
    },

    /// A single read or write exceeded the idle timeout
    #[error("Idle timeout {direction}: no {operation} progress for {timeout:?}")]
    IdleTimeout {
        direction: Direction,
        operation: Operation,
        timeout: Duration,
    },
}

impl Error {
    /// Relay-class failures: they end one direction and tear down the pair
    pub fn is_relay_failure(&self) -> bool {
        matches!(
            self,
            Error::Relay { .. } | Error::ShortWrite { .. } | Error::IdleTimeout { .. }
        )
    }

    /// Whether this failure came from a deadline expiring
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::IdleTimeout { .. } => true,
            Error::Dial { source, .. } | Error::Relay { source, .. } => {
                source.kind() == std::io::ErrorKind::TimedOut
            }
            Error::Io(e) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}

/// Result type alias for sockbridge
pub type Result<T> = std::result::Result<T, Error>;
