//! Common types and abstractions
//!
//! This module defines the core types used throughout the bridge:
//! - Stream: unified async I/O abstraction
//! - Endpoint: one leg of a bridge with deadlines and close
//! - Signal: single-fire notification
//! - Relay: the timed copy loop
//! - Metadata / Address: connection context

mod address;
mod endpoint;
mod metadata;
mod relay;
mod signal;
mod stream;

pub use address::{Address, UNIX_PREFIX};
pub use endpoint::{
    is_closed_error, is_deadline_error, DeadlineExceeded, Endpoint, EndpointClosed,
    EndpointHandle, EndpointReader, EndpointWriter,
};
pub use metadata::{Direction, Metadata, Network, Operation};
pub use relay::{copy_with_timeout, DirectionReport, RELAY_BUFFER_SIZE};
pub use signal::Signal;
pub use stream::{IntoStream, Stream};

// Re-export error types from crate root
pub use crate::error::{Error, Result};
