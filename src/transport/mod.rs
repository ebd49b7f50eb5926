//! Transport Layer
//!
//! Responsibilities:
//! - Establish lowest-level stream connections (TCP, Unix domain sockets)
//! - Bind listeners and accept connections
//! - NO payload inspection
//!
//! This layer ONLY deals with raw byte transport.

mod dialer;
mod tcp;
#[cfg(unix)]
mod unix;

pub use dialer::{Dialer, DialerConfig};
pub use tcp::TcpTransport;
#[cfg(unix)]
pub use unix::UnixTransport;

use async_trait::async_trait;

use crate::common::{Address, Result, Stream};

/// Transport trait for establishing raw connections
///
/// Implementations should ONLY handle connection establishment.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to a remote address
    async fn connect(&self, addr: &Address) -> Result<Stream>;

    /// Create a listener bound to an address
    async fn bind(&self, addr: &Address) -> Result<Box<dyn Listener>>;
}

/// Listener trait for accepting incoming connections
#[async_trait]
pub trait Listener: Send + Sync {
    /// Accept a new connection
    async fn accept(&self) -> Result<(Stream, Address)>;

    /// Get the local bound address
    fn local_addr(&self) -> Result<Address>;

    /// Close the listener and release anything it created
    async fn close(&self) -> Result<()>;
}
