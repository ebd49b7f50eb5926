//! Outbound dialer
//!
//! Connects to one fixed peer address. Every attempt is bounded by the
//! connect timeout; a failed attempt is reported, never retried.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use crate::common::{Address, Endpoint, Network, Result};
use crate::error::Error;

use super::{TcpTransport, Transport};

/// Default connect timeout (5 seconds)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default keep-alive probe interval (1 minute)
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Dialer configuration
#[derive(Debug, Clone)]
pub struct DialerConfig {
    /// Bound on a single connection attempt
    pub connect_timeout: Duration,
    /// Keep-alive interval for TCP peers (None disables keep-alive)
    pub keep_alive: Option<Duration>,
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            keep_alive: Some(DEFAULT_KEEP_ALIVE),
        }
    }
}

/// Establishes outbound endpoints to a fixed peer
pub struct Dialer {
    address: Address,
    transport: Arc<dyn Transport>,
    connect_timeout: Duration,
}

impl Dialer {
    /// Build a dialer with the transport matching the peer's family
    pub fn new(address: Address, config: &DialerConfig) -> Result<Self> {
        let transport: Arc<dyn Transport> = match address.network() {
            Network::Tcp => Arc::new(tcp_transport(config)),
            #[cfg(unix)]
            Network::Unix => Arc::new(super::UnixTransport::new()),
            #[cfg(not(unix))]
            Network::Unix => {
                return Err(Error::Unsupported(
                    "unix domain sockets on this platform".into(),
                ))
            }
        };

        Ok(Self::with_transport(address, transport, config.connect_timeout))
    }

    /// Build a dialer over an explicit transport
    pub fn with_transport(
        address: Address,
        transport: Arc<dyn Transport>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            address,
            transport,
            connect_timeout,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Connect to the peer, failing with `Error::Dial` on any problem
    pub async fn dial(&self) -> Result<Endpoint> {
        trace!("Dialing {} (timeout {:?})", self.address, self.connect_timeout);

        match tokio::time::timeout(self.connect_timeout, self.transport.connect(&self.address)).await
        {
            Ok(Ok(stream)) => Ok(Endpoint::new(stream, self.address.network())),
            Ok(Err(e)) => Err(self.dial_error(e)),
            Err(_) => Err(Error::Dial {
                address: self.address.to_string(),
                source: io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect timed out after {:?}", self.connect_timeout),
                ),
            }),
        }
    }

    fn dial_error(&self, err: Error) -> Error {
        let source = match err {
            Error::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidInput, other.to_string()),
        };
        Error::Dial {
            address: self.address.to_string(),
            source,
        }
    }
}

fn tcp_transport(config: &DialerConfig) -> TcpTransport {
    match config.keep_alive {
        Some(interval) => TcpTransport::new().with_keep_alive(interval),
        None => TcpTransport::new(),
    }
}
