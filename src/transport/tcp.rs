//! TCP Transport implementation

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use socket2::{SockRef, TcpKeepalive};
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tracing::{debug, trace};

use crate::common::{Address, IntoStream, Result, Stream};
use crate::error::Error;

use super::{Listener, Transport};

/// TCP transport - raw TCP connections
#[derive(Debug, Clone, Default)]
pub struct TcpTransport {
    /// Keep-alive probe interval for connected sockets
    keep_alive: Option<Duration>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive = Some(interval);
        self
    }

    /// Resolve to every candidate address, IPv4 and IPv6 alike
    async fn resolve(addr: &Address) -> Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = match addr {
            Address::Socket(socket_addr) => vec![*socket_addr],
            Address::Domain(domain, port) => lookup_host((domain.as_str(), *port)).await?.collect(),
            Address::Unix(_) => {
                return Err(Error::InvalidAddress(format!("{} is not a TCP address", addr)));
            }
        };

        if addrs.is_empty() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses resolved for {}", addr),
            )));
        }
        Ok(addrs)
    }

    pub(crate) fn configure(&self, stream: &TcpStream) -> io::Result<()> {
        // Disable Nagle's algorithm for lower latency
        stream.set_nodelay(true)?;

        if let Some(interval) = self.keep_alive {
            let keepalive = TcpKeepalive::new().with_time(interval);
            #[cfg(any(
                target_os = "linux",
                target_os = "android",
                target_os = "macos",
                target_os = "ios",
                target_os = "freebsd",
                target_os = "windows"
            ))]
            let keepalive = keepalive.with_interval(interval);
            SockRef::from(stream).set_tcp_keepalive(&keepalive)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self, addr: &Address) -> Result<Stream> {
        let candidates = Self::resolve(addr).await?;

        let mut last_err = None;
        for candidate in candidates {
            trace!("Connecting to {} ({})", addr, candidate);
            match TcpStream::connect(candidate).await {
                Ok(stream) => {
                    self.configure(&stream)?;
                    return Ok(stream.into_stream());
                }
                Err(e) => {
                    debug!("Connect to {} failed: {}", candidate, e);
                    last_err = Some(e);
                }
            }
        }

        Err(Error::Io(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "no address to connect to")
        })))
    }

    async fn bind(&self, addr: &Address) -> Result<Box<dyn Listener>> {
        let listener = match addr {
            Address::Socket(socket_addr) => TcpListener::bind(socket_addr).await?,
            Address::Domain(domain, port) => TcpListener::bind((domain.as_str(), *port)).await?,
            Address::Unix(_) => {
                return Err(Error::InvalidAddress(format!("{} is not a TCP address", addr)));
            }
        };

        Ok(Box::new(TcpListenerWrapper { listener }))
    }
}

/// Wrapper for TcpListener to implement Listener trait
struct TcpListenerWrapper {
    listener: TcpListener,
}

#[async_trait]
impl Listener for TcpListenerWrapper {
    async fn accept(&self) -> Result<(Stream, Address)> {
        let (stream, addr) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        Ok((stream.into_stream(), Address::Socket(addr)))
    }

    fn local_addr(&self) -> Result<Address> {
        Ok(Address::Socket(self.listener.local_addr()?))
    }

    async fn close(&self) -> Result<()> {
        // TcpListener doesn't have explicit close, it closes on drop
        Ok(())
    }
}
