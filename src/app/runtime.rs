//! Runtime - listener ownership and the accept loop
//!
//! The runtime is responsible for:
//! - Building the listening transport and the bridge from configuration
//! - Accepting connections and bridging each in its own task
//! - Stopping on shutdown and releasing the listening address

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::common::{Address, Endpoint, Metadata, Network, Result};
use crate::config::Config;
use crate::error::Error;
use crate::transport::{Dialer, DialerConfig, Listener, TcpTransport, Transport};

use super::bridge::{Bridge, BridgeConfig};

/// Pause after a transient accept error
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub listen: Address,
    pub forward: Address,
    pub bridge: BridgeConfig,
    pub dialer: DialerConfig,
    /// Permission bits for a Unix listen socket
    pub unix_mode: Option<u32>,
    /// Remove a leftover Unix socket file before binding
    pub remove_stale: bool,
}

impl RuntimeConfig {
    pub fn new(listen: Address, forward: Address) -> Self {
        Self {
            listen,
            forward,
            bridge: BridgeConfig::default(),
            dialer: DialerConfig::default(),
            unix_mode: Some(0o777),
            remove_stale: true,
        }
    }
}

impl TryFrom<&Config> for RuntimeConfig {
    type Error = Error;

    fn try_from(config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            listen: config.listen_address()?,
            forward: config.forward_address()?,
            bridge: config.bridge_config(),
            dialer: config.dialer_config(),
            unix_mode: Some(config.unix.mode),
            remove_stale: config.unix.remove_stale,
        })
    }
}

/// Runtime owns the listener side and hands connections to the bridge
pub struct Runtime {
    listen: Address,
    transport: Arc<dyn Transport>,
    bridge: Arc<Bridge>,
}

impl Runtime {
    /// Build runtime from configuration
    pub fn from_config(config: RuntimeConfig) -> Result<Self> {
        let transport = Self::build_listen_transport(&config)?;
        let dialer = Dialer::new(config.forward.clone(), &config.dialer)?;
        let bridge = Arc::new(Bridge::new(dialer, config.bridge.clone()));

        Ok(Self {
            listen: config.listen,
            transport,
            bridge,
        })
    }

    fn build_listen_transport(config: &RuntimeConfig) -> Result<Arc<dyn Transport>> {
        let transport: Arc<dyn Transport> = match config.listen.network() {
            Network::Tcp => Arc::new(TcpTransport::new()),
            #[cfg(unix)]
            Network::Unix => Arc::new(
                crate::transport::UnixTransport::new()
                    .with_mode(config.unix_mode)
                    .with_remove_stale(config.remove_stale),
            ),
            #[cfg(not(unix))]
            Network::Unix => {
                return Err(Error::Unsupported(
                    "unix domain sockets on this platform".into(),
                ))
            }
        };
        Ok(transport)
    }

    /// Bind the listening address
    pub async fn bind(&self) -> Result<Box<dyn Listener>> {
        self.transport.bind(&self.listen).await
    }

    /// Run until Ctrl+C
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutting down...");
        })
        .await
    }

    /// Accept connections on `listener` until `shutdown` resolves or a
    /// non-transient accept error occurs. The listener is closed on return.
    pub async fn serve<F>(&self, listener: Box<dyn Listener>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let local = listener.local_addr()?;
        info!("Listening on {}, forwarding to {}", local, self.bridge.destination());

        tokio::pin!(shutdown);
        let mut conn_count: u64 = 0;

        let result = loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, source)) => {
                            conn_count += 1;
                            debug!("[#{}] New connection from {}", conn_count, source);

                            let metadata = Metadata::new(self.bridge.destination().clone())
                                .with_id(conn_count)
                                .with_source(source);
                            let inbound = Endpoint::new(stream, local.network());
                            let bridge = Arc::clone(&self.bridge);

                            tokio::spawn(async move {
                                bridge.serve(inbound, &metadata).await;
                            });
                        }
                        Err(e) if is_transient_accept_error(&e) => {
                            warn!("Accept temporary error: {}", e);
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                            break Err(e);
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("Stopped accepting on {} (handled {} connections)", local, conn_count);
                    break Ok(());
                }
            }
        };

        if let Err(e) = listener.close().await {
            warn!("Failed to close listener {}: {}", local, e);
        }
        result
    }
}

/// Accept failures that leave the listener usable
fn is_transient_accept_error(err: &Error) -> bool {
    let Error::Io(e) = err else {
        return false;
    };

    use std::io::ErrorKind;
    if matches!(
        e.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut
    ) {
        return true;
    }

    // Out of descriptors; clears once open connections close
    #[cfg(unix)]
    {
        const ENFILE: i32 = 23;
        const EMFILE: i32 = 24;
        if matches!(e.raw_os_error(), Some(ENFILE) | Some(EMFILE)) {
            return true;
        }
    }

    false
}
