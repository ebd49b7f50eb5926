//! Unix domain socket transport
//!
//! Binding a socket file:
//! - a leftover socket file from a previous run is removed first
//! - the new file gets the configured permission bits
//! - closing the listener removes the file again

use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, warn};

use crate::common::{Address, IntoStream, Result, Stream};
use crate::error::Error;

use super::{Listener, Transport};

/// Default permission bits for a bound socket file (world read/write)
pub const DEFAULT_SOCKET_MODE: u32 = 0o777;

/// Unix domain socket transport
#[derive(Debug, Clone)]
pub struct UnixTransport {
    /// Permission bits applied to bound socket files
    mode: Option<u32>,
    /// Remove a leftover socket file before binding
    remove_stale: bool,
}

impl Default for UnixTransport {
    fn default() -> Self {
        Self {
            mode: Some(DEFAULT_SOCKET_MODE),
            remove_stale: true,
        }
    }
}

impl UnixTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: Option<u32>) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_remove_stale(mut self, remove_stale: bool) -> Self {
        self.remove_stale = remove_stale;
        self
    }

    fn path<'a>(addr: &'a Address) -> Result<&'a Path> {
        addr.as_unix()
            .ok_or_else(|| Error::InvalidAddress(format!("{} is not a unix socket address", addr)))
    }

    fn remove_stale_socket(path: &Path) -> Result<()> {
        let meta = match std::fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        if !meta.file_type().is_socket() {
            return Err(Error::Config(format!(
                "{} exists and is not a socket",
                path.display()
            )));
        }

        debug!("Removing stale socket file {}", path.display());
        std::fs::remove_file(path)?;
        Ok(())
    }
}

#[async_trait]
impl Transport for UnixTransport {
    async fn connect(&self, addr: &Address) -> Result<Stream> {
        let stream = UnixStream::connect(Self::path(addr)?).await?;
        Ok(stream.into_stream())
    }

    async fn bind(&self, addr: &Address) -> Result<Box<dyn Listener>> {
        let path = Self::path(addr)?;
        if self.remove_stale {
            Self::remove_stale_socket(path)?;
        }

        let listener = UnixListener::bind(path)?;
        if let Some(mode) = self.mode {
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
        }

        Ok(Box::new(UnixListenerWrapper {
            listener,
            path: path.to_path_buf(),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Wrapper for UnixListener that owns its socket file
struct UnixListenerWrapper {
    listener: UnixListener,
    path: PathBuf,
    closed: AtomicBool,
}

#[async_trait]
impl Listener for UnixListenerWrapper {
    async fn accept(&self) -> Result<(Stream, Address)> {
        let (stream, peer) = self.listener.accept().await?;
        // Client sockets are usually unnamed; fall back to the listening path
        let source = peer
            .as_pathname()
            .map(Address::unix)
            .unwrap_or_else(|| Address::unix(&self.path));
        Ok((stream.into_stream(), source))
    }

    fn local_addr(&self) -> Result<Address> {
        Ok(Address::Unix(self.path.clone()))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!("Failed to remove socket file {}: {}", self.path.display(), e);
                Err(e.into())
            }
        }
    }
}
