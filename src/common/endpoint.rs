//! Endpoint - one leg of a bridge with deadlines and an explicit close
//!
//! An Endpoint wraps a Stream and splits into:
//! - a reader half and a writer half, each used by exactly one relay task
//! - a handle that closes both halves from outside
//!
//! Once closed, pending and future reads/writes fail with [`EndpointClosed`]
//! instead of hanging. Every read and write carries its own deadline.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};

use super::metadata::Network;
use super::signal::Signal;
use super::stream::Stream;

/// Error payload for I/O on an endpoint this process already closed
#[derive(Debug, thiserror::Error)]
#[error("use of closed endpoint")]
pub struct EndpointClosed;

/// Error payload for a read or write that outlived its deadline
#[derive(Debug, thiserror::Error)]
#[error("i/o deadline exceeded")]
pub struct DeadlineExceeded;

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, EndpointClosed)
}

fn deadline_error() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, DeadlineExceeded)
}

/// Whether the error means the endpoint was closed locally
pub fn is_closed_error(err: &io::Error) -> bool {
    err.get_ref().map_or(false, |inner| inner.is::<EndpointClosed>())
}

/// Whether the error means a deadline expired
pub fn is_deadline_error(err: &io::Error) -> bool {
    err.get_ref().map_or(false, |inner| inner.is::<DeadlineExceeded>())
}

/// Shared state between the halves and the handle
#[derive(Debug)]
struct EndpointState {
    network: Network,
    closed: Signal,
}

/// A bidirectional byte stream owned by one bridge
pub struct Endpoint {
    stream: Stream,
    state: Arc<EndpointState>,
}

/// Read half of an Endpoint
pub struct EndpointReader {
    inner: ReadHalf<Stream>,
    state: Arc<EndpointState>,
}

/// Write half of an Endpoint
pub struct EndpointWriter {
    inner: WriteHalf<Stream>,
    state: Arc<EndpointState>,
}

/// Closes an Endpoint from outside its relay tasks
#[derive(Clone)]
pub struct EndpointHandle {
    state: Arc<EndpointState>,
}

impl Endpoint {
    pub fn new(stream: Stream, network: Network) -> Self {
        Self {
            stream,
            state: Arc::new(EndpointState {
                network,
                closed: Signal::new(),
            }),
        }
    }

    pub fn network(&self) -> Network {
        self.state.network
    }

    pub fn handle(&self) -> EndpointHandle {
        EndpointHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Split into reader and writer (consumes self)
    pub fn split(self) -> (EndpointReader, EndpointWriter) {
        let (read_half, write_half) = tokio::io::split(self.stream);
        (
            EndpointReader {
                inner: read_half,
                state: Arc::clone(&self.state),
            },
            EndpointWriter {
                inner: write_half,
                state: self.state,
            },
        )
    }
}

impl EndpointHandle {
    /// Close the endpoint. Idempotent; returns true on the first call.
    pub fn close(&self) -> bool {
        self.state.closed.fire()
    }
}

impl EndpointReader {
    /// Read into `buf`, failing if nothing arrives within `timeout`.
    ///
    /// `Ok(0)` is end-of-stream.
    pub async fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let Self { inner, state } = self;
        if state.closed.is_fired() {
            return Err(closed_error());
        }

        tokio::select! {
            biased;
            _ = state.closed.wait() => Err(closed_error()),
            res = tokio::time::timeout(timeout, inner.read(buf)) => {
                res.unwrap_or_else(|_| Err(deadline_error()))
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.is_fired()
    }
}

impl EndpointWriter {
    /// Write all of `buf` within `timeout` and return how many bytes the
    /// destination accepted.
    ///
    /// A count below `buf.len()` means the destination stopped accepting
    /// bytes without reporting an error.
    pub async fn write_timeout(&mut self, buf: &[u8], timeout: Duration) -> io::Result<usize> {
        let Self { inner, state } = self;
        if state.closed.is_fired() {
            return Err(closed_error());
        }

        let write = async {
            let mut written = 0;
            while written < buf.len() {
                match inner.write(&buf[written..]).await? {
                    0 => break,
                    n => written += n,
                }
            }
            inner.flush().await?;
            Ok::<_, io::Error>(written)
        };

        tokio::select! {
            biased;
            _ = state.closed.wait() => Err(closed_error()),
            res = tokio::time::timeout(timeout, write) => {
                res.unwrap_or_else(|_| Err(deadline_error()))
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.is_fired()
    }
}
