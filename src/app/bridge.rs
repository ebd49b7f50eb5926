//! Bridge - lifecycle of one accepted connection
//!
//! ```text
//! inbound Endpoint
//!        ↓
//! Dialer.dial()  ── fails ──→ close inbound, done
//!        ↓
//! upstream task   (inbound → outbound) ─┐
//! downstream task (outbound → inbound) ─┴→ first to finish fires shutdown
//!        ↓
//! grace period → close both endpoints → join both tasks
//! ```
//!
//! Failures are logged here and returned as an informational report; they
//! never change what the caller does next.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::common::{
    copy_with_timeout, Address, Direction, DirectionReport, Endpoint, EndpointReader,
    EndpointWriter, Metadata, Signal,
};
use crate::error::Error;
use crate::transport::Dialer;

/// Default idle timeout per read/write (5 minutes)
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default delay between shutdown and closing the endpoints (1 second)
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(1);

/// Bridge configuration, fixed for the bridge's lifetime
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Longest a single read or write may wait
    pub idle_timeout: Duration,
    /// Delay after the first direction finishes before both legs close
    pub grace_period: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

/// How a bridged connection ended
#[derive(Debug)]
pub enum BridgeOutcome {
    /// The outbound peer was unreachable; nothing was relayed
    DialFailed(Error),
    /// Both directions ran and were torn down together
    Relayed(RelaySummary),
}

impl BridgeOutcome {
    pub fn is_dial_failure(&self) -> bool {
        matches!(self, BridgeOutcome::DialFailed(_))
    }

    pub fn summary(&self) -> Option<&RelaySummary> {
        match self {
            BridgeOutcome::Relayed(summary) => Some(summary),
            BridgeOutcome::DialFailed(_) => None,
        }
    }
}

/// Per-direction results of a relayed pair
#[derive(Debug)]
pub struct RelaySummary {
    pub upstream: DirectionReport,
    pub downstream: DirectionReport,
    pub elapsed: Duration,
}

/// Connects accepted inbound endpoints to the configured outbound peer
pub struct Bridge {
    dialer: Dialer,
    config: BridgeConfig,
}

impl Bridge {
    pub fn new(dialer: Dialer, config: BridgeConfig) -> Self {
        Self { dialer, config }
    }

    pub fn destination(&self) -> &Address {
        self.dialer.address()
    }

    /// Bridge one inbound connection. Returns after both legs are closed.
    pub async fn serve(&self, inbound: Endpoint, metadata: &Metadata) -> BridgeOutcome {
        let start = Instant::now();

        let outbound = match self.dialer.dial().await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                inbound.handle().close();
                drop(inbound);
                warn!("[#{}] {}", metadata.id, e);
                return BridgeOutcome::DialFailed(e);
            }
        };

        info!(
            "[#{}] {} -> {} ({} -> {})",
            metadata.id,
            metadata.source,
            metadata.destination,
            inbound.network(),
            outbound.network()
        );

        let (upstream, downstream) = self.relay(inbound, outbound, metadata.id).await;

        info!(
            "[#{}] Closed: {} -> {} (↑{} ↓{} {:?})",
            metadata.id,
            metadata.source,
            metadata.destination,
            format_bytes(upstream.bytes),
            format_bytes(downstream.bytes),
            start.elapsed()
        );

        BridgeOutcome::Relayed(RelaySummary {
            upstream,
            downstream,
            elapsed: start.elapsed(),
        })
    }

    /// Run both directions and tear the pair down exactly once
    async fn relay(
        &self,
        inbound: Endpoint,
        outbound: Endpoint,
        conn_id: u64,
    ) -> (DirectionReport, DirectionReport) {
        let shutdown = Arc::new(Signal::new());
        let inbound_handle = inbound.handle();
        let outbound_handle = outbound.handle();

        let (in_reader, in_writer) = inbound.split();
        let (out_reader, out_writer) = outbound.split();

        let upstream = spawn_direction(
            in_reader,
            out_writer,
            Direction::Upstream,
            self.config.idle_timeout,
            Arc::clone(&shutdown),
            conn_id,
        );
        let downstream = spawn_direction(
            out_reader,
            in_writer,
            Direction::Downstream,
            self.config.idle_timeout,
            Arc::clone(&shutdown),
            conn_id,
        );

        shutdown.wait().await;
        // Let bytes already handed to the OS leave before tearing down
        tokio::time::sleep(self.config.grace_period).await;

        inbound_handle.close();
        outbound_handle.close();

        // Both tasks exit promptly once their endpoints are closed; the
        // sockets are released when their halves drop
        let upstream = join_direction(upstream, Direction::Upstream).await;
        let downstream = join_direction(downstream, Direction::Downstream).await;
        debug!("[#{}] Pair torn down", conn_id);

        (upstream, downstream)
    }
}

/// Fires the pair's shutdown when a direction task ends, even by panic
struct ShutdownOnDrop(Arc<Signal>);

impl Drop for ShutdownOnDrop {
    fn drop(&mut self) {
        self.0.fire();
    }
}

fn spawn_direction(
    mut reader: EndpointReader,
    mut writer: EndpointWriter,
    direction: Direction,
    idle_timeout: Duration,
    shutdown: Arc<Signal>,
    conn_id: u64,
) -> JoinHandle<DirectionReport> {
    tokio::spawn(async move {
        let guard = ShutdownOnDrop(shutdown);
        let report = copy_with_timeout(&mut reader, &mut writer, idle_timeout, direction).await;

        match &report.error {
            Some(e) if e.is_timeout() => warn!("[#{}] Stalled: {}", conn_id, e),
            Some(e) if e.is_relay_failure() => warn!("[#{}] {}", conn_id, e),
            Some(e) => error!("[#{}] {} aborted: {}", conn_id, direction, e),
            None => debug!("[#{}] {} finished ({} bytes)", conn_id, direction, report.bytes),
        }

        if guard.0.fire() {
            debug!("[#{}] {} ended first, shutting down pair", conn_id, direction);
        }
        report
    })
}

async fn join_direction(handle: JoinHandle<DirectionReport>, direction: Direction) -> DirectionReport {
    match handle.await {
        Ok(report) => report,
        Err(e) => DirectionReport {
            direction,
            bytes: 0,
            error: Some(Error::Relay {
                direction,
                source: io::Error::new(io::ErrorKind::Other, e.to_string()),
            }),
        },
    }
}

/// Format bytes in human-readable form
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2}GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2}MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2}KB", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Network, Result, Stream};
    use crate::transport::{Listener, Transport};
    use async_trait::async_trait;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};

    /// Transport that hands out one prepared stream
    struct PreparedTransport {
        stream: Mutex<Option<Stream>>,
    }

    impl PreparedTransport {
        fn new(stream: Option<Stream>) -> Arc<Self> {
            Arc::new(Self {
                stream: Mutex::new(stream),
            })
        }
    }

    #[async_trait]
    impl Transport for PreparedTransport {
        async fn connect(&self, _addr: &Address) -> Result<Stream> {
            self.stream
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| Error::Io(io::ErrorKind::ConnectionRefused.into()))
        }

        async fn bind(&self, _addr: &Address) -> Result<Box<dyn Listener>> {
            Err(Error::Unsupported("bind".into()))
        }
    }

    /// Counts reads so tests can prove a stream was never read
    struct CountingStream {
        inner: DuplexStream,
        reads: Arc<AtomicUsize>,
    }

    impl AsyncRead for CountingStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for CountingStream {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Pin::new(&mut self.inner).poll_write(cx, buf)
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_flush(cx)
        }

        fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_shutdown(cx)
        }
    }

    /// Never yields data; accepts `capacity` bytes then stops accepting
    struct SaturatedSink {
        capacity: usize,
    }

    impl AsyncRead for SaturatedSink {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    impl AsyncWrite for SaturatedSink {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let n = buf.len().min(self.capacity);
            self.capacity -= n;
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn test_config(idle: Duration) -> BridgeConfig {
        BridgeConfig {
            idle_timeout: idle,
            grace_period: Duration::from_millis(50),
        }
    }

    fn bridge_to(stream: Stream, idle: Duration) -> Bridge {
        let dialer = Dialer::with_transport(
            "127.0.0.1:9".parse().unwrap(),
            PreparedTransport::new(Some(stream)),
            Duration::from_secs(1),
        );
        Bridge::new(dialer, test_config(idle))
    }

    fn metadata() -> Metadata {
        Metadata::new("127.0.0.1:9".parse().unwrap()).with_id(1)
    }

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.idle_timeout, Duration::from_secs(300));
        assert_eq!(config.grace_period, Duration::from_secs(1));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(2048), "2.00KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00MB");
    }

    #[tokio::test]
    async fn test_relays_both_directions() {
        let (out_local, mut peer) = tokio::io::duplex(4096);
        let bridge = bridge_to(Box::new(out_local), Duration::from_secs(5));

        let (in_local, mut client) = tokio::io::duplex(4096);
        let inbound = Endpoint::new(Box::new(in_local), Network::Tcp);
        let serve = tokio::spawn(async move { bridge.serve(inbound, &metadata()).await });

        client.write_all(b"PING").await.unwrap();
        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"PING");

        peer.write_all(b"PONG").await.unwrap();
        drop(peer);

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"PONG");

        let outcome = serve.await.unwrap();
        let summary = outcome.summary().expect("relayed");
        assert_eq!(summary.upstream.bytes, 4);
        assert_eq!(summary.downstream.bytes, 4);
        assert!(summary.upstream.is_clean());
        assert!(summary.downstream.is_clean());
    }

    #[tokio::test]
    async fn test_dial_failure_closes_inbound_without_reading() {
        let dialer = Dialer::with_transport(
            "127.0.0.1:9".parse().unwrap(),
            PreparedTransport::new(None),
            Duration::from_secs(1),
        );
        let bridge = Bridge::new(dialer, test_config(Duration::from_secs(5)));

        let (in_local, mut client) = tokio::io::duplex(64);
        let reads = Arc::new(AtomicUsize::new(0));
        let inbound = Endpoint::new(
            Box::new(CountingStream {
                inner: in_local,
                reads: Arc::clone(&reads),
            }),
            Network::Unix,
        );
        client.write_all(b"unread").await.unwrap();

        let outcome = bridge.serve(inbound, &metadata()).await;
        assert!(outcome.is_dial_failure());
        assert_eq!(reads.load(Ordering::SeqCst), 0);

        let mut buf = [0u8; 8];
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_short_write_tears_down_pair() {
        let bridge = bridge_to(Box::new(SaturatedSink { capacity: 10 }), Duration::from_secs(5));

        let (in_local, mut client) = tokio::io::duplex(4096);
        let inbound = Endpoint::new(Box::new(in_local), Network::Tcp);
        let serve = tokio::spawn(async move { bridge.serve(inbound, &metadata()).await });

        client.write_all(&[1u8; 100]).await.unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(2), serve)
            .await
            .expect("pair should tear down")
            .unwrap();
        let summary = outcome.summary().expect("relayed");
        assert!(matches!(
            summary.upstream.error,
            Some(Error::ShortWrite {
                written: 10,
                expected: 100,
                ..
            })
        ));
        assert!(summary.downstream.is_clean());

        // Inbound leg is closed too
        let mut buf = [0u8; 8];
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_idle_pair_times_out() {
        let (out_local, _peer) = tokio::io::duplex(64);
        let bridge = bridge_to(Box::new(out_local), Duration::from_millis(100));

        let (in_local, _client) = tokio::io::duplex(64);
        let inbound = Endpoint::new(Box::new(in_local), Network::Tcp);

        let started = Instant::now();
        let outcome = bridge.serve(inbound, &metadata()).await;
        assert!(started.elapsed() < Duration::from_secs(2));

        let summary = outcome.summary().expect("relayed");
        let timed_out = [&summary.upstream, &summary.downstream]
            .iter()
            .filter(|r| matches!(r.error, Some(Error::IdleTimeout { .. })))
            .count();
        assert!(timed_out >= 1);
    }
}
