//! Timed copy loop - moves bytes from one endpoint to another
//!
//! Every read and every write gets a fresh idle deadline. The loop ends on:
//! - end-of-stream or a locally closed endpoint (normal termination)
//! - a short write, a deadline expiry or any other I/O error (failure)
//!
//! Bytes are forwarded in exactly the chunks they were read in.

use std::io;
use std::time::Duration;

use bytes::BytesMut;

use crate::error::Error;

use super::endpoint::{is_closed_error, is_deadline_error, EndpointReader, EndpointWriter};
use super::metadata::{Direction, Operation};

/// Buffer size for one relay read
pub const RELAY_BUFFER_SIZE: usize = 1024;

/// How one direction of a pair ended
#[derive(Debug)]
pub struct DirectionReport {
    pub direction: Direction,
    /// Bytes written to the destination
    pub bytes: u64,
    /// Set when the direction ended in a failure
    pub error: Option<Error>,
}

impl DirectionReport {
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }
}

/// Copy from `reader` to `writer` until the direction terminates.
pub async fn copy_with_timeout(
    reader: &mut EndpointReader,
    writer: &mut EndpointWriter,
    idle_timeout: Duration,
    direction: Direction,
) -> DirectionReport {
    let mut buf = BytesMut::zeroed(RELAY_BUFFER_SIZE);
    let mut bytes = 0u64;

    let error = loop {
        let n = match reader.read_timeout(&mut buf, idle_timeout).await {
            Ok(0) => break None,
            Ok(n) => n,
            // Peer direction tore the pair down first
            Err(e) if is_closed_error(&e) => break None,
            Err(e) => break Some(classify(e, direction, Operation::Read, idle_timeout)),
        };

        match writer.write_timeout(&buf[..n], idle_timeout).await {
            Ok(written) if written == n => bytes += n as u64,
            Ok(written) => {
                bytes += written as u64;
                break Some(Error::ShortWrite {
                    direction,
                    written,
                    expected: n,
                });
            }
            Err(e) if is_closed_error(&e) => break None,
            Err(e) => break Some(classify(e, direction, Operation::Write, idle_timeout)),
        }
    };

    DirectionReport {
        direction,
        bytes,
        error,
    }
}

fn classify(err: io::Error, direction: Direction, operation: Operation, timeout: Duration) -> Error {
    if is_deadline_error(&err) {
        Error::IdleTimeout {
            direction,
            operation,
            timeout,
        }
    } else {
        Error::Relay {
            direction,
            source: err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Endpoint, Network};
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};

    const IDLE: Duration = Duration::from_secs(5);

    /// Delivers one chunk, then a read error
    struct ChunkThenError {
        chunk: Option<&'static [u8]>,
    }

    impl AsyncRead for ChunkThenError {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            match self.chunk.take() {
                Some(chunk) => {
                    buf.put_slice(chunk);
                    Poll::Ready(Ok(()))
                }
                None => Poll::Ready(Err(io::ErrorKind::ConnectionReset.into())),
            }
        }
    }

    impl AsyncWrite for ChunkThenError {
        fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn endpoint_pair() -> (Endpoint, tokio::io::DuplexStream) {
        let (local, remote) = tokio::io::duplex(4096);
        (Endpoint::new(Box::new(local), Network::Tcp), remote)
    }

    #[tokio::test]
    async fn test_copy_until_eof() {
        let (src, mut src_remote) = endpoint_pair();
        let (dst, mut dst_remote) = endpoint_pair();
        let (mut reader, _src_writer) = src.split();
        let (_dst_reader, mut writer) = dst.split();

        let copy = tokio::spawn(async move {
            copy_with_timeout(&mut reader, &mut writer, IDLE, Direction::Upstream).await
        });

        src_remote.write_all(b"some opaque bytes").await.unwrap();
        src_remote.shutdown().await.unwrap();

        let report = copy.await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.bytes, 17);

        let mut out = vec![0u8; 17];
        dst_remote.read_exact(&mut out).await.unwrap();
        assert_eq!(&out, b"some opaque bytes");
    }

    #[tokio::test]
    async fn test_forwards_data_before_error() {
        let src = Endpoint::new(
            Box::new(ChunkThenError {
                chunk: Some(b"trailing"),
            }),
            Network::Unix,
        );
        let (dst, mut dst_remote) = endpoint_pair();
        let (mut reader, _) = src.split();
        let (_, mut writer) = dst.split();

        let report = copy_with_timeout(&mut reader, &mut writer, IDLE, Direction::Downstream).await;
        assert_eq!(report.bytes, 8);
        assert!(matches!(report.error, Some(Error::Relay { direction: Direction::Downstream, .. })));

        let mut out = [0u8; 8];
        dst_remote.read_exact(&mut out).await.unwrap();
        assert_eq!(&out, b"trailing");
    }

    #[tokio::test]
    async fn test_closed_source_is_not_a_failure() {
        let (src, _src_remote) = endpoint_pair();
        let (dst, _dst_remote) = endpoint_pair();
        let handle = src.handle();
        let (mut reader, _) = src.split();
        let (_, mut writer) = dst.split();

        let copy = tokio::spawn(async move {
            copy_with_timeout(&mut reader, &mut writer, IDLE, Direction::Upstream).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.close();

        let report = copy.await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.bytes, 0);
    }

    #[tokio::test]
    async fn test_closed_destination_is_not_a_failure() {
        let (src, mut src_remote) = endpoint_pair();
        // Far end never reads, so the write blocks until the endpoint closes
        let (dst_local, _dst_remote) = tokio::io::duplex(8);
        let dst = Endpoint::new(Box::new(dst_local), Network::Unix);
        let handle = dst.handle();
        let (mut reader, _) = src.split();
        let (_, mut writer) = dst.split();

        src_remote.write_all(&[1u8; 64]).await.unwrap();
        let copy = tokio::spawn(async move {
            copy_with_timeout(&mut reader, &mut writer, IDLE, Direction::Upstream).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.close();

        let report = tokio::time::timeout(Duration::from_secs(2), copy)
            .await
            .unwrap()
            .unwrap();
        assert!(report.is_clean(), "unexpected error: {:?}", report.error);
    }

    #[tokio::test]
    async fn test_idle_read_times_out() {
        let (src, _src_remote) = endpoint_pair();
        let (dst, _dst_remote) = endpoint_pair();
        let (mut reader, _) = src.split();
        let (_, mut writer) = dst.split();

        let started = std::time::Instant::now();
        let report = copy_with_timeout(
            &mut reader,
            &mut writer,
            Duration::from_millis(50),
            Direction::Upstream,
        )
        .await;

        assert!(started.elapsed() < Duration::from_secs(2));
        match report.error {
            Some(Error::IdleTimeout { operation, .. }) => assert_eq!(operation, Operation::Read),
            other => panic!("expected idle timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stalled_write_times_out() {
        let (src, mut src_remote) = endpoint_pair();
        // Tiny pipe whose far end never reads
        let (dst_local, _dst_remote) = tokio::io::duplex(8);
        let dst = Endpoint::new(Box::new(dst_local), Network::Tcp);
        let (mut reader, _) = src.split();
        let (_, mut writer) = dst.split();

        src_remote.write_all(&[7u8; 64]).await.unwrap();
        let report = copy_with_timeout(
            &mut reader,
            &mut writer,
            Duration::from_millis(50),
            Direction::Downstream,
        )
        .await;

        match report.error {
            Some(Error::IdleTimeout { operation, .. }) => assert_eq!(operation, Operation::Write),
            other => panic!("expected write timeout, got {:?}", other),
        }
    }
}
