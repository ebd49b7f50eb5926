//! Stream abstraction
//!
//! Unified stream type for both legs of a bridge.
//! The bridge ONLY operates on Stream, never on raw TCP/Unix sockets.

use tokio::io::{AsyncRead, AsyncWrite};

/// The byte stream type every transport produces.
pub type Stream = Box<dyn AsyncReadWrite + Unpin + Send>;

/// Combined trait for async read + write
pub trait AsyncReadWrite: AsyncRead + AsyncWrite {}

impl<T: AsyncRead + AsyncWrite> AsyncReadWrite for T {}

/// Trait for types that can be converted into a Stream
pub trait IntoStream {
    fn into_stream(self) -> Stream;
}

impl<T> IntoStream for T
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn into_stream(self) -> Stream {
        Box::new(self)
    }
}
