//! Type-erased transport socket.
//!
//! A connection is plain TCP, TLS over TCP, or TLS through a proxy tunnel.
//! The HTTP layer only needs `AsyncRead + AsyncWrite`, so every variant is
//! boxed into a [`BoxedSocket`] before the stream factory splits it.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_boring::SslStream;

/// Any socket the engine can speak HTTP over.
pub trait StreamSocket: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static {}

impl StreamSocket for TcpStream {}

impl<S: StreamSocket> StreamSocket for SslStream<S> {}

impl std::fmt::Debug for dyn StreamSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StreamSocket")
    }
}

pub type BoxedSocket = Box<dyn StreamSocket>;

pub fn boxed<S: StreamSocket>(socket: S) -> BoxedSocket {
    Box::new(socket)
}
