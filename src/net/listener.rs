//! TCP listener with a connection cap.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Enforce the connection limit by awaiting a slot before each accept
//! - Release slots automatically when connections close

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A TCP listener that bounds the number of concurrently open connections.
///
/// `accept` waits for a free slot before accepting, so once the limit is
/// reached new connection attempts queue in the kernel backlog. This is a
/// deliberately different policy from the request-level [`Limiter`]: the
/// gate applies backpressure where the limiter rejects.
///
/// [`Limiter`]: crate::limit::Limiter
#[derive(Debug)]
pub struct GatedListener {
    inner: TcpListener,
    slots: Arc<Semaphore>,
    connection_limit: usize,
}

impl GatedListener {
    /// Wrap an already-bound listener.
    ///
    /// # Panics
    ///
    /// Panics if `connection_limit` is zero.
    pub fn new(listener: TcpListener, connection_limit: usize) -> Self {
        assert!(connection_limit > 0, "connection limit must be > 0");
        Self {
            inner: listener,
            slots: Arc::new(Semaphore::new(connection_limit)),
            connection_limit,
        }
    }

    /// Bind `addr` and gate it at `connection_limit` connections.
    pub async fn bind(addr: SocketAddr, connection_limit: usize) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(
            address = %listener.local_addr()?,
            connection_limit,
            "listener bound"
        );
        Ok(Self::new(listener, connection_limit))
    }

    /// Accept the next connection, waiting for a free slot first.
    ///
    /// This is the one place in the crate that legitimately suspends for
    /// capacity. It never errors because the limit was reached; I/O errors
    /// come from the underlying accept only.
    pub async fn accept(&self) -> io::Result<(GatedStream, SocketAddr)> {
        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .expect("connection gate semaphore closed");

        let (stream, peer_addr) = self.inner.accept().await?;
        crate::metrics::connection_opened();

        tracing::debug!(
            peer_addr = %peer_addr,
            available_slots = self.slots.available_permits(),
            "connection accepted"
        );

        Ok((
            GatedStream {
                inner: stream,
                _slot: slot,
            },
            peer_addr,
        ))
    }

    /// The local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Connection slots currently free.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// The configured connection limit.
    pub fn connection_limit(&self) -> usize {
        self.connection_limit
    }
}

/// An accepted connection holding its gate slot.
///
/// The slot is released when the stream drops, whatever the reason the
/// connection ended.
#[derive(Debug)]
pub struct GatedStream {
    inner: TcpStream,
    _slot: OwnedSemaphorePermit,
}

impl GatedStream {
    /// Access the underlying TCP stream.
    pub fn get_ref(&self) -> &TcpStream {
        &self.inner
    }

    /// The remote peer's address.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.peer_addr()
    }
}

impl Drop for GatedStream {
    fn drop(&mut self) {
        crate::metrics::connection_closed();
        tracing::trace!("connection closed");
    }
}

impl AsyncRead for GatedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for GatedStream {
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

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    async fn bind_local(connection_limit: usize) -> GatedListener {
        GatedListener::bind("127.0.0.1:0".parse().unwrap(), connection_limit)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn accept_blocks_at_capacity_until_a_connection_closes() {
        let gate = bind_local(1).await;
        let addr = gate.local_addr().unwrap();

        let _client_one = TcpStream::connect(addr).await.unwrap();
        let _client_two = TcpStream::connect(addr).await.unwrap();

        let (first, _) = gate.accept().await.unwrap();
        assert_eq!(gate.available_slots(), 0);

        // second accept must wait: the only slot is held by `first`
        let blocked = timeout(Duration::from_millis(100), gate.accept()).await;
        assert!(blocked.is_err(), "accept should block at the limit");

        drop(first);
        let (second, _) = timeout(Duration::from_secs(1), gate.accept())
            .await
            .expect("accept should resume once a slot frees")
            .unwrap();
        drop(second);
        assert_eq!(gate.available_slots(), 1);
    }

    #[tokio::test]
    async fn reports_limit_and_slots() {
        let gate = bind_local(4).await;
        assert_eq!(gate.connection_limit(), 4);
        assert_eq!(gate.available_slots(), 4);
    }

    #[tokio::test]
    #[should_panic(expected = "connection limit must be > 0")]
    async fn zero_connection_limit_panics() {
        let listener = TcpListener::bind("127.0.0.1:0".parse::<SocketAddr>().unwrap())
            .await
            .unwrap();
        let _ = GatedListener::new(listener, 0);
    }
}
