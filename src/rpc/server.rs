//! Limited gRPC serving.
//!
//! # Responsibilities
//! - Validate the limits before any socket is opened
//! - Cap per-connection concurrent streams at the request limit
//! - Probe idle connections and evict dead ones via HTTP/2 keepalive
//! - Serve tonic services behind the admission middleware

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use futures_util::stream::{self, Stream};
use thiserror::Error;
use tokio::net::TcpListener;
use tonic::body::Body;
use tonic::server::NamedService;
use tonic::transport::server::{Connected, TcpConnectInfo};
use tonic::transport::Server;
use tower::layer::util::{Identity, Stack};
use tower::Service;

use crate::config::{AdmissionConfig, ConfigError};
use crate::limit::Limiter;
use crate::net::{GatedListener, GatedStream};
use crate::rpc::middleware::RpcAdmissionLayer;

/// Idle connections are pinged this often so that dead ones are noticed.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);

/// Connections that do not answer a keepalive ping within this window are
/// closed, reclaiming their gate slot.
const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(20);

/// OS-level keepalive as a backstop for half-open TCP connections.
const TCP_KEEPALIVE: Duration = Duration::from_secs(60);

/// Error building or serving the gRPC server.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to bind listener: {0}")]
    Bind(#[source] io::Error),

    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

/// A gRPC server with bounded concurrent calls and connections.
///
/// Calls over the limit receive `ResourceExhausted`; connections over the
/// limit wait in the kernel backlog. The per-connection stream cap equals
/// the request limit, so a single client cannot monopolize the budget.
#[derive(Debug)]
pub struct RpcServer {
    server: Server<Stack<RpcAdmissionLayer, Identity>>,
    gate: GatedListener,
    limiter: Limiter,
}

impl RpcServer {
    /// Bind `addr` and configure admission control.
    ///
    /// `connection_limit` defaults to double the request limit when not
    /// given. Invalid limits fail here, before any socket is opened.
    pub async fn bind(
        addr: SocketAddr,
        request_limit: usize,
        connection_limit: Option<usize>,
    ) -> Result<Self, ServeError> {
        let config = AdmissionConfig {
            request_limit,
            connection_limit: connection_limit.unwrap_or(2 * request_limit),
        };
        config.validate()?;

        let listener = TcpListener::bind(addr).await.map_err(ServeError::Bind)?;
        let gate = GatedListener::new(listener, config.connection_limit);
        let limiter = Limiter::new(config.request_limit);

        let server = Server::builder()
            .max_concurrent_streams(config.request_limit as u32)
            .http2_keepalive_interval(Some(KEEPALIVE_INTERVAL))
            .http2_keepalive_timeout(Some(KEEPALIVE_TIMEOUT))
            .tcp_keepalive(Some(TCP_KEEPALIVE))
            .layer(RpcAdmissionLayer::new(limiter.clone()));

        tracing::info!(
            address = ?gate.local_addr().ok(),
            request_limit = config.request_limit,
            connection_limit = config.connection_limit,
            "gRPC server configured"
        );

        Ok(Self {
            server,
            gate,
            limiter,
        })
    }

    /// The bound address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.gate.local_addr()
    }

    /// The call limiter, shared with the installed middleware.
    pub fn limiter(&self) -> &Limiter {
        &self.limiter
    }

    /// The effective connection limit.
    pub fn connection_limit(&self) -> usize {
        self.gate.connection_limit()
    }

    /// Serve `service` until the task is dropped.
    pub async fn serve<S>(self, service: S) -> Result<(), ServeError>
    where
        S: Service<http::Request<Body>, Response = http::Response<Body>, Error = Infallible>
            + NamedService
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        let Self {
            mut server, gate, ..
        } = self;
        server
            .add_service(service)
            .serve_with_incoming(incoming_stream(gate))
            .await?;
        Ok(())
    }

    /// Serve `service` until `signal` completes, then stop accepting.
    pub async fn serve_with_shutdown<S, F>(self, service: S, signal: F) -> Result<(), ServeError>
    where
        S: Service<http::Request<Body>, Response = http::Response<Body>, Error = Infallible>
            + NamedService
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
        F: Future<Output = ()>,
    {
        let Self {
            mut server, gate, ..
        } = self;
        server
            .add_service(service)
            .serve_with_incoming_shutdown(incoming_stream(gate), signal)
            .await?;
        Ok(())
    }
}

/// Turn the gate into the connection stream tonic consumes. Each yielded
/// stream carries its own slot, released when the connection closes.
fn incoming_stream(gate: GatedListener) -> impl Stream<Item = io::Result<GatedStream>> {
    stream::unfold(gate, |gate| async move {
        let next = gate.accept().await.map(|(stream, _peer)| stream);
        Some((next, gate))
    })
}

impl Connected for GatedStream {
    type ConnectInfo = TcpConnectInfo;

    fn connect_info(&self) -> Self::ConnectInfo {
        self.get_ref().connect_info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn zero_request_limit_is_rejected() {
        let err = RpcServer::bind(local(), 0, None).await.unwrap_err();
        assert!(matches!(
            err,
            ServeError::Config(ConfigError::ZeroRequestLimit)
        ));
    }

    #[tokio::test]
    async fn connection_limit_below_request_limit_is_rejected() {
        let err = RpcServer::bind(local(), 4, Some(2)).await.unwrap_err();
        assert!(matches!(
            err,
            ServeError::Config(ConfigError::ConnectionLimitTooSmall { .. })
        ));
    }

    #[tokio::test]
    async fn connection_limit_defaults_to_double_the_request_limit() {
        let server = RpcServer::bind(local(), 4, None).await.unwrap();
        assert_eq!(server.connection_limit(), 8);
        assert_eq!(server.limiter().capacity(), Some(4));
        assert!(server.local_addr().unwrap().port() > 0);
    }
}
