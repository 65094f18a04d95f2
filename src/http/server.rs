//! Limited HTTP serving.
//!
//! # Responsibilities
//! - Validate the limits before any socket is opened
//! - Wire the admission middleware into the application router
//! - Drive connections from the gated listener with hyper
//! - Install header-read and keepalive timeout defaults

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use axum::Router;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use thiserror::Error;
use tokio::net::TcpListener;
use tower::ServiceExt;
use tower_http::trace::TraceLayer;

use crate::config::{AdmissionConfig, ConfigError};
use crate::http::middleware::AdmissionLayer;
use crate::limit::Limiter;
use crate::net::{GatedListener, GatedStream};

/// How long a client gets to produce a full request header. On an idle
/// keepalive connection this is also how long hyper waits for the next
/// request, so it bounds idle HTTP/1 connections too.
const READ_HEADER_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP/2 keepalive ping interval for idle connections.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);

/// HTTP/2 connections that do not answer a keepalive ping within this
/// window are closed, reclaiming their connection slot.
const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(20);

/// Error serving HTTP.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to bind listener: {0}")]
    Bind(#[source] io::Error),

    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),
}

/// An HTTP server with bounded concurrent requests and connections.
///
/// Requests over the limit receive `429 Too Many Requests`; connections
/// over the limit wait in the kernel backlog. This keeps memory bounded
/// during overload instead of letting the process grow until it is killed.
#[derive(Debug)]
pub struct HttpServer {
    router: Router,
    limiter: Limiter,
    connection_limit: usize,
}

impl HttpServer {
    /// Wrap `router` with request admission control.
    ///
    /// Fails if the limits are invalid; no socket is opened here.
    pub fn new(router: Router, config: &AdmissionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let limiter = Limiter::new(config.request_limit);
        let router = router
            .layer(AdmissionLayer::new(limiter.clone()))
            .layer(TraceLayer::new_for_http());
        Ok(Self {
            router,
            limiter,
            connection_limit: config.connection_limit,
        })
    }

    /// The request limiter, shared with the installed middleware.
    pub fn limiter(&self) -> &Limiter {
        &self.limiter
    }

    /// Bind `addr` and serve until the task is dropped.
    pub async fn bind_and_serve(self, addr: SocketAddr) -> Result<(), ServeError> {
        let listener = TcpListener::bind(addr).await.map_err(ServeError::Bind)?;
        self.serve(listener).await
    }

    /// Serve connections from `listener`, gated at the connection limit.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServeError> {
        let gate = GatedListener::new(listener, self.connection_limit);
        tracing::info!(
            address = ?gate.local_addr().ok(),
            request_limit = ?self.limiter.capacity(),
            connection_limit = self.connection_limit,
            "HTTP server starting"
        );

        loop {
            let (stream, peer_addr) = gate.accept().await.map_err(ServeError::Accept)?;
            let app = self.router.clone();
            tokio::spawn(async move {
                if let Err(error) = serve_connection(stream, app).await {
                    tracing::debug!(peer_addr = %peer_addr, %error, "connection ended with error");
                }
            });
        }
    }
}

/// Drive one connection to completion. The gate slot rides inside
/// `stream` and is released when this task finishes, however it finishes.
async fn serve_connection(
    stream: GatedStream,
    app: Router,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let service = service_fn(move |request: Request<Incoming>| {
        let app = app.clone();
        async move { app.oneshot(request.map(Body::new)).await }
    });

    let mut builder = auto::Builder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(READ_HEADER_TIMEOUT);
    builder
        .http2()
        .timer(TokioTimer::new())
        .keep_alive_interval(KEEPALIVE_INTERVAL)
        .keep_alive_timeout(KEEPALIVE_TIMEOUT);

    builder
        .serve_connection_with_upgrades(TokioIo::new(stream), service)
        .await
}
