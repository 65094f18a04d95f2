//! RPC server construction and serving.
//!
//! Wire stubs and service definitions belong to callers, so these tests
//! drive the server with a hand-rolled no-op service; call-level admission
//! semantics are covered against the middleware directly.

use std::convert::Infallible;
use std::future::Ready;
use std::net::SocketAddr;
use std::task::{Context, Poll};
use std::time::Duration;

use tonic::body::Body;
use tonic::server::NamedService;
use tower::Service;

use loadgate::rpc::RpcServer;

mod common;

/// Minimal service so the server has something to route to.
#[derive(Clone)]
struct Probe;

impl NamedService for Probe {
    const NAME: &'static str = "loadgate.Probe";
}

impl Service<http::Request<Body>> for Probe {
    type Response = http::Response<Body>;
    type Error = Infallible;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _request: http::Request<Body>) -> Self::Future {
        std::future::ready(Ok(http::Response::new(Body::empty())))
    }
}

fn local() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

#[tokio::test]
async fn accepts_connections_behind_the_gate() {
    common::init_tracing();

    let server = RpcServer::bind(local(), 2, Some(4)).await.unwrap();
    let addr = server.local_addr().unwrap();
    let serving = tokio::spawn(async move { server.serve(Probe).await });

    let connection = tokio::net::TcpStream::connect(addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!serving.is_finished());

    drop(connection);
    serving.abort();
}

#[tokio::test]
async fn stops_when_the_shutdown_signal_fires() {
    common::init_tracing();

    let server = RpcServer::bind(local(), 1, None).await.unwrap();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let serving = tokio::spawn(server.serve_with_shutdown(Probe, async {
        let _ = shutdown_rx.await;
    }));

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(()).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), serving)
        .await
        .expect("server should stop after the signal")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn rejects_invalid_limits_before_any_socket_is_opened() {
    assert!(RpcServer::bind(local(), 0, None).await.is_err());
    assert!(RpcServer::bind(local(), 8, Some(4)).await.is_err());
}
