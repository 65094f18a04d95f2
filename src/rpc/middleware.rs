//! Call admission middleware for gRPC servers.
//!
//! # Responsibilities
//! - Consult the limiter before call dispatch
//! - Short-circuit with `ResourceExhausted` when the budget is spent
//! - Hold the permit across the whole call future
//!
//! Runs at the HTTP layer underneath tonic's routing, so it covers every
//! service registered on the server.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use http::{header, HeaderValue, Request, Response};
use tonic::body::Body;
use tonic::Code;
use tower::{Layer, Service};

use crate::limit::{LimitExceeded, Limiter};

/// Tower layer that applies call admission control to a tonic server.
#[derive(Debug, Clone)]
pub struct RpcAdmissionLayer {
    limiter: Limiter,
}

impl RpcAdmissionLayer {
    pub fn new(limiter: Limiter) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for RpcAdmissionLayer {
    type Service = RpcAdmission<S>;

    fn layer(&self, inner: S) -> RpcAdmission<S> {
        RpcAdmission {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

/// Service produced by [`RpcAdmissionLayer`].
#[derive(Debug, Clone)]
pub struct RpcAdmission<S> {
    inner: S,
    limiter: Limiter,
}

impl<S, ReqBody> Service<Request<ReqBody>> for RpcAdmission<S>
where
    S: Service<Request<ReqBody>, Response = Response<Body>>,
    S::Future: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        match self.limiter.start() {
            Ok(permit) => {
                crate::metrics::operation_admitted("grpc", self.limiter.in_flight());
                let response = self.inner.call(request);
                Box::pin(async move {
                    let response = response.await;
                    drop(permit);
                    response
                })
            }
            Err(rejected) => {
                crate::metrics::operation_rejected("grpc");
                tracing::debug!("call rejected: {rejected}");
                let response = resource_exhausted(rejected);
                Box::pin(async move { Ok(response) })
            }
        }
    }
}

/// A trailers-only gRPC response carrying `ResourceExhausted`.
fn resource_exhausted(rejected: LimitExceeded) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/grpc"),
    );
    headers.insert("grpc-status", HeaderValue::from(Code::ResourceExhausted as i32));
    // the sentinel text is plain ASCII, no percent-encoding needed
    let message =
        HeaderValue::from_str(&rejected.to_string()).expect("sentinel text is a valid header");
    headers.insert("grpc-message", message);
    response
}
