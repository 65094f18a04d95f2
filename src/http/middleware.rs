//! Request admission middleware.
//!
//! # Responsibilities
//! - Consult the limiter before the wrapped service runs
//! - Reject with 429 and a plain-text body when the budget is spent
//! - Hold the permit across the whole response future

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Response, StatusCode};
use tower::{Layer, Service};

use crate::limit::{LimitExceeded, Limiter};

/// Tower layer that applies request admission control.
///
/// Apply it outermost-but-for-tracing so no application logic runs for a
/// rejected request.
#[derive(Debug, Clone)]
pub struct AdmissionLayer {
    limiter: Limiter,
}

impl AdmissionLayer {
    pub fn new(limiter: Limiter) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for AdmissionLayer {
    type Service = Admission<S>;

    fn layer(&self, inner: S) -> Admission<S> {
        Admission {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

/// Service produced by [`AdmissionLayer`].
#[derive(Debug, Clone)]
pub struct Admission<S> {
    inner: S,
    limiter: Limiter,
}

impl<S, ReqBody> Service<Request<ReqBody>> for Admission<S>
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
                crate::metrics::operation_admitted("http", self.limiter.in_flight());
                let response = self.inner.call(request);
                Box::pin(async move {
                    let response = response.await;
                    drop(permit);
                    response
                })
            }
            Err(rejected) => {
                // the system working as intended, not an application error
                crate::metrics::operation_rejected("http");
                tracing::debug!("request rejected: {rejected}");
                let response = too_many_requests(rejected);
                Box::pin(async move { Ok(response) })
            }
        }
    }
}

fn too_many_requests(rejected: LimitExceeded) -> Response<Body> {
    let mut response = Response::new(Body::from(rejected.to_string()));
    *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
