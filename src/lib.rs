//! Admission control for request-serving processes.
//!
//! Bounds the number of concurrently in-flight operations and, separately,
//! the number of concurrently open connections, so that a server degrades
//! by shedding excess work instead of running out of memory under overload.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────┐
//!                  │                    SERVER                        │
//!   TCP connect    │  ┌──────────┐   ┌───────────┐   ┌────────────┐   │
//!   ───────────────┼─▶│   net    │──▶│ protocol  │──▶│ admission  │   │
//!                  │  │  gated   │   │  server   │   │ middleware │   │
//!                  │  │ listener │   │ (hyper /  │   │ (Limiter)  │   │
//!                  │  └──────────┘   │  tonic)   │   └─────┬──────┘   │
//!                  │   blocks at     └───────────┘         │          │
//!                  │   the cap        429 / ResourceExhausted         │
//!                  │                  when the budget is spent        │
//!                  │                                       ▼          │
//!                  │                               application handler│
//!                  └──────────────────────────────────────────────────┘
//! ```
//!
//! The two layers compose but never share state: the connection cap must be
//! at least the request cap, since a raw connection is cheaper to hold than
//! a request is to process. The gate applies backpressure (new connections
//! wait in the kernel backlog); the limiter rejects immediately. That
//! asymmetry is deliberate.

// Core primitive
pub mod limit;

// Transport gating
pub mod net;

// Protocol integrations
pub mod http;
pub mod rpc;

// Cross-cutting concerns
pub mod config;
pub mod metrics;

pub use config::{AdmissionConfig, ConfigError};
pub use http::HttpServer;
pub use limit::{LimitExceeded, Limiter, OperationPermit};
pub use net::GatedListener;
pub use rpc::RpcServer;
