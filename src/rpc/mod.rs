//! gRPC admission integration.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → net::GatedListener (connection cap, backpressure)
//!     → server.rs (tonic: per-connection stream cap, keepalive eviction)
//!     → middleware.rs (request cap: ResourceExhausted when the budget is spent)
//!     → application service
//! ```
//!
//! # Design Decisions
//! - ResourceExhausted, not Unavailable: the signal is "out of resources,
//!   retry later", matching load shedding rather than a permanent outage
//! - The per-connection stream cap equals the request limit, so one
//!   physical connection cannot drain the whole budget; well-behaved
//!   clients block on send before they are ever rejected
//! - User middleware layers sit inside the admission layer; admission
//!   always composes in front

pub mod middleware;
pub mod server;

pub use middleware::{RpcAdmission, RpcAdmissionLayer};
pub use server::{RpcServer, ServeError};
