//! HTTP admission integration.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → net::GatedListener (connection cap, backpressure)
//!     → server.rs (hyper: header-read timeout, h2 keepalive)
//!     → middleware.rs (request cap: 429 when the budget is spent)
//!     → application Router
//! ```
//!
//! # Design Decisions
//! - Rejection happens before the handler runs; an admitted request holds
//!   its permit for the whole response future
//! - Timeout defaults are installed by the server, not the middleware:
//!   slow and idle clients starve the connection budget even when request
//!   admission is enforced correctly

pub mod middleware;
pub mod server;

pub use middleware::{Admission, AdmissionLayer};
pub use server::{HttpServer, ServeError};
