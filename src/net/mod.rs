//! Connection-gated TCP listening.
//!
//! # Data Flow
//! ```text
//! OS accept queue
//!     → listener.rs (await a connection slot, then accept)
//!     → GatedStream handed to the protocol server
//!     → stream dropped on close → slot released
//! ```
//!
//! # Design Decisions
//! - Connections are throttled by backpressure, not rejection: a
//!   not-yet-accepted connection sits in the kernel backlog and costs far
//!   less than one that was accepted only to be turned away
//! - The slot travels inside the returned stream, so a crashed connection
//!   task still gives its slot back

pub mod listener;

pub use listener::{GatedListener, GatedStream};
