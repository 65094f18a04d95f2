//! Concurrent operation limiting.
//!
//! # Data Flow
//! ```text
//! Caller wants to do work:
//!     → Limiter::start() — admit (permit) or reject (LimitExceeded), never wait
//!     → do the work while holding the permit
//!     → drop the permit — slot released on every exit path, panics included
//! ```
//!
//! # Design Decisions
//! - Admission never blocks; rejection is immediate (holding a pending
//!   request costs more memory than turning it away)
//! - Release is a Drop impl, not a method that can be forgotten
//! - One mutex-guarded counter per instance; no global state

pub mod limiter;

pub use limiter::{LimitExceeded, Limiter, OperationPermit};
