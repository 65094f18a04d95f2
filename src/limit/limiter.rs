//! The admission counter.
//!
//! # Responsibilities
//! - Bound the number of operations in flight at any instant
//! - Admit or reject synchronously; never queue the caller
//! - Reclaim slots automatically when permits are dropped

use std::sync::{Arc, Mutex};

use thiserror::Error;

/// Returned by [`Limiter::start`] when the concurrent operation limit is
/// exceeded. This is the only error `start` produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("exceeded limit of concurrent operations")]
pub struct LimitExceeded;

/// Bounds the number of concurrent operations.
///
/// Cloning is cheap and every clone draws from the same budget. Each server
/// owns its own instance; two instances never share state.
///
/// ```
/// use loadgate::limit::Limiter;
///
/// let limiter = Limiter::new(64);
/// match limiter.start() {
///     Ok(permit) => {
///         // do the work; the slot is released when `permit` drops
///         drop(permit);
///     }
///     Err(rejected) => {
///         // shed the load: map to 429 / ResourceExhausted upstream
///         let _ = rejected;
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Limiter {
    budget: Arc<Budget>,
}

/// Closed set of admission policies. Exactly two exist and no third is
/// anticipated, so an enum rather than a trait object.
#[derive(Debug)]
enum Budget {
    Bounded {
        capacity: usize,
        in_flight: Mutex<usize>,
    },
    Unlimited,
}

impl Limiter {
    /// Create a limiter that admits at most `capacity` concurrent
    /// operations.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero. A zero budget is a configuration
    /// mistake, not a runtime condition worth recovering from.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "limiter capacity must be > 0");
        Self {
            budget: Arc::new(Budget::Bounded {
                capacity,
                in_flight: Mutex::new(0),
            }),
        }
    }

    /// Create a limiter that admits every operation. Lets callers express
    /// "admission control disabled" without branching at every call site.
    pub fn unlimited() -> Self {
        Self {
            budget: Arc::new(Budget::Unlimited),
        }
    }

    /// Attempt to admit one operation.
    ///
    /// Never blocks: either a permit is handed out immediately or
    /// [`LimitExceeded`] is returned. No ordering is guaranteed between
    /// competing callers beyond mutual exclusion of the counter update.
    pub fn start(&self) -> Result<OperationPermit, LimitExceeded> {
        if let Budget::Bounded {
            capacity,
            in_flight,
        } = &*self.budget
        {
            let mut current = in_flight.lock().expect("limiter mutex poisoned");
            if *current == *capacity {
                return Err(LimitExceeded);
            }
            *current += 1;
        }
        Ok(OperationPermit {
            budget: Arc::clone(&self.budget),
        })
    }

    /// The configured capacity, or `None` for an unlimited limiter.
    pub fn capacity(&self) -> Option<usize> {
        match &*self.budget {
            Budget::Bounded { capacity, .. } => Some(*capacity),
            Budget::Unlimited => None,
        }
    }

    /// Number of operations currently admitted. Always zero for an
    /// unlimited limiter.
    pub fn in_flight(&self) -> usize {
        match &*self.budget {
            Budget::Bounded { in_flight, .. } => {
                *in_flight.lock().expect("limiter mutex poisoned")
            }
            Budget::Unlimited => 0,
        }
    }
}

/// Single-use release token handed out by [`Limiter::start`].
///
/// Dropping the permit returns its slot to the limiter, so release happens
/// on every exit path: success, error return, or panic unwind. Move
/// semantics make releasing twice impossible.
#[derive(Debug)]
pub struct OperationPermit {
    budget: Arc<Budget>,
}

impl Drop for OperationPermit {
    fn drop(&mut self) {
        if let Budget::Bounded { in_flight, .. } = &*self.budget {
            let mut current = in_flight.lock().expect("limiter mutex poisoned");
            if *current == 0 {
                // A corrupted counter either wedges admissions forever or
                // silently disables the overload protection. Refuse to
                // continue.
                panic!("bug: permit released without a matching start");
            }
            *current -= 1;
        }
    }
}
