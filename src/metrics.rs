//! Admission metrics.
//!
//! # Metrics
//! - `loadgate_admitted_total{protocol}` (counter): operations admitted
//! - `loadgate_rejected_total{protocol}` (counter): operations shed at the gate
//! - `loadgate_in_flight` (gauge): operations currently running
//! - `loadgate_open_connections` (gauge): connections currently held open
//!
//! Recording goes through the `metrics` facade; installing an exporter is
//! the host process's concern.

use metrics::{counter, gauge};

pub(crate) fn operation_admitted(protocol: &'static str, in_flight: usize) {
    counter!("loadgate_admitted_total", "protocol" => protocol).increment(1);
    gauge!("loadgate_in_flight").set(in_flight as f64);
}

pub(crate) fn operation_rejected(protocol: &'static str) {
    counter!("loadgate_rejected_total", "protocol" => protocol).increment(1);
}

pub(crate) fn connection_opened() {
    gauge!("loadgate_open_connections").increment(1.0);
}

pub(crate) fn connection_closed() {
    gauge!("loadgate_open_connections").decrement(1.0);
}
