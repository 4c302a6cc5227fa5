//! HTTP handlers.
//!
//! - `ingress`: turns requests into queued messages
//! - `monitor`: dispatch statistics

pub mod ingress;
pub mod monitor;
