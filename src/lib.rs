//! rest-nats - HTTP to NATS bridge
//!
//! Accepts HTTP requests, maps each request path to a NATS subject and
//! publishes the body as the message payload. Requests are acknowledged once
//! queued; a single dispatcher publishes in arrival order and drains the
//! queue on shutdown.

pub mod bus;
pub mod config;
pub mod handlers;
pub mod process;
pub mod server;
pub mod utils;

pub use config::Config;
pub use server::{BridgeServer, ShutdownReport, StartupError};
