//! Message bus boundary.
//!
//! This module contains:
//! - `Message`: a subject plus an opaque payload
//! - `Publisher` trait: fire-and-forget publishing over one connection
//! - `Connector` trait: opens the publisher connection at startup
//! - `dispatch`: the bounded queue and the single publishing task
//! - Implementations: NATS, Mock

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::HostPort;

pub mod dispatch;
pub mod mock;
pub mod nats;

// Re-exports
pub use dispatch::{
    dispatch_channel, DispatchError, DispatchMetrics, DispatchQueue, Dispatcher, DrainComplete,
    QueueEntry,
};
pub use mock::{MockConnector, MockPublisher};
pub use nats::{NatsConnector, NatsPublisher};

// ============================================================================
// Types
// ============================================================================

/// A message bound for the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub payload: Bytes,
}

impl Message {
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            payload: payload.into(),
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Connection to '{address}' failed: {message}")]
    Connection { address: String, message: String },

    #[error("Publish to '{subject}' failed: {message}")]
    Publish { subject: String, message: String },

    #[error("Close failed: {0}")]
    Close(String),
}

/// The single outbound connection used for every bridged message.
///
/// Publishing is fire-and-forget: success means the client accepted the
/// message, not that any subscriber received it.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish one message.
    async fn publish(&self, message: &Message) -> Result<()>;

    /// Flush anything buffered and release the connection.
    async fn close(&self) -> Result<()>;
}

/// Opens the publisher connection.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, address: &HostPort) -> Result<Box<dyn Publisher>>;
}
