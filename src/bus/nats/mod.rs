//! NATS publisher implementation.
//!
//! Uses core NATS publishing (no JetStream): messages are handed to the
//! client's outbound buffer and no acknowledgment is awaited.
//!
//! # Configuration
//!
//! ```yaml
//! broker:
//!   embed: false
//!   address: "localhost:4222"
//! ```

use async_nats::{Client, ConnectOptions};
use async_trait::async_trait;
use tracing::{debug, info};

use super::{BusError, Connector, Message, Publisher, Result};
use crate::config::HostPort;

/// Connection name reported to the broker.
const CLIENT_NAME: &str = "rest-nats";

/// Opens NATS connections with `async-nats`.
#[derive(Debug, Clone, Default)]
pub struct NatsConnector;

impl NatsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for NatsConnector {
    async fn connect(&self, address: &HostPort) -> Result<Box<dyn Publisher>> {
        let url = format!("nats://{}", address);
        let client = ConnectOptions::new()
            .name(CLIENT_NAME)
            .connect(url.as_str())
            .await
            .map_err(|e| BusError::Connection {
                address: url.clone(),
                message: e.to_string(),
            })?;

        info!(url = %url, "Connected to NATS");

        Ok(Box::new(NatsPublisher::new(client)))
    }
}

/// Publishes over a single NATS client connection.
///
/// The connection is released when the publisher is dropped; `close`
/// flushes buffered messages first.
pub struct NatsPublisher {
    client: Client,
}

impl NatsPublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Publisher for NatsPublisher {
    async fn publish(&self, message: &Message) -> Result<()> {
        self.client
            .publish(message.subject.clone(), message.payload.clone())
            .await
            .map_err(|e| BusError::Publish {
                subject: message.subject.clone(),
                message: e.to_string(),
            })?;

        debug!(
            subject = %message.subject,
            bytes = message.payload.len(),
            "Published to NATS"
        );
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.client
            .flush()
            .await
            .map_err(|e| BusError::Close(e.to_string()))?;
        info!("NATS connection flushed");
        Ok(())
    }
}
