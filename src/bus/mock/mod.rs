//! Mock publisher implementation for testing.
//!
//! Records every published message, can be told to fail, and can be paused
//! to simulate a slow broker so queue backpressure can be observed.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{watch, RwLock};

use super::{BusError, Connector, Message, Publisher, Result};
use crate::config::HostPort;

#[derive(Default)]
struct MockState {
    published: RwLock<Vec<Message>>,
    attempts: RwLock<usize>,
    fail_on_publish: RwLock<bool>,
    /// Number of messages published when `close` was called.
    published_at_close: RwLock<Option<usize>>,
}

/// Mock publisher for testing.
///
/// Clones share state, so a test can keep one handle while the dispatcher
/// owns another.
#[derive(Clone)]
pub struct MockPublisher {
    state: Arc<MockState>,
    paused: watch::Sender<bool>,
}

impl Default for MockPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPublisher {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            state: Arc::new(MockState::default()),
            paused,
        }
    }

    pub async fn set_fail_on_publish(&self, fail: bool) {
        *self.state.fail_on_publish.write().await = fail;
    }

    /// Hold every publish until `resume` is called.
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    pub async fn published(&self) -> Vec<Message> {
        self.state.published.read().await.clone()
    }

    pub async fn published_count(&self) -> usize {
        self.state.published.read().await.len()
    }

    /// Publish calls made, failed ones included.
    pub async fn attempts(&self) -> usize {
        *self.state.attempts.read().await
    }

    pub async fn is_closed(&self) -> bool {
        self.state.published_at_close.read().await.is_some()
    }

    pub async fn published_at_close(&self) -> Option<usize> {
        *self.state.published_at_close.read().await
    }
}

#[async_trait]
impl Publisher for MockPublisher {
    async fn publish(&self, message: &Message) -> Result<()> {
        let mut paused = self.paused.subscribe();
        // The sender lives in self, so the channel cannot close here
        let _ = paused.wait_for(|paused| !*paused).await;

        *self.state.attempts.write().await += 1;
        if *self.state.fail_on_publish.read().await {
            return Err(BusError::Publish {
                subject: message.subject.clone(),
                message: "Mock publish failure".to_string(),
            });
        }
        self.state.published.write().await.push(message.clone());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let count = self.state.published.read().await.len();
        *self.state.published_at_close.write().await = Some(count);
        Ok(())
    }
}

/// Connector handing out a shared `MockPublisher`.
#[derive(Clone, Default)]
pub struct MockConnector {
    publisher: MockPublisher,
    refuse: bool,
}

impl MockConnector {
    pub fn new(publisher: MockPublisher) -> Self {
        Self {
            publisher,
            refuse: false,
        }
    }

    /// A connector whose every connect attempt fails.
    pub fn refusing() -> Self {
        Self {
            publisher: MockPublisher::new(),
            refuse: true,
        }
    }

    pub fn publisher(&self) -> &MockPublisher {
        &self.publisher
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, address: &HostPort) -> Result<Box<dyn Publisher>> {
        if self.refuse {
            return Err(BusError::Connection {
                address: address.to_string(),
                message: "Mock connection refused".to_string(),
            });
        }
        Ok(Box::new(self.publisher.clone()))
    }
}
