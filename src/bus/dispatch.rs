//! Bounded dispatch queue and the single publishing task.
//!
//! HTTP handlers enqueue messages; one `Dispatcher` drains the queue and
//! publishes in arrival order. A full queue makes `enqueue` wait, which is
//! the only backpressure between HTTP accept rate and broker publish rate.
//!
//! Shutdown is in-band: `DispatchQueue::shutdown` enqueues a single
//! `QueueEntry::Shutdown` behind everything already queued. When the
//! dispatcher reaches it, it hands the publisher back through
//! `DrainComplete` so the connection is closed only after the drain.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info, warn};

use super::{Message, Publisher};

/// An entry in the dispatch queue.
#[derive(Debug)]
pub enum QueueEntry {
    /// A message to publish.
    Data(Message),
    /// Marks the end of the stream; always the last entry.
    Shutdown,
}

/// Errors returned to producers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("Dispatch queue is closed")]
    Closed,
}

/// Dispatch statistics. Written only by the dispatcher.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    peak_depth: AtomicUsize,
    published: AtomicU64,
    publish_failures: AtomicU64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest queue occupancy seen when taking a message.
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn publish_failures(&self) -> u64 {
        self.publish_failures.load(Ordering::Relaxed)
    }

    fn observe_depth(&self, depth: usize) {
        self.peak_depth.fetch_max(depth, Ordering::Relaxed);
    }

    fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// Producer side of the queue, shared by all HTTP handlers.
pub struct DispatchQueue {
    sender: mpsc::Sender<QueueEntry>,
    /// Set once the shutdown sentinel has been enqueued.
    ///
    /// Producers hold the read side across their send, so `shutdown` (write
    /// side) waits for in-flight enqueues and the sentinel lands last.
    sealed: RwLock<bool>,
}

impl DispatchQueue {
    /// Enqueue a message, waiting while the queue is full.
    pub async fn enqueue(&self, message: Message) -> Result<(), DispatchError> {
        let sealed = self.sealed.read().await;
        if *sealed {
            return Err(DispatchError::Closed);
        }
        self.sender
            .send(QueueEntry::Data(message))
            .await
            .map_err(|_| DispatchError::Closed)
    }

    /// Enqueue the shutdown sentinel.
    ///
    /// Returns `false` if shutdown was already requested. Messages enqueued
    /// before this call are still published.
    pub async fn shutdown(&self) -> bool {
        let mut sealed = self.sealed.write().await;
        if *sealed {
            return false;
        }
        *sealed = true;

        if self.sender.send(QueueEntry::Shutdown).await.is_err() {
            warn!("Dispatcher already stopped, nothing to drain");
        }
        true
    }

    #[cfg(test)]
    async fn is_closed(&self) -> bool {
        *self.sealed.read().await
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    /// Entries currently waiting in the queue.
    pub fn depth(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }
}

/// Signalled once by the dispatcher when it has drained the queue.
pub struct DrainComplete {
    /// The publisher, returned so the owner can close it.
    pub publisher: Box<dyn Publisher>,
    pub published: u64,
    pub publish_failures: u64,
}

/// The single consumer of the dispatch queue.
///
/// Owns the publisher while running, so publishes never race on the
/// connection.
pub struct Dispatcher {
    receiver: mpsc::Receiver<QueueEntry>,
    publisher: Box<dyn Publisher>,
    metrics: Arc<DispatchMetrics>,
}

/// Create a queue of the given capacity and the dispatcher that drains it.
///
/// # Panics
///
/// Panics if `capacity` is zero; `Config::validate` rejects that value.
pub fn dispatch_channel(
    capacity: usize,
    publisher: Box<dyn Publisher>,
    metrics: Arc<DispatchMetrics>,
) -> (DispatchQueue, Dispatcher) {
    let (sender, receiver) = mpsc::channel(capacity);
    let queue = DispatchQueue {
        sender,
        sealed: RwLock::new(false),
    };
    let dispatcher = Dispatcher {
        receiver,
        publisher,
        metrics,
    };
    (queue, dispatcher)
}

impl Dispatcher {
    /// Spawn the dispatch loop. The receiver resolves once the queue is drained.
    pub fn spawn(self) -> oneshot::Receiver<DrainComplete> {
        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(async move {
            let complete = self.run().await;
            if done_tx.send(complete).is_err() {
                debug!("Drain completion not awaited");
            }
        });
        done_rx
    }

    /// Publish entries in order until the sentinel.
    ///
    /// If every producer handle is dropped without a sentinel the drain also
    /// completes.
    pub async fn run(mut self) -> DrainComplete {
        info!(capacity = self.receiver.max_capacity(), "Dispatcher started");

        let mut published = 0u64;
        let mut publish_failures = 0u64;

        loop {
            match self.receiver.recv().await {
                Some(QueueEntry::Data(message)) => {
                    self.metrics.observe_depth(self.receiver.len() + 1);

                    match self.publisher.publish(&message).await {
                        Ok(()) => {
                            published += 1;
                            self.metrics.record_published();
                        }
                        Err(e) => {
                            // Best effort: the HTTP response is already sent
                            publish_failures += 1;
                            self.metrics.record_failure();
                            warn!(subject = %message.subject, error = %e, "Publish failed, message dropped");
                        }
                    }
                }
                Some(QueueEntry::Shutdown) => {
                    debug!(remaining = self.receiver.len(), "Shutdown sentinel reached");
                    break;
                }
                None => {
                    warn!("Dispatch queue dropped without shutdown sentinel");
                    break;
                }
            }
        }

        self.receiver.close();

        info!(
            published,
            publish_failures,
            peak_depth = self.metrics.peak_depth(),
            "Dispatcher drained"
        );

        DrainComplete {
            publisher: self.publisher,
            published,
            publish_failures,
        }
    }
}
