//! Fan-out of consumed messages to live observers

use crate::error::RelayError;
use crate::message::Message;
use crate::metrics::{global_metrics, RelayMetrics};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Distributes each consumed message to all currently-registered observers.
///
/// Every observer gets its own bounded channel, so a slow or failing observer
/// never blocks delivery to the others or the consumption loop. A full
/// channel drops the message for that observer only; a closed channel
/// deregisters it.
pub struct Broadcaster {
    observers: Arc<DashMap<u64, mpsc::Sender<Message>>>,
    next_id: AtomicU64,
    capacity: usize,
    metrics: Arc<RelayMetrics>,
}

impl Broadcaster {
    /// Create a broadcaster whose observers buffer up to `capacity` messages
    pub fn new(capacity: usize) -> Self {
        Self::with_metrics(capacity, global_metrics())
    }

    /// Create a broadcaster recording into the given metrics
    pub fn with_metrics(capacity: usize, metrics: Arc<RelayMetrics>) -> Self {
        Self {
            observers: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
            capacity,
            metrics,
        }
    }

    /// Register a new observer.
    ///
    /// The observer receives every message broadcast from now on, in
    /// broadcast order. Dropping the handle deregisters it.
    pub fn register(&self) -> Observer {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.capacity.max(1));
        self.observers.insert(id, sender);
        self.metrics.record_observer_registered();
        debug!("Observer {} registered", id);
        Observer {
            id,
            receiver,
            registry: Arc::clone(&self.observers),
            metrics: Arc::clone(&self.metrics),
        }
    }

    /// Deliver a message to every registered observer.
    ///
    /// Fire-and-forget for the caller; returns how many observers the
    /// message was handed to.
    pub fn broadcast(&self, message: Message) -> usize {
        let mut delivered = 0;
        let mut disconnected = Vec::new();

        for entry in self.observers.iter() {
            match entry.value().try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    self.metrics.record_observer_lagged();
                    let err = RelayError::observer_delivery(format!(
                        "Observer {} is not keeping up, dropped message with key '{}'",
                        entry.key(),
                        message.key
                    ));
                    warn!("{}", err);
                }
                Err(TrySendError::Closed(_)) => disconnected.push(*entry.key()),
            }
        }

        for id in disconnected {
            if self.observers.remove(&id).is_some() {
                self.metrics.record_observer_deregistered();
                debug!("Observer {} disconnected", id);
            }
        }

        self.metrics.record_broadcast(delivered as u64);
        delivered
    }

    /// Number of currently registered observers
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

/// A live recipient of broadcast messages.
///
/// Receives messages in the order they were broadcast. Dropping the handle
/// deregisters the observer.
pub struct Observer {
    id: u64,
    receiver: mpsc::Receiver<Message>,
    registry: Arc<DashMap<u64, mpsc::Sender<Message>>>,
    metrics: Arc<RelayMetrics>,
}

impl Observer {
    /// Identity of this observer within its broadcaster
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Receive the next message.
    ///
    /// Returns `None` once the observer is deregistered and its buffered
    /// messages are drained.
    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        if self.registry.remove(&self.id).is_some() {
            self.metrics.record_observer_deregistered();
            debug!("Observer {} deregistered", self.id);
        }
    }
}
