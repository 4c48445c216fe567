//! Subscriber registry for live events
//!
//! Every event is serialized once and offered to each subscriber with a
//! non-blocking send. A subscriber whose queue is closed or full is removed on
//! the spot, so a slow or vanished client never stalls the coordinator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::config::defaults::SUBSCRIBER_BUFFER;
use crate::types::PipelineEvent;

/// Identifier handed out by [`Hub::subscribe`].
pub type SubscriberId = u64;

/// Receiving end of one subscription. Each message is one JSON event.
pub struct Subscription {
    pub id: SubscriberId,
    pub receiver: mpsc::Receiver<Arc<str>>,
}

#[derive(Default)]
struct Registry {
    next_id: SubscriberId,
    subscribers: HashMap<SubscriberId, mpsc::Sender<Arc<str>>>,
}

/// Fan-out point for pipeline events.
pub struct Hub {
    registry: Mutex<Registry>,
    buffer: usize,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(SUBSCRIBER_BUFFER)
    }
}

impl Hub {
    /// `buffer` is the per-subscriber queue depth.
    pub fn new(buffer: usize) -> Self {
        Self { registry: Mutex::new(Registry::default()), buffer: buffer.max(1) }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        // Registry stays consistent across a panic: every mutation is a single map call
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, receiver) = mpsc::channel(self.buffer);
        let mut registry = self.registry();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.subscribers.insert(id, tx);
        debug!(subscriber = id, total = registry.subscribers.len(), "Subscriber added");
        Subscription { id, receiver }
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        if self.registry().subscribers.remove(&id).is_some() {
            debug!(subscriber = id, "Subscriber removed");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry().subscribers.len()
    }

    /// Offer `event` to every subscriber. Returns how many accepted it.
    pub fn publish(&self, event: &PipelineEvent) -> usize {
        let message: Arc<str> = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(error = %e, "Failed to serialize event for subscribers");
                return 0;
            }
        };

        let mut registry = self.registry();
        let mut delivered = 0;
        registry.subscribers.retain(|&id, tx| match tx.try_send(Arc::clone(&message)) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(subscriber = id, "Subscriber queue full, dropping subscriber");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(subscriber = id, "Subscriber went away");
                false
            }
        });
        delivered
    }
}
