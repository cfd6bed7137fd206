//! Subscription router: decodes broadcast frames for a single consumer
//!
//! Exactly one consumer at a time. A new `subscribe()` hands the stream over:
//! the previous `Subscription` ends and the new one receives everything after.
//! Malformed frames are dropped and logged; they never reach the consumer or
//! disturb the connection.

use crate::chat::{codec, ChatEvent};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

type Consumer = mpsc::UnboundedSender<ChatEvent>;

#[derive(Debug, Clone, Default)]
pub struct SubscriptionRouter {
    consumer: Arc<Mutex<Option<Consumer>>>,
}

impl SubscriptionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Consumer>> {
        self.consumer.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register the consumer, replacing (and ending) any previous one
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.slot().replace(tx).is_some() {
            debug!("Subscription handed over to a new consumer");
        }
        Subscription { rx }
    }

    pub fn has_consumer(&self) -> bool {
        self.slot().as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Decode one frame body and deliver it. Returns whether an event was
    /// delivered.
    pub fn dispatch(&self, body: &str) -> bool {
        let event = match codec::decode(body) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, bytes = body.len(), "Dropping inbound frame");
                return false;
            }
        };

        let mut slot = self.slot();
        let Some(tx) = slot.as_ref() else {
            trace!(kind = %event.kind(), "No consumer registered, event discarded");
            return false;
        };
        if tx.send(event).is_err() {
            debug!("Consumer dropped its subscription");
            *slot = None;
            return false;
        }
        true
    }
}

/// Receiving end of the router. Dropping it unregisters the consumer.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<ChatEvent>,
}

impl Subscription {
    /// Next event; `None` once a newer subscription took over or the
    /// session is gone
    pub async fn recv(&mut self) -> Option<ChatEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ChatEvent> {
        self.rx.try_recv().ok()
    }
}
