//! Change bus: local fan-out plus the bridge to other contexts.

use crate::types::ContextId;
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::transport::ChangeTransport;
use super::types::{ChangeEvent, ExternalWatch, SubscriptionHandle, SubscriptionId, Topic};

/// Callback invoked synchronously for each event on a topic.
pub type ChangeHandler = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

enum Delivery {
    Callback(ChangeHandler),
    Channel(Sender<ChangeEvent>),
}

/// Internal subscription state.
struct Subscriber {
    topic: Topic,
    delivery: Delivery,
}

/// Publishes state changes to in-process subscribers and forwards persisted
/// writes to other contexts through a [`ChangeTransport`].
///
/// One bus exists per context. Handlers are called in registration order,
/// outside the subscriber lock, so a handler may subscribe, unsubscribe or
/// read registry state.
pub struct ChangeBus {
    context: ContextId,
    /// Active subscriptions, ordered by id (registration order).
    subscribers: RwLock<BTreeMap<SubscriptionId, Subscriber>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
    transport: Arc<dyn ChangeTransport>,
}

impl ChangeBus {
    /// Create a bus for `context` on a shared transport.
    pub fn new(context: ContextId, transport: Arc<dyn ChangeTransport>) -> Self {
        Self {
            context,
            subscribers: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            transport,
        }
    }

    /// The context this bus belongs to.
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Register a callback for `topic`.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.insert(topic, Delivery::Callback(Arc::new(handler)))
    }

    /// Subscribe through a bounded channel.
    ///
    /// A subscriber that lets `buffer_size` events pile up is dropped and its
    /// receiver disconnects once drained.
    pub fn subscribe_channel(&self, topic: Topic, buffer_size: usize) -> SubscriptionHandle {
        let (sender, receiver) = bounded(buffer_size.max(1));
        let id = self.insert(topic, Delivery::Channel(sender));
        SubscriptionHandle {
            id,
            topic,
            receiver,
        }
    }

    fn insert(&self, topic: Topic, delivery: Delivery) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.subscribers
            .write()
            .insert(id, Subscriber { topic, delivery });
        id
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.write().remove(&id).is_some()
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Deliver `event` to every local subscriber of its topic.
    pub fn publish(&self, event: &ChangeEvent) {
        let topic = event.topic();

        // Snapshot targets so handlers run without the lock held
        let targets: Vec<(SubscriptionId, Delivery)> = {
            let subs = self.subscribers.read();
            subs.iter()
                .filter(|(_, sub)| sub.topic == topic)
                .map(|(id, sub)| {
                    let delivery = match &sub.delivery {
                        Delivery::Callback(handler) => Delivery::Callback(Arc::clone(handler)),
                        Delivery::Channel(sender) => Delivery::Channel(sender.clone()),
                    };
                    (*id, delivery)
                })
                .collect()
        };

        let mut to_remove = Vec::new();

        for (id, delivery) in targets {
            match delivery {
                Delivery::Callback(handler) => handler(event),
                Delivery::Channel(sender) => match sender.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!(subscription = id.0, ?topic, "subscriber buffer full, dropping subscriber");
                        to_remove.push(id);
                    }
                    Err(TrySendError::Disconnected(_)) => to_remove.push(id),
                },
            }
        }

        // Remove dropped subscriptions
        if !to_remove.is_empty() {
            let mut subs = self.subscribers.write();
            for id in to_remove {
                subs.remove(&id);
            }
        }
    }

    /// Forward a persisted write to the other contexts.
    pub fn broadcast(&self, key: &str, value: Option<&str>) {
        debug!(key, context = %self.context, "broadcasting change");
        self.transport.publish(self.context, key, value);
    }

    /// Let the transport look for changes it cannot push.
    pub fn poll_external(&self) {
        self.transport.poll();
    }

    /// Start receiving writes to `key` made by other contexts.
    pub fn watch(&self, key: &str) -> ExternalWatch {
        self.transport.on_external_change(self.context, key)
    }
}
