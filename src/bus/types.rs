//! Event and subscription types for the change bus.

use crate::types::{ContextId, Notification};
use serde::{Deserialize, Serialize};

/// What a subscriber listens to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Notifications,
    Favorites,
}

/// Where a state change came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOrigin {
    /// Mutation made through this context's registry.
    Local,
    /// State received from another context.
    External,
}

/// Events delivered to local subscribers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// A notification appeared that this context had not seen before.
    NotificationAdded {
        notification: Notification,
        origin: ChangeOrigin,
    },

    /// Full notification list after a change (newest first).
    NotificationsChanged {
        notifications: Vec<Notification>,
        origin: ChangeOrigin,
    },

    /// Full favorites set after a change.
    FavoritesChanged {
        favorites: Vec<String>,
        origin: ChangeOrigin,
    },
}

impl ChangeEvent {
    pub fn topic(&self) -> Topic {
        match self {
            ChangeEvent::NotificationAdded { .. } | ChangeEvent::NotificationsChanged { .. } => {
                Topic::Notifications
            }
            ChangeEvent::FavoritesChanged { .. } => Topic::Favorites,
        }
    }

    pub fn origin(&self) -> ChangeOrigin {
        match self {
            ChangeEvent::NotificationAdded { origin, .. }
            | ChangeEvent::NotificationsChanged { origin, .. }
            | ChangeEvent::FavoritesChanged { origin, .. } => *origin,
        }
    }
}

/// A persisted value changed in another context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalChange {
    pub key: String,
    /// New raw value, None if the key was removed.
    pub new_value: Option<String>,
    /// Context that wrote it, when known. Changes picked up by polling
    /// shared storage have no origin.
    pub origin: Option<ContextId>,
}

/// Unique identifier for a subscription. Ids grow in registration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to a channel subscription.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    pub topic: Topic,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<ChangeEvent>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<ChangeEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<ChangeEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<ChangeEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently buffered.
    pub fn drain(&self) -> Vec<ChangeEvent> {
        self.receiver.try_iter().collect()
    }
}

/// Receiving side of an external change watch on one key.
pub struct ExternalWatch {
    pub key: String,
    pub(crate) receiver: crossbeam_channel::Receiver<ExternalChange>,
}

impl ExternalWatch {
    pub fn new(key: impl Into<String>, receiver: crossbeam_channel::Receiver<ExternalChange>) -> Self {
        Self {
            key: key.into(),
            receiver,
        }
    }

    /// Take every queued change without blocking.
    pub fn drain(&self) -> Vec<ExternalChange> {
        self.receiver.try_iter().collect()
    }

    /// Number of queued changes.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}
