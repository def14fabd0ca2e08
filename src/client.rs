//! Per-context service object tying all components together.

use crate::bus::{ChangeBus, ChangeTransport, SubscriptionHandle, Topic};
use crate::config::ClientConfig;
use crate::favorites::FavoritesRegistry;
use crate::notifications::{AlertPermission, Alerter, NotificationRegistry};
use crate::storage::{PersistentStore, StorageBackend};
use crate::types::ContextId;
use std::sync::Arc;
use tracing::debug;

/// Client state for one context.
///
/// Constructed once when a context starts and handed to the UI by
/// reference. Provides:
/// - The notification and favorites registries
/// - The context's change bus for subscriptions
/// - `sync` to pull in changes made by other contexts
pub struct ClientState {
    config: ClientConfig,
    bus: Arc<ChangeBus>,
    notifications: NotificationRegistry,
    favorites: FavoritesRegistry,
}

impl ClientState {
    /// Open client state on shared storage and transport.
    ///
    /// Every context of the application must receive the same `storage` and
    /// `transport`; each call creates a new context.
    pub fn open(
        config: ClientConfig,
        storage: Arc<dyn StorageBackend>,
        transport: Arc<dyn ChangeTransport>,
        alerter: Arc<dyn Alerter>,
    ) -> Self {
        let context = ContextId::new();
        let bus = Arc::new(ChangeBus::new(context, transport));
        let store = PersistentStore::new(storage);

        let notifications = NotificationRegistry::open(
            config.notifications_key.clone(),
            store.clone(),
            Arc::clone(&bus),
            alerter,
        );
        let favorites =
            FavoritesRegistry::open(config.favorites_key.clone(), store, Arc::clone(&bus));

        if config.request_alert_permission {
            let permission = notifications.request_alert_permission();
            debug!(%context, ?permission, "alert permission");
        }

        Self {
            config,
            bus,
            notifications,
            favorites,
        }
    }

    /// Configuration this context was opened with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Identity of this context.
    pub fn context(&self) -> ContextId {
        self.bus.context()
    }

    /// The context's change bus.
    pub fn bus(&self) -> &Arc<ChangeBus> {
        &self.bus
    }

    /// Notification registry.
    pub fn notifications(&self) -> &NotificationRegistry {
        &self.notifications
    }

    /// Favorites registry.
    pub fn favorites(&self) -> &FavoritesRegistry {
        &self.favorites
    }

    /// Channel subscription using the configured buffer size.
    pub fn subscribe(&self, topic: Topic) -> SubscriptionHandle {
        self.bus
            .subscribe_channel(topic, self.config.subscription_buffer_size)
    }

    /// Apply every change other contexts have made since the last sync.
    /// Returns how many registries changed.
    pub fn sync(&self) -> usize {
        let applied = self.notifications.sync_external() + self.favorites.sync_external();
        if applied > 0 {
            debug!(context = %self.context(), applied, "synced external changes");
        }
        applied
    }

    /// Current alert permission, asking the user if still undecided.
    pub fn request_alert_permission(&self) -> AlertPermission {
        self.notifications.request_alert_permission()
    }
}
