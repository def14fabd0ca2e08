//! Notification registry.

use crate::bus::{ChangeBus, ChangeEvent, ChangeOrigin, ExternalWatch};
use crate::storage::PersistentStore;
use crate::types::{NewNotification, Notification, NotificationId, NotificationType};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::alert::{AlertPermission, AlertRequest, Alerter};

/// Ordered notification list kept in sync with storage and other contexts.
///
/// The list is newest first. Every mutation is published to local
/// subscribers, then persisted and broadcast. Nothing here returns an error:
/// storage failures leave the in-memory list authoritative, unknown ids are
/// no-ops, malformed data is treated as empty.
pub struct NotificationRegistry {
    key: String,
    store: PersistentStore,
    bus: Arc<ChangeBus>,
    alerter: Arc<dyn Alerter>,
    notifications: Mutex<Vec<Notification>>,
    watch: ExternalWatch,
}

impl NotificationRegistry {
    /// Load the list stored under `key` and start watching other contexts.
    pub fn open(
        key: impl Into<String>,
        store: PersistentStore,
        bus: Arc<ChangeBus>,
        alerter: Arc<dyn Alerter>,
    ) -> Self {
        let key = key.into();

        // Watch before loading so a concurrent external write is not missed
        let watch = bus.watch(&key);
        let loaded: Vec<Notification> = store.load_or_default(&key);
        let notifications = normalize(loaded);

        debug!(key = %key, count = notifications.len(), "notification registry opened");

        Self {
            key,
            store,
            bus,
            alerter,
            notifications: Mutex::new(notifications),
            watch,
        }
    }

    /// Storage key of the list.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Ask for alert permission if the user has not decided yet.
    pub fn request_alert_permission(&self) -> AlertPermission {
        match self.alerter.permission() {
            AlertPermission::Default => self.alerter.request_permission(),
            decided => decided,
        }
    }

    // --- Mutations ---

    /// Create a notification and prepend it.
    pub fn add(&self, input: NewNotification) -> Notification {
        let notification = input.into_notification();
        self.notifications.lock().insert(0, notification.clone());

        self.bus.publish(&ChangeEvent::NotificationAdded {
            notification: notification.clone(),
            origin: ChangeOrigin::Local,
        });
        self.commit();
        self.show_alert(&notification);

        notification
    }

    /// Mark one notification read. Returns false if it is absent or already read.
    ///
    /// A record that is already read is still persisted and republished, so a
    /// previously failed write gets another chance.
    pub fn mark_read(&self, id: &NotificationId) -> bool {
        let changed = {
            let mut list = self.notifications.lock();
            match list.iter_mut().find(|n| &n.id == id) {
                Some(n) => !std::mem::replace(&mut n.read, true),
                None => return false,
            }
        };

        self.commit();
        changed
    }

    /// Mark every notification read. Returns how many changed.
    pub fn mark_all_read(&self) -> usize {
        let changed = {
            let mut list = self.notifications.lock();
            let mut changed = 0;
            for n in list.iter_mut().filter(|n| !n.read) {
                n.read = true;
                changed += 1;
            }
            changed
        };

        if changed > 0 {
            self.commit();
        }
        changed
    }

    /// Delete a notification. Returns false if it was not present.
    pub fn remove(&self, id: &NotificationId) -> bool {
        {
            let mut list = self.notifications.lock();
            let before = list.len();
            list.retain(|n| &n.id != id);
            if list.len() == before {
                return false;
            }
        }

        self.commit();
        true
    }

    /// Delete everything. Returns how many were removed.
    ///
    /// Always rewrites storage, which also discards an unreadable stored value.
    pub fn clear_all(&self) -> usize {
        let removed = {
            let mut list = self.notifications.lock();
            let removed = list.len();
            list.clear();
            removed
        };

        self.commit();
        removed
    }

    // --- Queries ---

    /// Snapshot of the list, optionally restricted to one type. Order is kept.
    pub fn list_by_type(&self, notification_type: Option<NotificationType>) -> Vec<Notification> {
        let list = self.notifications.lock();
        match notification_type {
            None => list.clone(),
            Some(ty) => list
                .iter()
                .filter(|n| n.notification_type == ty)
                .cloned()
                .collect(),
        }
    }

    /// Snapshot of the whole list.
    pub fn list(&self) -> Vec<Notification> {
        self.list_by_type(None)
    }

    /// Copy of the notification with `id`, if present.
    pub fn get(&self, id: &NotificationId) -> Option<Notification> {
        self.notifications.lock().iter().find(|n| &n.id == id).cloned()
    }

    /// Number of unread notifications, recomputed on every call.
    pub fn unread_count(&self) -> usize {
        self.notifications.lock().iter().filter(|n| !n.read).count()
    }

    /// Unread notifications of one type.
    pub fn unread_count_by_type(&self, notification_type: NotificationType) -> usize {
        self.notifications
            .lock()
            .iter()
            .filter(|n| !n.read && n.notification_type == notification_type)
            .count()
    }

    /// Number of notifications held.
    pub fn len(&self) -> usize {
        self.notifications.lock().len()
    }

    /// True when the list is empty.
    pub fn is_empty(&self) -> bool {
        self.notifications.lock().is_empty()
    }

    // --- Cross-context ---

    /// Catch up with changes made by other contexts. Returns 1 if the local
    /// list changed, 0 otherwise.
    ///
    /// Queued signals only say that the key changed. The value applied is the
    /// one currently in storage, so a signal overtaken by a later write does
    /// not roll this context back. The carried value is used only when
    /// storage cannot be read.
    pub fn sync_external(&self) -> usize {
        self.bus.poll_external();

        let latest = match self.watch.drain().pop() {
            Some(change) => change,
            None => return 0,
        };

        let value = match self.store.load_raw(&self.key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %self.key, error = %e, "re-read failed, applying signalled value");
                latest.new_value
            }
        };

        usize::from(self.apply_external_change(value.as_deref()))
    }

    /// Replace the local list with a value written by another context.
    ///
    /// `None` means the key was removed there. Records are deduplicated by
    /// id; those not seen before are announced as added. A malformed payload
    /// is dropped and local state kept. Returns whether the list changed.
    pub fn apply_external_change(&self, new_value: Option<&str>) -> bool {
        let incoming = match new_value {
            None => Vec::new(),
            Some(raw) => match serde_json::from_str::<Vec<Notification>>(raw) {
                Ok(list) => normalize(list),
                Err(e) => {
                    warn!(key = %self.key, error = %e, "dropping malformed external notification list");
                    return false;
                }
            },
        };

        let added = {
            let mut list = self.notifications.lock();
            if *list == incoming {
                return false;
            }
            let added: Vec<Notification> = {
                let known: HashSet<&NotificationId> = list.iter().map(|n| &n.id).collect();
                incoming
                    .iter()
                    .filter(|n| !known.contains(&n.id))
                    .cloned()
                    .collect()
            };
            *list = incoming;
            added
        };

        debug!(key = %self.key, added = added.len(), "applied external notifications");

        for notification in added {
            self.bus.publish(&ChangeEvent::NotificationAdded {
                notification,
                origin: ChangeOrigin::External,
            });
        }
        self.publish_list(ChangeOrigin::External);
        true
    }

    // --- Internals ---

    fn commit(&self) {
        self.publish_list(ChangeOrigin::Local);
        self.persist();
    }

    /// Publish the list as it is now. Handlers that ran earlier in the same
    /// call may have changed it, so the payload is never taken in advance.
    fn publish_list(&self, origin: ChangeOrigin) {
        self.bus.publish(&ChangeEvent::NotificationsChanged {
            notifications: self.list(),
            origin,
        });
    }

    /// Write the current list and tell other contexts.
    fn persist(&self) {
        let list = self.notifications.lock();
        if let Some(raw) = self.store.save(&self.key, &*list) {
            self.bus.broadcast(&self.key, Some(&raw));
        }
    }

    fn show_alert(&self, notification: &Notification) {
        if self.alerter.permission() != AlertPermission::Granted {
            return;
        }

        let alert = AlertRequest {
            title: notification.title.clone(),
            body: notification.message.clone(),
            icon: notification.image.clone(),
        };
        if let Err(e) = self.alerter.show(&alert) {
            debug!(error = %e, "platform alert not shown");
        }
    }
}

/// Drop duplicate ids (first wins) and order newest first.
fn normalize(list: Vec<Notification>) -> Vec<Notification> {
    let mut seen = HashSet::new();
    let mut list: Vec<Notification> = list
        .into_iter()
        .filter(|n| seen.insert(n.id.clone()))
        .collect();
    list.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    list
}
