//! Tests for synchronization between independently opened contexts.

use marketstate::{
    ChangeEvent, ChangeOrigin, ChangeTransport, ClientConfig, ClientState, FileStorage,
    LocalTransport, MemoryStorage, NewNotification, NoopAlerter, NotificationType,
    PollingTransport, StorageBackend, Topic,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Browser {
    storage: Arc<dyn StorageBackend>,
    transport: Arc<dyn ChangeTransport>,
}

impl Browser {
    fn new() -> Self {
        Self::with_storage(Arc::new(MemoryStorage::new()))
    }

    fn with_storage(storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            storage,
            transport: Arc::new(LocalTransport::new()),
        }
    }

    /// One process of several sharing a storage directory.
    fn process(dir: &TempDir) -> Self {
        let storage: Arc<dyn StorageBackend> = Arc::new(FileStorage::open(dir.path()).unwrap());
        Self {
            transport: Arc::new(PollingTransport::new(Arc::clone(&storage))),
            storage,
        }
    }

    fn open_tab(&self) -> ClientState {
        ClientState::open(
            ClientConfig::default(),
            Arc::clone(&self.storage),
            Arc::clone(&self.transport),
            Arc::new(NoopAlerter),
        )
    }
}

fn system(title: &str) -> NewNotification {
    NewNotification::new(NotificationType::System, title, "body")
}

// --- Notifications ---

#[test]
fn test_add_in_one_tab_appears_once_in_another() {
    let browser = Browser::new();
    let tab_a = browser.open_tab();
    let tab_b = browser.open_tab();

    let added = tab_a.notifications().add(system("Maintenance"));

    assert_eq!(tab_b.sync(), 1);
    let list = tab_b.notifications().list();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0], added);

    // A duplicated signal carrying the same state does not double-insert
    let raw = browser.storage.get("notifications").unwrap();
    assert!(!tab_b.notifications().apply_external_change(raw.as_deref()));
    assert_eq!(tab_b.notifications().len(), 1);
}

#[test]
fn test_simulated_signal_between_registries() {
    let browser = Browser::new();
    let tab_a = browser.open_tab();
    let tab_b = browser.open_tab();

    let added = tab_a
        .notifications()
        .add(NewNotification::new(NotificationType::Payment, "Paid", "invoice 4"));

    // Deliver the persisted value directly instead of draining the transport
    let raw = browser.storage.get("notifications").unwrap();
    assert!(tab_b.notifications().apply_external_change(raw.as_deref()));

    let matching: Vec<_> = tab_b
        .notifications()
        .list()
        .into_iter()
        .filter(|n| n.id == added.id)
        .collect();
    assert_eq!(matching.len(), 1);

    // The queued signal for the same write is then a no-op
    assert_eq!(tab_b.sync(), 0);
    assert_eq!(tab_b.notifications().len(), 1);
}

#[test]
fn test_mutations_propagate() {
    let browser = Browser::new();
    let tab_a = browser.open_tab();
    let tab_b = browser.open_tab();

    let first = tab_a.notifications().add(system("first"));
    let second = tab_a.notifications().add(system("second"));
    tab_b.sync();
    assert_eq!(tab_b.notifications().unread_count(), 2);

    tab_b.notifications().mark_read(&first.id);
    tab_a.sync();
    assert_eq!(tab_a.notifications().unread_count(), 1);

    tab_a.notifications().remove(&second.id);
    tab_b.sync();
    assert_eq!(tab_b.notifications().len(), 1);
    assert!(tab_b.notifications().get(&second.id).is_none());

    tab_b.notifications().clear_all();
    tab_a.sync();
    assert!(tab_a.notifications().is_empty());
}

#[test]
fn test_external_add_is_announced() {
    let browser = Browser::new();
    let tab_a = browser.open_tab();
    let tab_b = browser.open_tab();
    let events = tab_b.subscribe(Topic::Notifications);

    let added = tab_a.notifications().add(system("New listing"));
    tab_b.sync();

    let received = events.drain();
    assert_eq!(received.len(), 2);
    match &received[0] {
        ChangeEvent::NotificationAdded {
            notification,
            origin,
        } => {
            assert_eq!(notification.id, added.id);
            assert_eq!(*origin, ChangeOrigin::External);
        }
        other => panic!("Expected NotificationAdded, got {:?}", other),
    }
    assert_eq!(received[1].origin(), ChangeOrigin::External);
}

#[test]
fn test_writer_does_not_receive_own_change() {
    let browser = Browser::new();
    let tab_a = browser.open_tab();
    let events = tab_a.subscribe(Topic::Notifications);

    tab_a.notifications().add(system("mine"));
    let local_events = events.drain().len();

    assert_eq!(tab_a.sync(), 0);
    assert!(events.recv_timeout(Duration::from_millis(20)).is_err());
    assert_eq!(local_events, 2);
}

#[test]
fn test_last_write_wins_between_tabs() {
    let browser = Browser::new();
    let tab_a = browser.open_tab();
    let tab_b = browser.open_tab();

    // Both tabs write before seeing each other
    tab_a.notifications().add(system("from a"));
    let from_b = tab_b.notifications().add(system("from b"));

    // Storage holds whichever write landed last
    let stored = browser.storage.get("notifications").unwrap().unwrap();
    assert!(stored.contains("from b"));
    assert!(!stored.contains("from a"));

    tab_a.sync();
    let list = tab_a.notifications().list();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].id, from_b.id);
}

#[test]
fn test_new_tab_loads_persisted_state() {
    let browser = Browser::new();
    let tab_a = browser.open_tab();
    tab_a.notifications().add(system("persisted"));
    tab_a.favorites().toggle("seller-5");

    let tab_c = browser.open_tab();
    assert_eq!(tab_c.notifications().len(), 1);
    assert!(tab_c.favorites().has("seller-5"));
}

// --- Favorites ---

#[test]
fn test_favorites_propagate() {
    let browser = Browser::new();
    let tab_a = browser.open_tab();
    let tab_b = browser.open_tab();
    let tab_c = browser.open_tab();

    tab_a.favorites().toggle("lot-1");
    tab_a.favorites().toggle("lot-2");
    tab_b.sync();
    tab_c.sync();
    assert!(tab_b.favorites().has("lot-2"));
    assert_eq!(tab_c.favorites().list(), tab_a.favorites().list());

    tab_c.favorites().toggle("lot-1");
    tab_a.sync();
    tab_b.sync();
    assert!(!tab_a.favorites().has("lot-1"));
    assert!(!tab_b.favorites().has("lot-1"));
}

#[test]
fn test_overtaken_signals_converge_on_storage() {
    let browser = Browser::new();
    let tab_a = browser.open_tab();
    let tab_b = browser.open_tab();

    // Each tab writes before draining the other's signal
    tab_a.favorites().toggle("x");
    tab_b.favorites().toggle("y");
    tab_a.sync();
    tab_b.sync();

    let stored = browser.storage.get("favorites").unwrap();
    assert_eq!(stored.as_deref(), Some("[\"y\"]"));
    assert_eq!(tab_a.favorites().list(), vec!["y".to_string()]);
    assert_eq!(tab_b.favorites().list(), vec!["y".to_string()]);
}

#[test]
fn test_overtaken_notification_signal_is_ignored() {
    let browser = Browser::new();
    let tab_a = browser.open_tab();
    let tab_b = browser.open_tab();

    tab_a.notifications().add(system("from a"));
    let from_b = tab_b.notifications().add(system("from b"));
    tab_a.sync();

    // tab_b's queued signal carries tab_a's older list
    assert_eq!(tab_b.sync(), 0);
    let expected = vec![from_b.id.clone()];
    let ids = |tab: &ClientState| -> Vec<_> {
        tab.notifications().list().into_iter().map(|n| n.id).collect()
    };
    assert_eq!(ids(&tab_a), expected);
    assert_eq!(ids(&tab_b), expected);
}

#[test]
fn test_handlers_see_external_favorites() {
    let browser = Browser::new();
    let tab_a = browser.open_tab();
    let tab_b = browser.open_tab();

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    tab_b.bus().subscribe(Topic::Favorites, move |event| {
        if let ChangeEvent::FavoritesChanged { favorites, origin } = event {
            sink.lock().push((favorites.clone(), *origin));
        }
    });

    tab_a.favorites().toggle("seller-2");
    tab_b.sync();

    let seen = seen.lock();
    assert_eq!(
        *seen,
        vec![(vec!["seller-2".to_string()], ChangeOrigin::External)]
    );
}

// --- File storage shared between contexts ---

#[test]
fn test_file_storage_contexts() {
    let dir = TempDir::new().unwrap();
    let browser = Browser::with_storage(Arc::new(FileStorage::open(dir.path()).unwrap()));
    let tab_a = browser.open_tab();
    let tab_b = browser.open_tab();

    tab_a.favorites().toggle("lot-9");
    tab_a.notifications().add(system("on disk"));
    tab_b.sync();
    assert!(tab_b.favorites().has("lot-9"));
    assert_eq!(tab_b.notifications().len(), 1);

    // A fresh process opening the same directory sees the state
    let other_process = Browser::with_storage(Arc::new(FileStorage::open(dir.path()).unwrap()));
    let tab_c = other_process.open_tab();
    assert!(tab_c.favorites().has("lot-9"));
    assert_eq!(tab_c.notifications().list()[0].title, "on disk");
}

#[test]
fn test_separate_processes_propagate_through_polling() {
    let dir = TempDir::new().unwrap();
    let process_a = Browser::process(&dir);
    let process_b = Browser::process(&dir);
    let tab_a = process_a.open_tab();
    let tab_a2 = process_a.open_tab();
    let tab_b = process_b.open_tab();

    tab_a.favorites().toggle("lot-4");
    assert_eq!(tab_b.sync(), 1);
    assert!(tab_b.favorites().has("lot-4"));
    assert_eq!(tab_a2.sync(), 1);

    let added = tab_b.notifications().add(system("from process b"));
    assert_eq!(tab_a.sync(), 1);
    assert_eq!(tab_a.notifications().list(), vec![added]);
    assert_eq!(tab_a2.sync(), 1);

    // Writers are not told about their own changes
    assert_eq!(tab_a.sync(), 0);
    assert_eq!(tab_b.sync(), 0);
}
