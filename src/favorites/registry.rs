//! Favorites registry.

use crate::bus::{ChangeBus, ChangeEvent, ChangeOrigin, ExternalWatch};
use crate::storage::PersistentStore;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Insertion-ordered set of ids.
#[derive(Debug, Default, PartialEq)]
struct FavoriteSet {
    order: Vec<String>,
    index: HashSet<String>,
}

impl FavoriteSet {
    fn from_ids(ids: Vec<String>) -> Self {
        let mut set = Self::default();
        for id in ids {
            set.insert(id);
        }
        set
    }

    fn insert(&mut self, id: String) -> bool {
        if !self.index.insert(id.clone()) {
            return false;
        }
        self.order.push(id);
        true
    }

    fn remove(&mut self, id: &str) -> bool {
        if !self.index.remove(id) {
            return false;
        }
        self.order.retain(|existing| existing != id);
        true
    }
}

/// Set of favorited product/seller ids kept in sync with storage and other
/// contexts. Persisted as a JSON array of strings.
pub struct FavoritesRegistry {
    key: String,
    store: PersistentStore,
    bus: Arc<ChangeBus>,
    favorites: Mutex<FavoriteSet>,
    watch: ExternalWatch,
}

impl FavoritesRegistry {
    /// Load the set stored under `key` and start watching other contexts.
    pub fn open(key: impl Into<String>, store: PersistentStore, bus: Arc<ChangeBus>) -> Self {
        let key = key.into();

        let watch = bus.watch(&key);
        let ids: Vec<String> = store.load_or_default(&key);
        let favorites = FavoriteSet::from_ids(ids);

        debug!(key = %key, count = favorites.order.len(), "favorites registry opened");

        Self {
            key,
            store,
            bus,
            favorites: Mutex::new(favorites),
            watch,
        }
    }

    /// Storage key of the set.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Flip membership of `id`. Returns whether it is a favorite afterwards.
    pub fn toggle(&self, id: &str) -> bool {
        let favorited = {
            let mut set = self.favorites.lock();
            if set.remove(id) {
                false
            } else {
                set.insert(id.to_string());
                true
            }
        };

        self.commit();
        favorited
    }

    /// Add `id`. Returns false if it was already a favorite.
    pub fn add(&self, id: &str) -> bool {
        if !self.favorites.lock().insert(id.to_string()) {
            return false;
        }

        self.commit();
        true
    }

    /// Remove `id`. Returns false if it was not a favorite.
    pub fn remove(&self, id: &str) -> bool {
        if !self.favorites.lock().remove(id) {
            return false;
        }

        self.commit();
        true
    }

    /// Remove every favorite. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let removed = {
            let mut set = self.favorites.lock();
            let removed = set.order.len();
            *set = FavoriteSet::default();
            removed
        };

        self.commit();
        removed
    }

    /// Whether `id` is a favorite.
    pub fn has(&self, id: &str) -> bool {
        self.favorites.lock().index.contains(id)
    }

    /// Snapshot in insertion order.
    pub fn list(&self) -> Vec<String> {
        self.favorites.lock().order.clone()
    }

    /// Number of favorites.
    pub fn len(&self) -> usize {
        self.favorites.lock().order.len()
    }

    /// True when nothing is favorited.
    pub fn is_empty(&self) -> bool {
        self.favorites.lock().order.is_empty()
    }

    /// Catch up with changes made by other contexts. Returns 1 if the local
    /// set changed, 0 otherwise.
    ///
    /// The value applied is re-read from storage; the signalled value is
    /// only a fallback when storage cannot be read.
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

    /// Replace the local set with a value written by another context.
    ///
    /// `None` (key removed) empties the set; a malformed payload is dropped.
    pub fn apply_external_change(&self, new_value: Option<&str>) -> bool {
        let incoming = match new_value {
            None => FavoriteSet::default(),
            Some(raw) => match serde_json::from_str::<Vec<String>>(raw) {
                Ok(ids) => FavoriteSet::from_ids(ids),
                Err(e) => {
                    warn!(key = %self.key, error = %e, "dropping malformed external favorites");
                    return false;
                }
            },
        };

        {
            let mut set = self.favorites.lock();
            if *set == incoming {
                return false;
            }
            *set = incoming;
        }

        debug!(key = %self.key, "applied external favorites");

        self.publish(ChangeOrigin::External);
        true
    }

    fn commit(&self) {
        self.publish(ChangeOrigin::Local);

        let set = self.favorites.lock();
        if let Some(raw) = self.store.save(&self.key, &set.order) {
            self.bus.broadcast(&self.key, Some(&raw));
        }
    }

    /// Publish the set as it is at delivery time.
    fn publish(&self, origin: ChangeOrigin) {
        self.bus.publish(&ChangeEvent::FavoritesChanged {
            favorites: self.list(),
            origin,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{LocalTransport, Topic};
    use crate::storage::{MemoryStorage, StorageBackend};
    use crate::types::ContextId;

    const KEY: &str = "favorites";

    fn registry_on(backend: Arc<MemoryStorage>) -> (Arc<ChangeBus>, FavoritesRegistry) {
        let bus = Arc::new(ChangeBus::new(
            ContextId::new(),
            Arc::new(LocalTransport::new()),
        ));
        let registry = FavoritesRegistry::open(KEY, PersistentStore::new(backend), Arc::clone(&bus));
        (bus, registry)
    }

    #[test]
    fn test_toggle() {
        let backend = Arc::new(MemoryStorage::new());
        let (_, registry) = registry_on(backend.clone());

        assert!(registry.toggle("lot-17"));
        assert!(registry.has("lot-17"));
        assert_eq!(backend.get(KEY).unwrap().as_deref(), Some("[\"lot-17\"]"));

        assert!(!registry.toggle("lot-17"));
        assert!(!registry.has("lot-17"));
        assert_eq!(backend.get(KEY).unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_add_remove_keep_order() {
        let (_, registry) = registry_on(Arc::new(MemoryStorage::new()));

        assert!(registry.add("b"));
        assert!(registry.add("a"));
        assert!(!registry.add("b"));
        assert_eq!(registry.list(), vec!["b".to_string(), "a".to_string()]);

        assert!(registry.remove("b"));
        assert!(!registry.remove("b"));
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.clear(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_load_drops_duplicates() {
        let backend = Arc::new(MemoryStorage::new());
        backend.set(KEY, "[\"x\",\"y\",\"x\"]").unwrap();

        let (_, registry) = registry_on(backend);
        assert_eq!(registry.list(), vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn test_corrupt_storage_loads_empty() {
        let backend = Arc::new(MemoryStorage::new());
        backend.set(KEY, "definitely not json").unwrap();

        let (_, registry) = registry_on(backend);
        assert!(registry.is_empty());
        assert!(!registry.has("definitely"));
    }

    #[test]
    fn test_toggle_publishes() {
        let (bus, registry) = registry_on(Arc::new(MemoryStorage::new()));
        let handle = bus.subscribe_channel(Topic::Favorites, 10);

        registry.toggle("seller-3");

        match handle.try_recv().unwrap() {
            ChangeEvent::FavoritesChanged { favorites, origin } => {
                assert_eq!(favorites, vec!["seller-3".to_string()]);
                assert_eq!(origin, ChangeOrigin::Local);
            }
            other => panic!("Expected FavoritesChanged, got {:?}", other),
        }
    }

    #[test]
    fn test_handler_mutation_is_reflected_in_last_event() {
        let backend = Arc::new(MemoryStorage::new());
        let (bus, registry) = registry_on(backend.clone());
        let registry = Arc::new(registry);
        let handle = bus.subscribe_channel(Topic::Favorites, 10);

        // Following a seller also follows their flagship lot
        let inner = Arc::clone(&registry);
        bus.subscribe(Topic::Favorites, move |event| {
            if let ChangeEvent::FavoritesChanged { favorites, .. } = event {
                if favorites.iter().any(|id| id == "seller-1") {
                    inner.add("lot-1");
                }
            }
        });

        registry.toggle("seller-1");

        let expected = vec!["seller-1".to_string(), "lot-1".to_string()];
        assert_eq!(registry.list(), expected);
        match handle.drain().pop().unwrap() {
            ChangeEvent::FavoritesChanged { favorites, .. } => assert_eq!(favorites, expected),
            other => panic!("Expected FavoritesChanged, got {:?}", other),
        }
        assert_eq!(
            backend.get(KEY).unwrap().as_deref(),
            Some("[\"seller-1\",\"lot-1\"]")
        );
    }

    #[test]
    fn test_external_change() {
        let (bus, registry) = registry_on(Arc::new(MemoryStorage::new()));
        registry.add("mine");
        let handle = bus.subscribe_channel(Topic::Favorites, 10);

        assert!(registry.apply_external_change(Some("[\"theirs\"]")));
        assert!(!registry.has("mine"));
        assert!(registry.has("theirs"));
        assert!(matches!(
            handle.try_recv().unwrap(),
            ChangeEvent::FavoritesChanged {
                origin: ChangeOrigin::External,
                ..
            }
        ));

        assert!(!registry.apply_external_change(Some("[\"theirs\"]")));
        assert!(!registry.apply_external_change(Some("{\"oops\":")));
        assert!(registry.has("theirs"));

        assert!(registry.apply_external_change(None));
        assert!(registry.is_empty());
    }
}
