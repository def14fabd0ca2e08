//! # Market State
//!
//! Client-side state synchronization for the marketplace dashboards. Keeps a
//! notification list and a favorites set consistent across every open
//! context (tab, window or process) without a server round-trip.
//!
//! ## Core Concepts
//!
//! - **Storage**: Shared key-value backend, wrapped by a JSON store that never fails
//! - **Bus**: Local publish/subscribe plus a transport carrying writes to other
//!   contexts (pushed within a process, polled from shared storage across processes)
//! - **Registries**: Notifications and favorites, persisted after every mutation
//! - **Client**: One service object per context wiring it all together
//!
//! ## Example
//!
//! ```ignore
//! use marketstate::{ClientConfig, ClientState, LocalTransport, MemoryStorage, NoopAlerter};
//!
//! let storage = Arc::new(MemoryStorage::new());
//! let transport = Arc::new(LocalTransport::new());
//!
//! let tab_a = ClientState::open(ClientConfig::default(), storage.clone(), transport.clone(), Arc::new(NoopAlerter));
//! let tab_b = ClientState::open(ClientConfig::default(), storage, transport, Arc::new(NoopAlerter));
//!
//! tab_a.notifications().add(NewNotification::new(
//!     NotificationType::System,
//!     "Maintenance",
//!     "down at 2am",
//! ));
//!
//! tab_b.sync();
//! assert_eq!(tab_b.notifications().unread_count(), 1);
//! ```

pub mod bus;
pub mod client;
pub mod config;
pub mod error;
pub mod favorites;
pub mod notifications;
pub mod storage;
pub mod types;

// Re-exports
pub use bus::{
    ChangeBus, ChangeEvent, ChangeHandler, ChangeOrigin, ChangeTransport, ExternalChange,
    ExternalWatch, LocalTransport, PollingTransport, SubscriptionHandle, SubscriptionId, Topic,
};
pub use client::ClientState;
pub use config::ClientConfig;
pub use error::{Result, SyncError};
pub use favorites::FavoritesRegistry;
pub use notifications::{
    AlertPermission, AlertRequest, Alerter, NoopAlerter, NotificationRegistry,
};
pub use storage::{FileStorage, MemoryStorage, PersistentStore, StorageBackend};
pub use types::*;
