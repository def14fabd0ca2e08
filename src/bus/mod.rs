//! Change bus for live state updates.
//!
//! Each context owns one [`ChangeBus`]. It provides:
//! - Synchronous local fan-out of [`ChangeEvent`]s by [`Topic`]
//! - Channel subscriptions with slow-subscriber dropping
//! - A bridge to other contexts through an injected [`ChangeTransport`]:
//!   [`LocalTransport`] within a process, [`PollingTransport`] across
//!   processes sharing storage
//!
//! # Example
//!
//! ```ignore
//! let transport = Arc::new(LocalTransport::new());
//! let bus = ChangeBus::new(ContextId::new(), transport);
//!
//! let id = bus.subscribe(Topic::Notifications, |event| {
//!     if let ChangeEvent::NotificationAdded { notification, .. } = event {
//!         println!("new: {}", notification.title);
//!     }
//! });
//!
//! bus.unsubscribe(id);
//! ```

mod manager;
mod polling;
mod transport;
mod types;

pub use manager::{ChangeBus, ChangeHandler};
pub use polling::PollingTransport;
pub use transport::{ChangeTransport, LocalTransport, DEFAULT_TRANSPORT_BUFFER};
pub use types::{
    ChangeEvent, ChangeOrigin, ExternalChange, ExternalWatch, SubscriptionHandle, SubscriptionId,
    Topic,
};
