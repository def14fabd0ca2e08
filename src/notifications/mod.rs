//! Notification list shared across contexts.
//!
//! [`NotificationRegistry`] owns the in-memory list, persists it after every
//! mutation and reconciles with writes made by other contexts. An optional
//! [`Alerter`] surfaces new notifications through the platform.

mod alert;
mod registry;

pub use alert::{AlertPermission, AlertRequest, Alerter, NoopAlerter};
pub use registry::NotificationRegistry;
