//! Client configuration.

/// Configuration for one context's [`ClientState`](crate::ClientState).
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Storage key holding the notification list.
    pub notifications_key: String,

    /// Storage key holding the favorites set.
    pub favorites_key: String,

    /// Buffered events for channel subscriptions before the subscriber is dropped.
    /// Default: 1000
    pub subscription_buffer_size: usize,

    /// Ask the platform for alert permission when the client opens.
    pub request_alert_permission: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            notifications_key: "notifications".to_string(),
            favorites_key: "favorites".to_string(),
            subscription_buffer_size: 1000,
            request_alert_permission: true,
        }
    }
}
