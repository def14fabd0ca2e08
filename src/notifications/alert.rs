//! Platform alerts shown when a notification arrives.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Permission state for user-visible platform alerts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPermission {
    /// The user has not been asked yet.
    Default,
    Granted,
    Denied,
}

/// What a platform alert displays.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertRequest {
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
}

/// Native alert facility of the hosting platform.
///
/// Nothing here affects registry correctness: a failed request or `show`
/// is logged and ignored by the caller.
pub trait Alerter: Send + Sync {
    /// Current permission state.
    fn permission(&self) -> AlertPermission;

    /// Ask the user for permission and return the resulting state.
    fn request_permission(&self) -> AlertPermission;

    /// Display an alert.
    fn show(&self, alert: &AlertRequest) -> Result<()>;
}

/// Alerter for platforms without native alerts. Always denied.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAlerter;

impl Alerter for NoopAlerter {
    fn permission(&self) -> AlertPermission {
        AlertPermission::Denied
    }

    fn request_permission(&self) -> AlertPermission {
        AlertPermission::Denied
    }

    fn show(&self, _alert: &AlertRequest) -> Result<()> {
        Ok(())
    }
}
