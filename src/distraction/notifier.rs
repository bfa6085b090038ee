use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NotificationHandle(pub String);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Deliver after this delay instead of immediately.
    pub delay: Option<Duration>,
}

impl Notification {
    pub fn first_warning(delay: Duration) -> Self {
        Self {
            title: "Eyes on the road".into(),
            body: "Come back to the app to keep earning points for this drive.".into(),
            delay: Some(delay),
        }
    }

    pub fn distracted() -> Self {
        Self {
            title: "You got distracted".into(),
            body: "You left the app while driving. This drive won't count toward your streak.".into(),
            delay: None,
        }
    }

    pub fn drive_ended() -> Self {
        Self {
            title: "Drive ended".into(),
            body: "You were away for too long, so we ended your drive.".into(),
            delay: None,
        }
    }
}

/// Local notification scheduler provided by the host. Fire and forget.
pub trait Notifier: Send + Sync {
    fn schedule(&self, notification: Notification) -> NotificationHandle;

    fn cancel(&self, handle: &NotificationHandle);
}
