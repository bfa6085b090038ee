mod detector;
mod notifier;

pub use detector::{DistractionDetector, DistractionOutcome, DistractionPolicy, FocusState};
pub use notifier::{Notification, NotificationHandle, Notifier};
