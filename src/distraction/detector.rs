use std::{mem, sync::Arc, time::Duration};

use log::{debug, info};
use tokio::time::Instant;

use crate::config::EngineConfig;

use super::{Notification, NotificationHandle, Notifier};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistractionPolicy {
    /// Background time at or under this is a forgivable context switch
    pub grace: Duration,
    /// Background time that ends the drive outright
    pub timeout: Duration,
    pub first_warning_delay: Duration,
}

impl Default for DistractionPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl DistractionPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            grace: config.background_grace(),
            timeout: config.background_timeout(),
            first_warning_delay: config.first_warning_delay(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FocusState {
    Focused,
    BackgroundPending {
        entered_at: Instant,
        warning: Option<NotificationHandle>,
    },
    /// Terminal for the session.
    Distracted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistractionOutcome {
    Unchanged,
    WindowOpened,
    Forgiven,
    Distracted,
    /// Backgrounded past the timeout: the session must be finalized.
    DriveEnded,
}

/// Foreground/background watcher. Notifications are scheduled and
/// cancelled as transitions happen.
pub struct DistractionDetector {
    policy: DistractionPolicy,
    notifier: Arc<dyn Notifier>,
    notifications_enabled: bool,
    state: FocusState,
}

impl DistractionDetector {
    pub fn new(
        policy: DistractionPolicy,
        notifier: Arc<dyn Notifier>,
        notifications_enabled: bool,
    ) -> Self {
        Self {
            policy,
            notifier,
            notifications_enabled,
            state: FocusState::Focused,
        }
    }

    pub fn state(&self) -> &FocusState {
        &self.state
    }

    pub fn is_distracted(&self) -> bool {
        self.state == FocusState::Distracted
    }

    pub fn timeout_deadline(&self) -> Option<Instant> {
        match &self.state {
            FocusState::BackgroundPending { entered_at, .. } => Some(*entered_at + self.policy.timeout),
            _ => None,
        }
    }

    /// Opens a distraction window, but only while points are being earned.
    pub fn on_background(&mut self, now: Instant, points_this_drive: u64) -> DistractionOutcome {
        if self.state != FocusState::Focused || points_this_drive == 0 {
            return DistractionOutcome::Unchanged;
        }

        let warning = self.notifications_enabled.then(|| {
            self.notifier
                .schedule(Notification::first_warning(self.policy.first_warning_delay))
        });
        debug!("App backgrounded with {points_this_drive} points; distraction window open");
        self.state = FocusState::BackgroundPending {
            entered_at: now,
            warning,
        };
        DistractionOutcome::WindowOpened
    }

    pub fn on_foreground(&mut self, now: Instant) -> DistractionOutcome {
        let (entered_at, warning) = match mem::replace(&mut self.state, FocusState::Focused) {
            FocusState::BackgroundPending {
                entered_at,
                warning,
            } => (entered_at, warning),
            other => {
                self.state = other;
                return DistractionOutcome::Unchanged;
            }
        };

        self.cancel_warning(warning);
        let away = now.saturating_duration_since(entered_at);
        if away <= self.policy.grace {
            debug!("Back after {}ms; forgiven", away.as_millis());
            return DistractionOutcome::Forgiven;
        }

        info!("Back after {}ms; marking drive as distracted", away.as_millis());
        self.state = FocusState::Distracted;
        if self.notifications_enabled {
            self.notifier.schedule(Notification::distracted());
        }
        DistractionOutcome::Distracted
    }

    /// Fires when the absolute background timeout elapses while still away.
    pub fn on_timeout(&mut self, now: Instant) -> DistractionOutcome {
        match self.timeout_deadline() {
            Some(deadline) if now >= deadline => {}
            _ => return DistractionOutcome::Unchanged,
        }

        if let FocusState::BackgroundPending { warning, .. } =
            mem::replace(&mut self.state, FocusState::Distracted)
        {
            self.cancel_warning(warning);
        }
        info!("Background timeout reached; ending drive");
        self.notifier.schedule(Notification::drive_ended());
        DistractionOutcome::DriveEnded
    }

    /// Drops any open window without judging it. Used on session teardown.
    pub fn close(&mut self) {
        if let FocusState::BackgroundPending { warning, .. } =
            mem::replace(&mut self.state, FocusState::Focused)
        {
            self.cancel_warning(warning);
        }
    }

    fn cancel_warning(&self, warning: Option<NotificationHandle>) {
        if let Some(handle) = warning {
            self.notifier.cancel(&handle);
        }
    }
}
