use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::{
    distraction::Notifier,
    error::DriveError,
    models::{AppPhase, DriveSummary, SpeedSample},
    points::PointsLedger,
    speed_limit::SpeedLimitService,
    store::KeyValueStore,
};

/// Platform location stream. Dropping the receiver unsubscribes.
pub trait LocationSource: Send + Sync {
    fn subscribe(&self) -> Result<UnboundedReceiver<SpeedSample>, DriveError>;
}

/// Foreground/background transitions. Dropping the receiver unsubscribes.
pub trait AppLifecycle: Send + Sync {
    fn subscribe(&self) -> UnboundedReceiver<AppPhase>;
}

/// Told when a drive has been finalized, including when the engine ended it
/// on its own after a long background absence.
pub trait DriveObserver: Send + Sync {
    fn drive_completed(&self, summary: &DriveSummary);
}

/// Everything a drive session talks to outside the engine.
#[derive(Clone)]
pub struct DriveServices {
    pub store: Arc<dyn KeyValueStore>,
    pub speed_limits: Arc<dyn SpeedLimitService>,
    pub ledger: Arc<dyn PointsLedger>,
    pub notifier: Arc<dyn Notifier>,
    pub location: Arc<dyn LocationSource>,
    pub lifecycle: Arc<dyn AppLifecycle>,
    pub observer: Arc<dyn DriveObserver>,
}
