//! Client-side drive-session engine.
//!
//! A drive ingests location samples, resolves the local speed limit through a
//! grid-cell cache, awards points on a speed-dependent cadence and watches
//! app foreground/background transitions for distraction. Each drive is
//! finalized exactly once into the drive history and the streak.

pub mod config;
pub mod distraction;
pub mod drive;
pub mod error;
pub mod models;
pub mod points;
pub mod settings;
pub mod speed_limit;
pub mod store;
pub mod units;

pub use config::EngineConfig;
pub use drive::{
    AppLifecycle, DriveController, DriveObserver, DriveServices, DriveSnapshot, LocationSource,
};
pub use error::{DriveError, LookupError};
pub use models::{AppPhase, DriveRecord, DriveStatus, DriveSummary, SpeedSample};
pub use units::SpeedUnit;

/// Initializes `env_logger` from `RUST_LOG`, defaulting to `info`. Calling
/// it more than once is harmless.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
}
