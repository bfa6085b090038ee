pub mod controller;
pub mod finalize;
mod loop_worker;
pub mod sources;
pub mod state;

pub use controller::DriveController;
pub use sources::{AppLifecycle, DriveObserver, DriveServices, LocationSource};
pub use state::{DriveSnapshot, DriveState};
