mod drive;
mod sample;

pub use drive::{ActiveDriveMarker, DriveRecord, DriveStatus, DriveSummary};
pub use sample::{AppPhase, SpeedSample};
