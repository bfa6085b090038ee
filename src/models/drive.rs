use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DriveStatus {
    /// Ended by the driver
    Completed,
    /// Ended because the app stayed in the background too long
    TimedOut,
    /// Found unfinished at the next start, e.g. after a crash
    Interrupted,
}

impl DriveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriveStatus::Completed => "Completed",
            DriveStatus::TimedOut => "TimedOut",
            DriveStatus::Interrupted => "Interrupted",
        }
    }
}

/// Entry in the persisted drive history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriveRecord {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub starting_points: u64,
    pub points_earned: u64,
    pub was_distracted: bool,
    pub status: DriveStatus,
    /// Streak after this drive was applied; `None` if it was not touched.
    pub streak_after: Option<u32>,
}

/// What the host receives when a drive finishes.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriveSummary {
    pub record: DriveRecord,
    pub total_points: u64,
}

/// Written while a drive is running so an unfinished drive can be recovered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveDriveMarker {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub starting_points: u64,
    pub points_this_drive: u64,
    pub is_distracted: bool,
    pub updated_at: DateTime<Utc>,
}

impl ActiveDriveMarker {
    pub fn into_interrupted_record(self, ended_at: DateTime<Utc>) -> DriveRecord {
        DriveRecord {
            id: self.id,
            started_at: self.started_at,
            ended_at,
            starting_points: self.starting_points,
            points_earned: self.points_this_drive,
            was_distracted: self.is_distracted,
            status: DriveStatus::Interrupted,
            streak_after: None,
        }
    }
}
