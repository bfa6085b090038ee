use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    models::{ActiveDriveMarker, SpeedSample},
    units::SpeedUnit,
};

/// Fields a UI binds to.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriveSnapshot {
    pub session_id: Option<String>,
    pub current_speed: f64,
    pub current_speed_limit: f64,
    pub points_this_drive: u64,
    pub is_speeding: bool,
    pub is_distracted: bool,
    pub is_finalized: bool,
    pub unit: SpeedUnit,
}

#[derive(Debug, Clone)]
pub struct DriveState {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    /// `None` when the ledger could not be read at start.
    pub starting_points: Option<u64>,
    pub points_this_drive: u64,
    pub current_speed: f64,
    /// Last resolved limit; kept when later lookups fail.
    pub current_speed_limit: Option<f64>,
    pub unit: SpeedUnit,
    pub is_distracted: bool,
    pub is_finalized: bool,
    last_sample_ms: Option<i64>,
}

impl DriveState {
    /// Fresh state for a new drive. Nothing carries over from an earlier one.
    pub fn begin(
        session_id: String,
        started_at: DateTime<Utc>,
        starting_points: Option<u64>,
        unit: SpeedUnit,
    ) -> Self {
        Self {
            session_id,
            started_at,
            starting_points,
            points_this_drive: 0,
            current_speed: 0.0,
            current_speed_limit: None,
            unit,
            is_distracted: false,
            is_finalized: false,
            last_sample_ms: None,
        }
    }

    pub fn effective_limit(&self) -> f64 {
        self.current_speed_limit
            .unwrap_or_else(|| self.unit.default_limit())
    }

    pub fn is_speeding(&self) -> bool {
        self.current_speed > self.effective_limit()
    }

    /// Rejects samples with unusable coordinates or older than the last one
    /// accepted.
    pub fn accept_sample(&mut self, sample: &SpeedSample) -> bool {
        if !sample.has_valid_position() {
            return false;
        }
        if matches!(self.last_sample_ms, Some(last) if sample.timestamp_ms < last) {
            return false;
        }
        self.last_sample_ms = Some(sample.timestamp_ms);
        true
    }

    pub fn snapshot(&self) -> DriveSnapshot {
        DriveSnapshot {
            session_id: Some(self.session_id.clone()),
            current_speed: self.current_speed,
            current_speed_limit: self.effective_limit(),
            points_this_drive: self.points_this_drive,
            is_speeding: self.is_speeding(),
            is_distracted: self.is_distracted,
            is_finalized: self.is_finalized,
            unit: self.unit,
        }
    }

    pub fn marker(&self, now: DateTime<Utc>) -> ActiveDriveMarker {
        ActiveDriveMarker {
            id: self.session_id.clone(),
            started_at: self.started_at,
            starting_points: self.starting_points.unwrap_or(0),
            points_this_drive: self.points_this_drive,
            is_distracted: self.is_distracted,
            updated_at: now,
        }
    }
}
