use serde::{Deserialize, Serialize};

/// One reading from the location stream. Speed is in metres per second as
/// reported by the platform; negative values mean "unknown".
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpeedSample {
    pub timestamp_ms: i64,
    pub raw_speed: f64,
    pub latitude: f64,
    pub longitude: f64,
}

impl SpeedSample {
    pub fn has_valid_position(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AppPhase {
    Foreground,
    Background,
}
