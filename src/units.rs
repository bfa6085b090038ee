use serde::{Deserialize, Serialize};

const KPH_PER_MPH: f64 = 1.609344;
const MPH_PER_MPS: f64 = 2.236936;
const KPH_PER_MPS: f64 = 3.6;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SpeedUnit {
    Mph,
    Kph,
}

impl Default for SpeedUnit {
    fn default() -> Self {
        SpeedUnit::Mph
    }
}

impl SpeedUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeedUnit::Mph => "mph",
            SpeedUnit::Kph => "kph",
        }
    }

    /// Parses a unit label reported by a remote service. Anything outside the
    /// known set is rejected rather than guessed.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mph" => Some(SpeedUnit::Mph),
            "kph" | "km/h" | "kmh" => Some(SpeedUnit::Kph),
            _ => None,
        }
    }

    /// Speed below which a sample is treated as "not actually driving".
    pub fn moving_threshold(&self) -> f64 {
        match self {
            SpeedUnit::Mph => 10.0,
            SpeedUnit::Kph => 16.0934,
        }
    }

    /// Jurisdiction default used until a limit has been resolved this session.
    pub fn default_limit(&self) -> f64 {
        match self {
            SpeedUnit::Mph => 25.0,
            SpeedUnit::Kph => 40.234,
        }
    }

    pub fn from_meters_per_second(&self, mps: f64) -> f64 {
        let mps = if mps.is_finite() { mps.max(0.0) } else { 0.0 };
        match self {
            SpeedUnit::Mph => mps * MPH_PER_MPS,
            SpeedUnit::Kph => mps * KPH_PER_MPS,
        }
    }
}

pub fn convert(value: f64, from: SpeedUnit, to: SpeedUnit) -> f64 {
    match (from, to) {
        (SpeedUnit::Mph, SpeedUnit::Kph) => value * KPH_PER_MPH,
        (SpeedUnit::Kph, SpeedUnit::Mph) => value / KPH_PER_MPH,
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_known_labels_only() {
        assert_eq!(SpeedUnit::parse("MPH"), Some(SpeedUnit::Mph));
        assert_eq!(SpeedUnit::parse(" kph "), Some(SpeedUnit::Kph));
        assert_eq!(SpeedUnit::parse("km/h"), Some(SpeedUnit::Kph));
        assert_eq!(SpeedUnit::parse("knots"), None);
        assert_eq!(SpeedUnit::parse(""), None);
    }

    #[test]
    fn converts_between_units() {
        assert!((convert(50.0, SpeedUnit::Mph, SpeedUnit::Kph) - 80.4672).abs() < 1e-9);
        assert!((convert(100.0, SpeedUnit::Kph, SpeedUnit::Mph) - 62.137_119).abs() < 1e-5);
        assert_eq!(convert(42.0, SpeedUnit::Kph, SpeedUnit::Kph), 42.0);
    }

    #[test]
    fn raw_speed_clamps_invalid_readings() {
        assert_eq!(SpeedUnit::Mph.from_meters_per_second(-1.0), 0.0);
        assert_eq!(SpeedUnit::Kph.from_meters_per_second(f64::NAN), 0.0);
        assert!((SpeedUnit::Kph.from_meters_per_second(10.0) - 36.0).abs() < 1e-9);
    }
}
