use thiserror::Error;

/// Failures a host app is expected to react to. Everything else the engine
/// logs and absorbs.
#[derive(Debug, Error)]
pub enum DriveError {
    #[error("location permission denied")]
    LocationPermissionDenied,

    #[error("a drive session is already active")]
    SessionActive,
}

/// Reasons a speed-limit lookup produced no usable value.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("speed limit request failed: {0}")]
    Transport(String),

    #[error("speed limit service returned status {0}")]
    Status(u16),

    #[error("speed limit response missing {0}")]
    MissingField(&'static str),

    #[error("unknown speed unit '{0}'")]
    UnknownUnit(String),

    #[error("invalid speed limit value {0}")]
    InvalidValue(f64),

    #[error("speed limit lookup timed out after {0}ms")]
    Timeout(u64),
}
