mod grid;
mod http;
mod resolver;

use serde::Deserialize;

pub use grid::{CachedSpeedLimit, GridCache, GridKey};
pub use http::HttpSpeedLimitService;
pub use resolver::{LookupOutcome, PendingLookup, SpeedLimitResolver};

use crate::{error::LookupError, store::BoxFuture};

/// Raw answer from a speed-limit lookup. Fields are optional because the
/// remote side is not trusted to send both.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpeedLimitReport {
    pub max_speed: Option<f64>,
    pub speed_unit: Option<String>,
}

pub trait SpeedLimitService: Send + Sync {
    /// `Ok(None)` means the service has no limit for this position.
    fn lookup(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> BoxFuture<'_, Result<Option<SpeedLimitReport>, LookupError>>;
}
