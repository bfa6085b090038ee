use std::{sync::Arc, time::Duration};

use log::{debug, info, warn};
use tokio::time::Instant;

use crate::{
    error::LookupError,
    models::SpeedSample,
    store::BoxFuture,
    units::{self, SpeedUnit},
};

use super::{GridCache, SpeedLimitReport, SpeedLimitService};

/// A remote lookup detached from the resolver, so the drive loop can keep
/// handling events while it is in flight.
pub type PendingLookup = BoxFuture<'static, LookupOutcome>;

#[derive(Debug)]
pub struct LookupOutcome {
    pub latitude: f64,
    pub longitude: f64,
    /// Already converted into the unit the lookup was started with.
    pub result: Result<f64, LookupError>,
    unit: SpeedUnit,
}

/// Looks up the speed limit for the current position, preferring the grid
/// cache and rate-limiting remote calls globally (not per cell).
pub struct SpeedLimitResolver {
    service: Arc<dyn SpeedLimitService>,
    cache: GridCache,
    min_interval: Duration,
    timeout: Duration,
    last_lookup_at: Option<Instant>,
}

impl SpeedLimitResolver {
    pub fn new(
        service: Arc<dyn SpeedLimitService>,
        cache: GridCache,
        min_interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            service,
            cache,
            min_interval,
            timeout,
            last_lookup_at: None,
        }
    }

    pub fn cache(&self) -> &GridCache {
        &self.cache
    }

    /// Cached limit for the sample's cell, expressed in `unit`.
    pub fn cached_limit(&self, sample: &SpeedSample, unit: SpeedUnit) -> Option<f64> {
        self.cache
            .get(sample.latitude, sample.longitude)
            .map(|entry| units::convert(entry.value, entry.unit, unit))
    }

    /// True when every precondition for a remote call holds: no cache entry,
    /// speed above the moving threshold, and the global interval has elapsed.
    pub fn should_lookup(
        &self,
        sample: &SpeedSample,
        speed: f64,
        unit: SpeedUnit,
        now: Instant,
    ) -> bool {
        if self.cached_limit(sample, unit).is_some() {
            return false;
        }
        if speed <= unit.moving_threshold() {
            return false;
        }
        match self.last_lookup_at {
            Some(last) => now.saturating_duration_since(last) >= self.min_interval,
            None => true,
        }
    }

    /// Starts a remote lookup if the trigger policy allows one. The rate
    /// limit window starts now, whatever the outcome.
    pub fn begin_lookup(
        &mut self,
        sample: &SpeedSample,
        speed: f64,
        unit: SpeedUnit,
    ) -> Option<PendingLookup> {
        let now = Instant::now();
        if !self.should_lookup(sample, speed, unit, now) {
            return None;
        }
        self.last_lookup_at = Some(now);

        let service = self.service.clone();
        let timeout = self.timeout;
        let (latitude, longitude) = (sample.latitude, sample.longitude);
        debug!("Requesting speed limit for ({latitude:.5}, {longitude:.5})");

        Some(Box::pin(async move {
            let result = match tokio::time::timeout(timeout, service.lookup(latitude, longitude)).await
            {
                Ok(Ok(Some(report))) => convert_report(&report, unit),
                Ok(Ok(None)) => Err(LookupError::MissingField("maxSpeed")),
                Ok(Err(err)) => Err(err),
                Err(_) => Err(LookupError::Timeout(timeout.as_millis() as u64)),
            };
            LookupOutcome {
                latitude,
                longitude,
                result,
                unit,
            }
        }))
    }

    /// Applies a finished lookup: caches a good value and returns it, or logs
    /// the failure and returns `None` so callers keep their previous limit.
    pub async fn complete_lookup(&mut self, outcome: LookupOutcome) -> Option<f64> {
        let LookupOutcome {
            latitude,
            longitude,
            result,
            unit,
        } = outcome;

        match result {
            Ok(limit) => {
                info!(
                    "Resolved speed limit {:.1} {} at ({:.5}, {:.5})",
                    limit,
                    unit.as_str(),
                    latitude,
                    longitude
                );
                if let Err(err) = self.cache.put(latitude, longitude, limit, unit).await {
                    warn!("Speed limit cached in memory only: {err:#}");
                }
                Some(limit)
            }
            Err(err) => {
                warn!("Speed limit lookup failed: {err}");
                None
            }
        }
    }

    /// Cached value, or a lookup awaited in place. `None` when nothing is
    /// cached and no lookup was made or it failed.
    pub async fn resolve(&mut self, sample: &SpeedSample, speed: f64, unit: SpeedUnit) -> Option<f64> {
        if let Some(limit) = self.cached_limit(sample, unit) {
            return Some(limit);
        }
        let pending = self.begin_lookup(sample, speed, unit)?;
        let outcome = pending.await;
        self.complete_lookup(outcome).await
    }
}

/// Validates a remote report and converts it into the session unit.
pub(crate) fn convert_report(report: &SpeedLimitReport, unit: SpeedUnit) -> Result<f64, LookupError> {
    let value = report
        .max_speed
        .ok_or(LookupError::MissingField("maxSpeed"))?;
    if !value.is_finite() || value <= 0.0 {
        return Err(LookupError::InvalidValue(value));
    }

    let label = report
        .speed_unit
        .as_deref()
        .ok_or(LookupError::MissingField("speedUnit"))?;
    let source = SpeedUnit::parse(label).ok_or_else(|| LookupError::UnknownUnit(label.to_string()))?;

    Ok(units::convert(value, source, unit))
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use super::*;
    use crate::{store::BoxFuture, store::MemoryStore};

    struct ScriptedService {
        calls: AtomicUsize,
        responses: Mutex<Vec<Result<Option<SpeedLimitReport>, LookupError>>>,
    }

    impl ScriptedService {
        fn new(responses: Vec<Result<Option<SpeedLimitReport>, LookupError>>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                responses: Mutex::new(responses),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl SpeedLimitService for ScriptedService {
        fn lookup(
            &self,
            _latitude: f64,
            _longitude: f64,
        ) -> BoxFuture<'_, Result<Option<SpeedLimitReport>, LookupError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = {
                let mut responses = self.responses.lock().unwrap();
                if responses.is_empty() {
                    Ok(None)
                } else {
                    responses.remove(0)
                }
            };
            Box::pin(async move { next })
        }
    }

    fn report(value: f64, unit: &str) -> Result<Option<SpeedLimitReport>, LookupError> {
        Ok(Some(SpeedLimitReport {
            max_speed: Some(value),
            speed_unit: Some(unit.to_string()),
        }))
    }

    fn sample(latitude: f64, longitude: f64) -> SpeedSample {
        SpeedSample {
            timestamp_ms: 0,
            raw_speed: 20.0,
            latitude,
            longitude,
        }
    }

    fn resolver(service: Arc<ScriptedService>) -> SpeedLimitResolver {
        let cache = GridCache::empty(Arc::new(MemoryStore::new()), 0.002);
        SpeedLimitResolver::new(
            service,
            cache,
            Duration::from_millis(10_000),
            Duration::from_millis(5_000),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn converts_remote_kph_into_session_mph_and_caches() {
        let service = ScriptedService::new(vec![report(100.0, "kph")]);
        let mut resolver = resolver(service.clone());

        let limit = resolver
            .resolve(&sample(48.85, 2.35), 40.0, SpeedUnit::Mph)
            .await
            .unwrap();
        assert!((limit - 62.137).abs() < 0.01);

        // Second sample in the same cell is served from the cache.
        let again = resolver
            .resolve(&sample(48.8501, 2.3501), 40.0, SpeedUnit::Mph)
            .await;
        assert_eq!(again, Some(limit));
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_samples_never_trigger_lookup() {
        let service = ScriptedService::new(vec![report(30.0, "mph")]);
        let mut resolver = resolver(service.clone());

        assert_eq!(resolver.resolve(&sample(1.0, 1.0), 10.0, SpeedUnit::Mph).await, None);
        assert_eq!(resolver.resolve(&sample(1.0, 1.0), 16.0, SpeedUnit::Kph).await, None);
        assert_eq!(service.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn lookups_are_globally_rate_limited() {
        let service = ScriptedService::new(vec![
            Err(LookupError::Transport("offline".into())),
            report(45.0, "mph"),
            report(50.0, "mph"),
        ]);
        let mut resolver = resolver(service.clone());

        assert_eq!(resolver.resolve(&sample(10.0, 10.0), 30.0, SpeedUnit::Mph).await, None);
        // Different cell, but still inside the global window.
        tokio::time::advance(Duration::from_millis(9_999)).await;
        assert_eq!(resolver.resolve(&sample(11.0, 11.0), 30.0, SpeedUnit::Mph).await, None);
        assert_eq!(service.calls(), 1);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(
            resolver.resolve(&sample(11.0, 11.0), 30.0, SpeedUnit::Mph).await,
            Some(45.0)
        );
        assert_eq!(service.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_unit_is_a_failed_resolution() {
        let service = ScriptedService::new(vec![report(30.0, "knots")]);
        let mut resolver = resolver(service);

        assert_eq!(resolver.resolve(&sample(5.0, 5.0), 30.0, SpeedUnit::Mph).await, None);
        assert!(resolver.cache().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn detached_lookup_is_applied_when_it_finishes() {
        let service = ScriptedService::new(vec![report(35.0, "mph")]);
        let mut resolver = resolver(service.clone());
        let here = sample(20.0, 20.0);

        let pending = resolver.begin_lookup(&here, 30.0, SpeedUnit::Mph).unwrap();
        // window already consumed while the call is in flight
        assert!(resolver.begin_lookup(&here, 30.0, SpeedUnit::Mph).is_none());
        assert!(resolver.cache().is_empty());

        let outcome = pending.await;
        assert_eq!(resolver.complete_lookup(outcome).await, Some(35.0));
        assert_eq!(resolver.cached_limit(&here, SpeedUnit::Mph), Some(35.0));
        assert_eq!(service.calls(), 1);
    }

    #[test]
    fn report_validation() {
        let missing_unit = SpeedLimitReport {
            max_speed: Some(30.0),
            speed_unit: None,
        };
        assert!(matches!(
            convert_report(&missing_unit, SpeedUnit::Mph),
            Err(LookupError::MissingField("speedUnit"))
        ));

        let negative = SpeedLimitReport {
            max_speed: Some(-5.0),
            speed_unit: Some("mph".into()),
        };
        assert!(matches!(
            convert_report(&negative, SpeedUnit::Mph),
            Err(LookupError::InvalidValue(_))
        ));

        let ok = SpeedLimitReport {
            max_speed: Some(55.0),
            speed_unit: Some("mph".into()),
        };
        assert_eq!(convert_report(&ok, SpeedUnit::Mph).unwrap(), 55.0);
    }
}
