use std::time::Duration;

use tokio::time::Instant;

use crate::config::EngineConfig;

pub const BASE_DELAY: Duration = Duration::from_millis(100);
pub const PENALTY_SCALE: Duration = Duration::from_millis(2_000);
const MAX_PENALTY_RATIO: f64 = 2.0;
const SEVERE_SPEEDING_RATIO: f64 = 1.5;
const SPEEDING_PAUSE: Duration = Duration::from_secs(3_600);

/// Timing policy for point accrual, kept free of any session state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointPolicy {
    pub base_delay: Duration,
    pub penalty_scale: Duration,
    pub max_penalty_ratio: f64,
    pub severe_speeding_ratio: f64,
    pub speeding_pause: Duration,
}

impl Default for PointPolicy {
    fn default() -> Self {
        Self {
            base_delay: BASE_DELAY,
            penalty_scale: PENALTY_SCALE,
            max_penalty_ratio: MAX_PENALTY_RATIO,
            severe_speeding_ratio: SEVERE_SPEEDING_RATIO,
            speeding_pause: SPEEDING_PAUSE,
        }
    }
}

impl PointPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            penalty_scale: Duration::from_millis(config.penalty_scale_ms),
            max_penalty_ratio: config.max_penalty_ratio,
            severe_speeding_ratio: config.severe_speeding_ratio,
            speeding_pause: Duration::from_millis(config.speeding_pause_ms),
        }
    }

    pub fn is_severe_speeding(&self, speed: f64, limit: f64) -> bool {
        limit > 0.0 && speed > limit * self.severe_speeding_ratio
    }

    /// Delay until the next tick. Grows linearly with how far over the limit
    /// the driver is, and jumps to the pause delay past the severe ratio.
    pub fn delay_for(&self, speed: f64, limit: f64) -> Duration {
        if !(limit > 0.0) || speed <= limit {
            return self.base_delay;
        }
        if self.is_severe_speeding(speed, limit) {
            return self.speeding_pause;
        }

        let ratio = ((speed - limit) / limit).min(self.max_penalty_ratio);
        self.base_delay + self.penalty_scale.mul_f64(ratio)
    }
}

pub fn compute_delay(speed: f64, limit: f64) -> Duration {
    PointPolicy::default().delay_for(speed, limit)
}

/// Single self-rescheduling deadline. The drive loop sleeps until
/// `deadline()` and calls `on_tick`, which re-reads speed and limit and arms
/// the next deadline.
#[derive(Debug)]
pub struct PointScheduler {
    policy: PointPolicy,
    next_tick: Option<Instant>,
    paused: bool,
}

impl PointScheduler {
    pub fn new(policy: PointPolicy) -> Self {
        Self {
            policy,
            next_tick: None,
            paused: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.next_tick
    }

    /// No-op when already running.
    pub fn start(&mut self, now: Instant, speed: f64, limit: f64) -> bool {
        if self.is_running() {
            return false;
        }
        self.arm(now, speed, limit);
        true
    }

    /// No-op when not running.
    pub fn stop(&mut self) -> bool {
        self.paused = false;
        self.next_tick.take().is_some()
    }

    /// Handles a fired deadline. Returns whether a point is earned for the
    /// interval that just elapsed.
    pub fn on_tick(&mut self, now: Instant, speed: f64, limit: f64, moving_threshold: f64) -> bool {
        if !self.is_running() {
            return false;
        }
        let earned = speed > moving_threshold;
        self.arm(now, speed, limit);
        earned
    }

    /// Re-arms a speeding pause as soon as speed is back under the severe
    /// ratio. Other deadlines are left alone.
    pub fn on_speed_update(&mut self, now: Instant, speed: f64, limit: f64) -> bool {
        if !self.is_running() || !self.paused || self.policy.is_severe_speeding(speed, limit) {
            return false;
        }
        self.arm(now, speed, limit);
        true
    }

    fn arm(&mut self, now: Instant, speed: f64, limit: f64) {
        self.paused = self.policy.is_severe_speeding(speed, limit);
        self.next_tick = Some(now + self.policy.delay_for(speed, limit));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_or_under_limit_is_base_delay() {
        assert_eq!(compute_delay(0.0, 25.0), BASE_DELAY);
        assert_eq!(compute_delay(24.9, 25.0), BASE_DELAY);
        assert_eq!(compute_delay(25.0, 25.0), BASE_DELAY);
    }

    #[test]
    fn speeding_grows_linearly() {
        // 10% over: 100 + 0.1 * 2000
        assert_eq!(compute_delay(44.0, 40.0), Duration::from_millis(300));
        // exactly 1.5x is still the linear branch
        assert_eq!(compute_delay(60.0, 40.0), Duration::from_millis(1_100));
    }

    #[test]
    fn severe_speeding_pauses_instead_of_failing() {
        assert_eq!(compute_delay(60.5, 40.0), SPEEDING_PAUSE);
        assert_eq!(compute_delay(500.0, 40.0), SPEEDING_PAUSE);
    }

    #[test]
    fn ratio_cap_applies_when_severe_threshold_is_raised() {
        let policy = PointPolicy {
            severe_speeding_ratio: 10.0,
            ..PointPolicy::default()
        };
        assert_eq!(policy.delay_for(200.0, 40.0), Duration::from_millis(4_100));
    }

    #[test]
    fn degenerate_limit_falls_back_to_base() {
        assert_eq!(compute_delay(50.0, 0.0), BASE_DELAY);
        assert_eq!(compute_delay(50.0, f64::NAN), BASE_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn start_and_stop_are_idempotent() {
        let mut scheduler = PointScheduler::new(PointPolicy::default());
        let now = Instant::now();

        assert!(!scheduler.stop());
        assert!(scheduler.start(now, 20.0, 25.0));
        let first = scheduler.deadline();
        assert!(!scheduler.start(now + Duration::from_millis(50), 20.0, 25.0));
        assert_eq!(scheduler.deadline(), first);

        assert!(scheduler.stop());
        assert!(!scheduler.stop());
        assert!(!scheduler.on_tick(now, 20.0, 25.0, 10.0));
        assert_eq!(scheduler.deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn stationary_ticks_earn_nothing_but_keep_rescheduling() {
        let mut scheduler = PointScheduler::new(PointPolicy::default());
        let now = Instant::now();
        scheduler.start(now, 0.0, 25.0);

        let fired = now + BASE_DELAY;
        assert!(!scheduler.on_tick(fired, 5.0, 25.0, 10.0));
        assert_eq!(scheduler.deadline(), Some(fired + BASE_DELAY));

        assert!(scheduler.on_tick(fired + BASE_DELAY, 20.0, 25.0, 10.0));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_is_lifted_by_a_normal_speed_sample() {
        let mut scheduler = PointScheduler::new(PointPolicy::default());
        let now = Instant::now();
        scheduler.start(now, 80.0, 40.0);
        assert!(scheduler.is_paused());
        assert_eq!(scheduler.deadline(), Some(now + SPEEDING_PAUSE));

        // still severe: nothing changes
        let later = now + Duration::from_secs(3);
        assert!(!scheduler.on_speed_update(later, 70.0, 40.0));

        assert!(scheduler.on_speed_update(later, 35.0, 40.0));
        assert!(!scheduler.is_paused());
        assert_eq!(scheduler.deadline(), Some(later + BASE_DELAY));
    }
}
