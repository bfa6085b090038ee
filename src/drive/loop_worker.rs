use std::sync::{Arc, Mutex};

use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::{
    sync::{
        mpsc::{Receiver, UnboundedReceiver},
        oneshot, watch,
    },
    time::{sleep_until, Instant},
};
use tokio_util::sync::CancellationToken;

use crate::{
    distraction::{DistractionDetector, DistractionOutcome},
    models::{AppPhase, DriveRecord, DriveStatus, DriveSummary, SpeedSample},
    points::PointScheduler,
    speed_limit::{LookupOutcome, PendingLookup, SpeedLimitResolver},
    store::ACTIVE_DRIVE_KEY,
};

use super::{
    finalize::{append_history, update_streak, write_completion_flags, write_marker},
    sources::DriveServices,
    state::{DriveSnapshot, DriveState},
};

pub(crate) enum DriveCommand {
    Finalize(oneshot::Sender<Option<DriveSummary>>),
    Snapshot(oneshot::Sender<DriveSnapshot>),
}

/// All mutable state of one drive. Only the drive loop touches it.
pub(crate) struct DriveWorker {
    pub(crate) state: DriveState,
    pub(crate) resolver: SpeedLimitResolver,
    pub(crate) scheduler: PointScheduler,
    pub(crate) detector: DistractionDetector,
    pub(crate) services: DriveServices,
    pub(crate) user_id: String,
    pub(crate) heartbeat_every_points: u64,
    pub(crate) snapshot_tx: watch::Sender<DriveSnapshot>,
    /// History records whose write failed; retried at the next start.
    pub(crate) pending_history: Arc<Mutex<Vec<DriveRecord>>>,
}

pub(crate) async fn drive_loop(
    mut worker: DriveWorker,
    mut commands: Receiver<DriveCommand>,
    mut location: UnboundedReceiver<SpeedSample>,
    mut lifecycle: UnboundedReceiver<AppPhase>,
    cancel_token: CancellationToken,
) {
    let mut location_open = true;
    let mut lifecycle_open = true;
    // at most one remote lookup in flight; polled alongside everything else
    let mut lookup: Option<PendingLookup> = None;

    loop {
        if worker.state.is_finalized {
            lookup = None;
        }
        let tick_at = worker.scheduler.deadline();
        let timeout_at = worker.detector.timeout_deadline();

        tokio::select! {
            biased;

            _ = cancel_token.cancelled() => {
                info!("Drive loop for {} shutting down", worker.state.session_id);
                break;
            }
            phase = lifecycle.recv(), if lifecycle_open => match phase {
                Some(phase) => worker.on_lifecycle(phase).await,
                None => lifecycle_open = false,
            },
            sample = location.recv(), if location_open => match sample {
                Some(sample) => {
                    if let Some(pending) = worker.on_location(sample, lookup.is_some()) {
                        lookup = Some(pending);
                    }
                }
                None => {
                    warn!("Location stream closed for drive {}", worker.state.session_id);
                    location_open = false;
                }
            },
            _ = sleep_until_opt(timeout_at) => worker.on_background_timeout().await,
            _ = sleep_until_opt(tick_at) => worker.on_point_tick().await,
            outcome = lookup_finished(&mut lookup) => {
                lookup = None;
                worker.on_lookup_finished(outcome).await;
            }
            command = commands.recv() => match command {
                Some(DriveCommand::Finalize(reply)) => {
                    let summary = worker.finalize(DriveStatus::Completed).await;
                    let _ = reply.send(summary);
                }
                Some(DriveCommand::Snapshot(reply)) => {
                    let _ = reply.send(worker.state.snapshot());
                }
                None => break,
            },
        }
    }

    worker.teardown();
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

async fn lookup_finished(lookup: &mut Option<PendingLookup>) -> LookupOutcome {
    match lookup {
        Some(pending) => pending.await,
        None => std::future::pending::<LookupOutcome>().await,
    }
}

impl DriveWorker {
    async fn on_lifecycle(&mut self, phase: AppPhase) {
        if self.state.is_finalized {
            return;
        }

        let now = Instant::now();
        let outcome = match phase {
            AppPhase::Background => self
                .detector
                .on_background(now, self.state.points_this_drive),
            AppPhase::Foreground => self.detector.on_foreground(now),
        };
        self.apply_distraction(outcome).await;
    }

    async fn on_background_timeout(&mut self) {
        if self.state.is_finalized {
            self.detector.close();
            return;
        }
        let outcome = self.detector.on_timeout(Instant::now());
        self.apply_distraction(outcome).await;
    }

    async fn apply_distraction(&mut self, outcome: DistractionOutcome) {
        match outcome {
            DistractionOutcome::Distracted => {
                self.state.is_distracted = true;
                self.publish();
            }
            DistractionOutcome::DriveEnded => {
                self.state.is_distracted = true;
                self.finalize(DriveStatus::TimedOut).await;
            }
            DistractionOutcome::Unchanged
            | DistractionOutcome::WindowOpened
            | DistractionOutcome::Forgiven => {}
        }
    }

    /// Applies a sample and, when the limit is unknown for this cell, hands
    /// back a lookup for the loop to poll.
    fn on_location(&mut self, sample: SpeedSample, lookup_in_flight: bool) -> Option<PendingLookup> {
        if self.state.is_finalized {
            return None;
        }
        if !self.state.accept_sample(&sample) {
            debug!("Dropping stale or invalid sample at {}", sample.timestamp_ms);
            return None;
        }

        let unit = self.state.unit;
        let speed = unit.from_meters_per_second(sample.raw_speed);
        self.state.current_speed = speed;

        let mut pending = None;
        if let Some(limit) = self.resolver.cached_limit(&sample, unit) {
            self.state.current_speed_limit = Some(limit);
        } else if !lookup_in_flight {
            pending = self.resolver.begin_lookup(&sample, speed, unit);
        }

        self.scheduler
            .on_speed_update(Instant::now(), speed, self.state.effective_limit());
        self.publish();
        pending
    }

    async fn on_lookup_finished(&mut self, outcome: LookupOutcome) {
        if self.state.is_finalized {
            return;
        }
        // a failed lookup keeps whatever limit is already shown
        let Some(limit) = self.resolver.complete_lookup(outcome).await else {
            return;
        };
        self.state.current_speed_limit = Some(limit);
        self.scheduler
            .on_speed_update(Instant::now(), self.state.current_speed, limit);
        self.publish();
    }

    async fn on_point_tick(&mut self) {
        if self.state.is_finalized {
            self.scheduler.stop();
            return;
        }

        let earned = self.scheduler.on_tick(
            Instant::now(),
            self.state.current_speed,
            self.state.effective_limit(),
            self.state.unit.moving_threshold(),
        );
        if !earned {
            return;
        }

        self.state.points_this_drive += 1;
        if self.heartbeat_every_points > 0
            && self.state.points_this_drive % self.heartbeat_every_points == 0
        {
            let marker = self.state.marker(Utc::now());
            if let Err(err) = write_marker(self.services.store.as_ref(), &marker).await {
                warn!("Heartbeat for drive {} failed: {err:#}", self.state.session_id);
            }
        }
        self.publish();
    }

    /// Runs at most once per drive; later calls return `None`.
    pub(crate) async fn finalize(&mut self, status: DriveStatus) -> Option<DriveSummary> {
        if self.state.is_finalized {
            debug!("Drive {} already finalized", self.state.session_id);
            return None;
        }
        self.state.is_finalized = true;
        self.scheduler.stop();
        self.detector.close();

        let store = self.services.store.as_ref();
        let points = self.state.points_this_drive;
        let was_distracted = self.state.is_distracted;

        let streak_after = update_streak(store, points, was_distracted).await;
        write_completion_flags(store, was_distracted).await;

        let record = DriveRecord {
            id: self.state.session_id.clone(),
            started_at: self.state.started_at,
            ended_at: Utc::now(),
            starting_points: self.state.starting_points.unwrap_or(0),
            points_earned: points,
            was_distracted,
            status,
            streak_after,
        };

        if let Err(err) = append_history(store, std::slice::from_ref(&record)).await {
            warn!("Drive history write failed, will retry next drive: {err:#}");
            match self.pending_history.lock() {
                Ok(mut pending) => pending.push(record.clone()),
                Err(poisoned) => poisoned.into_inner().push(record.clone()),
            }
        }

        let total_points = self.state.starting_points.unwrap_or(0) + points;
        match self.state.starting_points {
            Some(_) => {
                if let Err(err) = self
                    .services
                    .ledger
                    .set_points(&self.user_id, total_points)
                    .await
                {
                    error!("Failed to sync points for {}: {err:#}", self.user_id);
                }
            }
            None => warn!("Starting points unknown; not overwriting the remote total"),
        }

        if let Err(err) = store.remove(ACTIVE_DRIVE_KEY).await {
            warn!("Failed to clear drive marker: {err:#}");
        }

        info!(
            "Drive {} finalized as {}: {} points, distracted={}",
            record.id,
            status.as_str(),
            points,
            was_distracted
        );

        self.publish();
        let summary = DriveSummary {
            record,
            total_points,
        };
        self.services.observer.drive_completed(&summary);
        Some(summary)
    }

    fn teardown(&mut self) {
        self.scheduler.stop();
        self.detector.close();
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.state.snapshot());
    }
}
