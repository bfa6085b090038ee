use std::sync::{Arc, Mutex as StdMutex};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use log::{info, warn};
use tokio::{
    sync::{mpsc, oneshot, watch, Mutex},
    task::JoinHandle,
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    config::EngineConfig,
    distraction::{DistractionDetector, DistractionPolicy},
    error::DriveError,
    models::{DriveRecord, DriveSummary},
    points::{PointPolicy, PointScheduler},
    settings::SettingsStore,
    speed_limit::{GridCache, SpeedLimitResolver},
};

use super::{
    finalize::{append_history, load_history, read_streak, recover_interrupted, write_marker},
    loop_worker::{drive_loop, DriveCommand, DriveWorker},
    sources::DriveServices,
    state::{DriveSnapshot, DriveState},
};

const COMMAND_BUFFER: usize = 16;

struct ActiveDrive {
    session_id: String,
    commands: mpsc::Sender<DriveCommand>,
    snapshot: watch::Receiver<DriveSnapshot>,
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ActiveDrive {
    async fn stop(self) -> Result<()> {
        self.cancel_token.cancel();
        self.handle
            .await
            .context("drive loop task failed to join")
    }
}

/// Host-facing handle. At most one drive is active per controller; clones
/// share it.
#[derive(Clone)]
pub struct DriveController {
    services: DriveServices,
    config: EngineConfig,
    active: Arc<Mutex<Option<ActiveDrive>>>,
    pending_history: Arc<StdMutex<Vec<DriveRecord>>>,
}

impl DriveController {
    pub fn new(services: DriveServices, config: EngineConfig) -> Self {
        Self {
            services,
            config,
            active: Arc::new(Mutex::new(None)),
            pending_history: Arc::new(StdMutex::new(Vec::new())),
        }
    }

    /// Starts a new drive for `user_id`. Fails with
    /// [`DriveError::LocationPermissionDenied`] if location is refused, and
    /// with [`DriveError::SessionActive`] while another drive is unfinished.
    pub async fn start(&self, user_id: &str) -> Result<DriveSnapshot> {
        let mut active = self.active.lock().await;

        if let Some(previous) = active.take() {
            let finalized = previous.snapshot.borrow().is_finalized;
            if !finalized {
                *active = Some(previous);
                bail!(DriveError::SessionActive);
            }
            // finalized but never unmounted
            previous.stop().await?;
        }

        let location = self.services.location.subscribe()?;

        let store = self.services.store.clone();
        if let Err(err) = recover_interrupted(store.as_ref()).await {
            warn!("Crash recovery skipped: {err:#}");
        }
        self.retry_pending_history().await;

        let settings = SettingsStore::load(store.clone()).await.current();
        let starting_points = match self.services.ledger.get_points(user_id).await {
            Ok(points) => Some(points),
            Err(err) => {
                warn!("Failed to read points for {user_id}: {err:#}");
                None
            }
        };

        let cache = GridCache::load_all(store.clone(), self.config.grid_resolution_deg).await;
        let resolver = SpeedLimitResolver::new(
            self.services.speed_limits.clone(),
            cache,
            self.config.lookup_min_interval(),
            self.config.lookup_timeout(),
        );

        let state = DriveState::begin(
            Uuid::new_v4().to_string(),
            Utc::now(),
            starting_points,
            settings.unit,
        );
        if let Err(err) = write_marker(store.as_ref(), &state.marker(Utc::now())).await {
            warn!("Failed to write drive marker: {err:#}");
        }

        let mut scheduler = PointScheduler::new(PointPolicy::from_config(&self.config));
        scheduler.start(Instant::now(), state.current_speed, state.effective_limit());

        let detector = DistractionDetector::new(
            DistractionPolicy::from_config(&self.config),
            self.services.notifier.clone(),
            settings.distracted_notifications,
        );

        let lifecycle = self.services.lifecycle.subscribe();
        let snapshot = state.snapshot();
        let session_id = state.session_id.clone();
        let (snapshot_tx, snapshot_rx) = watch::channel(snapshot.clone());
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let cancel_token = CancellationToken::new();

        let worker = DriveWorker {
            state,
            resolver,
            scheduler,
            detector,
            services: self.services.clone(),
            user_id: user_id.to_string(),
            heartbeat_every_points: self.config.heartbeat_every_points,
            snapshot_tx,
            pending_history: self.pending_history.clone(),
        };

        let handle = tokio::spawn(drive_loop(
            worker,
            command_rx,
            location,
            lifecycle,
            cancel_token.clone(),
        ));

        info!(
            "Drive {} started (unit={}, starting points={:?})",
            session_id,
            settings.unit.as_str(),
            starting_points
        );

        *active = Some(ActiveDrive {
            session_id,
            commands: command_tx,
            snapshot: snapshot_rx,
            cancel_token,
            handle,
        });

        Ok(snapshot)
    }

    /// Ends the active drive. Safe to call any number of times; only the
    /// first call for a drive returns a summary.
    pub async fn finalize(&self) -> Result<Option<DriveSummary>> {
        let commands = {
            let active = self.active.lock().await;
            match active.as_ref() {
                Some(drive) => drive.commands.clone(),
                None => return Ok(None),
            }
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if commands.send(DriveCommand::Finalize(reply_tx)).await.is_err() {
            return Ok(None);
        }
        Ok(reply_rx.await.unwrap_or(None))
    }

    /// Current state, after every event queued before this call is applied.
    pub async fn snapshot(&self) -> Option<DriveSnapshot> {
        let (commands, fallback) = {
            let active = self.active.lock().await;
            let drive = active.as_ref()?;
            let fallback = drive.snapshot.borrow().clone();
            (drive.commands.clone(), fallback)
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if commands.send(DriveCommand::Snapshot(reply_tx)).await.is_err() {
            return Some(fallback);
        }
        Some(reply_rx.await.unwrap_or(fallback))
    }

    /// Receiver for UI binding; updated after every state change.
    pub async fn watch(&self) -> Option<watch::Receiver<DriveSnapshot>> {
        let active = self.active.lock().await;
        active.as_ref().map(|drive| drive.snapshot.clone())
    }

    pub async fn active_session_id(&self) -> Option<String> {
        let active = self.active.lock().await;
        active.as_ref().map(|drive| drive.session_id.clone())
    }

    /// Unmount: stops timers, drops subscriptions and waits for the drive
    /// loop to exit. An unfinished drive is left for crash recovery.
    pub async fn shutdown(&self) -> Result<()> {
        let drive = self.active.lock().await.take();
        match drive {
            Some(drive) => {
                let session_id = drive.session_id.clone();
                drive.stop().await?;
                info!("Drive {session_id} torn down");
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub async fn history(&self) -> Result<Vec<DriveRecord>> {
        load_history(self.services.store.as_ref()).await
    }

    pub async fn streak(&self) -> u32 {
        read_streak(self.services.store.as_ref()).await
    }

    async fn retry_pending_history(&self) {
        let pending = {
            let mut guard = self
                .pending_history
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *guard)
        };
        if pending.is_empty() {
            return;
        }

        match append_history(self.services.store.as_ref(), &pending).await {
            Ok(()) => info!("Wrote {} deferred drive records", pending.len()),
            Err(err) => {
                warn!("Deferred drive records still not written: {err:#}");
                let mut guard = self
                    .pending_history
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                guard.extend(pending);
            }
        }
    }
}

impl std::fmt::Debug for DriveController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveController")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
