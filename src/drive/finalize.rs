use anyhow::{Context, Result};
use log::{info, warn};

use crate::{
    models::{ActiveDriveMarker, DriveRecord},
    store::{
        KeyValueStore, ACTIVE_DRIVE_KEY, DRIVE_COMPLETE_KEY, DRIVE_HISTORY_BACKUP_KEY,
        DRIVE_HISTORY_KEY, LAST_DRIVE_DISTRACTED_KEY, STREAK_KEY,
    },
};

/// Distracted resets to zero, a clean drive with points extends the streak,
/// a drive without points leaves it alone (`None`).
pub fn next_streak(current: u32, points_earned: u64, was_distracted: bool) -> Option<u32> {
    if was_distracted {
        Some(0)
    } else if points_earned > 0 {
        Some(current.saturating_add(1))
    } else {
        None
    }
}

pub async fn read_streak(store: &dyn KeyValueStore) -> u32 {
    match store.get(STREAK_KEY).await {
        Ok(Some(raw)) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring unparseable streak value '{raw}'");
            0
        }),
        Ok(None) => 0,
        Err(err) => {
            warn!("Failed to read streak: {err:#}");
            0
        }
    }
}

/// Applies the streak rule and persists it. Returns the value written, if any.
pub async fn update_streak(
    store: &dyn KeyValueStore,
    points_earned: u64,
    was_distracted: bool,
) -> Option<u32> {
    let current = read_streak(store).await;
    let next = next_streak(current, points_earned, was_distracted)?;

    if let Err(err) = store.set(STREAK_KEY, next.to_string()).await {
        warn!("Failed to persist streak {next}: {err:#}");
    }
    info!("Streak {current} -> {next}");
    Some(next)
}

pub async fn write_completion_flags(store: &dyn KeyValueStore, was_distracted: bool) {
    if let Err(err) = store.set(DRIVE_COMPLETE_KEY, "true".into()).await {
        warn!("Failed to persist drive-complete flag: {err:#}");
    }
    if let Err(err) = store
        .set(LAST_DRIVE_DISTRACTED_KEY, was_distracted.to_string())
        .await
    {
        warn!("Failed to persist distracted flag: {err:#}");
    }
}

/// Reads the history list. A corrupt list is treated as empty.
pub async fn load_history(store: &dyn KeyValueStore) -> Result<Vec<DriveRecord>> {
    let Some(raw) = store
        .get(DRIVE_HISTORY_KEY)
        .await
        .context("failed to read drive history")?
    else {
        return Ok(Vec::new());
    };

    match serde_json::from_str(&raw) {
        Ok(records) => Ok(records),
        Err(err) => {
            warn!("Drive history is corrupt, ignoring it: {err}");
            Ok(Vec::new())
        }
    }
}

/// Appends records the list does not hold yet. An unreadable list is moved
/// to a backup key before a new one is started; if that move fails nothing
/// is overwritten.
pub async fn append_history(store: &dyn KeyValueStore, records: &[DriveRecord]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }

    let raw = store
        .get(DRIVE_HISTORY_KEY)
        .await
        .context("failed to read drive history")?;
    let mut history: Vec<DriveRecord> = match raw {
        None => Vec::new(),
        Some(raw) => match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(err) => {
                warn!("Drive history is corrupt, moving it to {DRIVE_HISTORY_BACKUP_KEY}: {err}");
                store
                    .set(DRIVE_HISTORY_BACKUP_KEY, raw)
                    .await
                    .context("failed to back up corrupt drive history")?;
                Vec::new()
            }
        },
    };

    for record in records {
        if history.iter().any(|existing| existing.id == record.id) {
            continue;
        }
        history.push(record.clone());
    }

    let serialized = serde_json::to_string(&history).context("failed to serialize drive history")?;
    store
        .set(DRIVE_HISTORY_KEY, serialized)
        .await
        .context("failed to write drive history")
}

pub async fn write_marker(store: &dyn KeyValueStore, marker: &ActiveDriveMarker) -> Result<()> {
    let serialized = serde_json::to_string(marker).context("failed to serialize drive marker")?;
    store
        .set(ACTIVE_DRIVE_KEY, serialized)
        .await
        .context("failed to write drive marker")
}

/// Turns a marker left behind by an unfinished drive into an `Interrupted`
/// history record and clears it.
pub async fn recover_interrupted(store: &dyn KeyValueStore) -> Result<Option<DriveRecord>> {
    let Some(raw) = store
        .get(ACTIVE_DRIVE_KEY)
        .await
        .context("failed to read drive marker")?
    else {
        return Ok(None);
    };

    let record = match serde_json::from_str::<ActiveDriveMarker>(&raw) {
        Ok(marker) => {
            // last heartbeat is the best known end time
            let ended_at = marker.updated_at;
            warn!("Recovered unfinished drive {}; marking as Interrupted", marker.id);
            Some(marker.into_interrupted_record(ended_at))
        }
        Err(err) => {
            warn!("Discarding unreadable drive marker: {err}");
            None
        }
    };

    if let Some(record) = &record {
        append_history(store, std::slice::from_ref(record)).await?;
    }
    store
        .remove(ACTIVE_DRIVE_KEY)
        .await
        .context("failed to clear drive marker")?;

    Ok(record)
}
