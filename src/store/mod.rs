//! Device-scoped key-value persistence.
//!
//! Everything the engine keeps across process restarts (speed-limit cache,
//! user settings, streak, drive history) is stored as opaque string blobs.
//! There is no transactional guarantee across keys.

mod memory;
mod migrations;
mod sqlite;

use std::{future::Future, pin::Pin};

use anyhow::Result;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub const SPEED_LIMIT_CACHE_KEY: &str = "speed_limit_cache";
pub const SETTINGS_KEY: &str = "settings";
pub const STREAK_KEY: &str = "drive_streak";
pub const DRIVE_COMPLETE_KEY: &str = "drive_complete";
pub const LAST_DRIVE_DISTRACTED_KEY: &str = "last_drive_distracted";
pub const DRIVE_HISTORY_KEY: &str = "drive_history";
pub const DRIVE_HISTORY_BACKUP_KEY: &str = "drive_history_corrupt";
pub const ACTIVE_DRIVE_KEY: &str = "active_drive";

pub trait KeyValueStore: Send + Sync {
    /// Returns `Ok(None)` when the key has never been written.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>>>;

    fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<()>>;

    /// Succeeds even if the key does not exist.
    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>>;
}
