use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use anyhow::Result;

use crate::store::BoxFuture;

/// Remote point totals per user. Last write wins.
pub trait PointsLedger: Send + Sync {
    fn get_points<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<u64>>;

    fn set_points<'a>(&'a self, user_id: &'a str, total: u64) -> BoxFuture<'a, Result<()>>;
}

#[derive(Default)]
pub struct MemoryLedger {
    totals: Mutex<HashMap<String, u64>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn totals(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        match self.totals.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl PointsLedger for MemoryLedger {
    fn get_points<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move { Ok(self.totals().get(user_id).copied().unwrap_or(0)) })
    }

    fn set_points<'a>(&'a self, user_id: &'a str, total: u64) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.totals().insert(user_id.to_string(), total);
            Ok(())
        })
    }
}
