use std::{collections::HashMap, fmt, sync::Arc};

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    store::{KeyValueStore, SPEED_LIMIT_CACHE_KEY},
    units::SpeedUnit,
};

/// Quantized (lat, lon) bucket. Coordinates are divided by the resolution and
/// rounded, so jitter inside a cell always maps to the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridKey {
    lat_index: i64,
    lon_index: i64,
}

impl GridKey {
    pub fn from_coords(latitude: f64, longitude: f64, resolution_deg: f64) -> Self {
        Self {
            lat_index: (latitude / resolution_deg).round() as i64,
            lon_index: (longitude / resolution_deg).round() as i64,
        }
    }
}

impl fmt::Display for GridKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.lat_index, self.lon_index)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CachedSpeedLimit {
    pub grid_key: String,
    pub value: f64,
    pub unit: SpeedUnit,
}

/// Speed limits by grid cell, mirrored to the key-value store on every write.
pub struct GridCache {
    store: Arc<dyn KeyValueStore>,
    resolution_deg: f64,
    entries: HashMap<String, CachedSpeedLimit>,
}

impl GridCache {
    pub fn empty(store: Arc<dyn KeyValueStore>, resolution_deg: f64) -> Self {
        Self {
            store,
            resolution_deg,
            entries: HashMap::new(),
        }
    }

    /// Loads every persisted entry. A missing, unreadable or corrupt blob
    /// yields an empty cache.
    pub async fn load_all(store: Arc<dyn KeyValueStore>, resolution_deg: f64) -> Self {
        let mut cache = Self::empty(store, resolution_deg);

        let blob = match cache.store.get(SPEED_LIMIT_CACHE_KEY).await {
            Ok(Some(blob)) => blob,
            Ok(None) => return cache,
            Err(err) => {
                warn!("Failed to read speed limit cache, starting empty: {err:#}");
                return cache;
            }
        };

        match serde_json::from_str::<HashMap<String, CachedSpeedLimit>>(&blob) {
            Ok(entries) => {
                info!("Loaded {} cached speed limits", entries.len());
                cache.entries = entries;
            }
            Err(err) => {
                warn!("Speed limit cache is corrupt, starting empty: {err}");
            }
        }

        cache
    }

    pub fn key_for(&self, latitude: f64, longitude: f64) -> GridKey {
        GridKey::from_coords(latitude, longitude, self.resolution_deg)
    }

    pub fn get(&self, latitude: f64, longitude: f64) -> Option<&CachedSpeedLimit> {
        let key = self.key_for(latitude, longitude).to_string();
        self.entries.get(&key)
    }

    /// Last writer wins. The in-memory entry is updated before the full cache
    /// is rewritten, so a failed persist only loses durability for this write.
    pub async fn put(
        &mut self,
        latitude: f64,
        longitude: f64,
        value: f64,
        unit: SpeedUnit,
    ) -> Result<()> {
        let grid_key = self.key_for(latitude, longitude).to_string();
        self.entries.insert(
            grid_key.clone(),
            CachedSpeedLimit {
                grid_key,
                value,
                unit,
            },
        );

        let serialized =
            serde_json::to_string(&self.entries).context("failed to serialize speed limit cache")?;
        self.store
            .set(SPEED_LIMIT_CACHE_KEY, serialized)
            .await
            .context("failed to persist speed limit cache")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const RES: f64 = 0.002;

    #[test]
    fn jitter_inside_a_cell_keeps_the_key() {
        let center_lat = 18_887.0 * RES;
        let center_lon = -61_209.0 * RES;
        let key = GridKey::from_coords(center_lat, center_lon, RES);

        for (dlat, dlon) in [(0.0009, 0.0), (-0.0009, 0.0009), (0.0004, -0.0008), (0.0, 0.0)] {
            assert_eq!(
                GridKey::from_coords(center_lat + dlat, center_lon + dlon, RES),
                key
            );
        }
        assert_ne!(GridKey::from_coords(center_lat + RES, center_lon, RES), key);
    }

    #[test]
    fn key_encodes_as_string() {
        let key = GridKey::from_coords(0.004, -0.006, RES);
        assert_eq!(key.to_string(), "2_-3");
    }

    #[tokio::test]
    async fn same_cell_returns_same_entry() {
        let store = Arc::new(MemoryStore::new());
        let mut cache = GridCache::empty(store, RES);
        cache.put(40.0001, -73.9999, 35.0, SpeedUnit::Mph).await.unwrap();

        let a = cache.get(40.0001, -73.9999).cloned();
        let b = cache.get(40.0006, -73.9994).cloned();
        assert!(a.is_some());
        assert_eq!(a, b);
        assert!(cache.get(40.01, -73.9999).is_none());
    }

    #[tokio::test]
    async fn put_overwrites_and_survives_restart() {
        let store = Arc::new(MemoryStore::new());
        {
            let mut cache = GridCache::load_all(store.clone(), RES).await;
            assert!(cache.is_empty());
            cache.put(51.5007, -0.1246, 30.0, SpeedUnit::Mph).await.unwrap();
            cache.put(51.5007, -0.1246, 55.0, SpeedUnit::Mph).await.unwrap();
        }

        let reloaded = GridCache::load_all(store, RES).await;
        assert_eq!(reloaded.len(), 1);
        let entry = reloaded.get(51.5007, -0.1246).unwrap();
        assert_eq!(entry.value, 55.0);
        assert_eq!(entry.unit, SpeedUnit::Mph);
    }

    #[tokio::test]
    async fn corrupt_blob_degrades_to_empty() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(SPEED_LIMIT_CACHE_KEY, "{not json".into())
            .await
            .unwrap();

        let cache = GridCache::load_all(store, RES).await;
        assert!(cache.is_empty());
    }
}
