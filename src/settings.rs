use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::{
    store::{KeyValueStore, SETTINGS_KEY},
    units::SpeedUnit,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DriveSettings {
    pub distracted_notifications: bool,
    pub unit: SpeedUnit,
}

impl Default for DriveSettings {
    fn default() -> Self {
        Self {
            distracted_notifications: true,
            unit: SpeedUnit::Mph,
        }
    }
}

/// User preferences mirrored into the key-value store.
pub struct SettingsStore {
    store: Arc<dyn KeyValueStore>,
    data: RwLock<DriveSettings>,
}

impl SettingsStore {
    /// Unreadable or unparseable settings fall back to defaults.
    pub async fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let data = match store.get(SETTINGS_KEY).await {
            Ok(Some(contents)) => serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unparseable settings: {err}");
                DriveSettings::default()
            }),
            Ok(None) => DriveSettings::default(),
            Err(err) => {
                warn!("Failed to read settings, using defaults: {err:#}");
                DriveSettings::default()
            }
        };

        Self {
            store,
            data: RwLock::new(data),
        }
    }

    pub fn current(&self) -> DriveSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub async fn update(&self, settings: DriveSettings) -> Result<()> {
        let serialized = serde_json::to_string(&settings).context("failed to serialize settings")?;
        {
            let mut guard = match self.data.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *guard = settings;
        }
        self.store
            .set(SETTINGS_KEY, serialized)
            .await
            .context("failed to persist settings")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn defaults_then_round_trip() {
        let store = Arc::new(MemoryStore::new());
        let settings = SettingsStore::load(store.clone()).await;
        assert_eq!(settings.current(), DriveSettings::default());

        settings
            .update(DriveSettings {
                distracted_notifications: false,
                unit: SpeedUnit::Kph,
            })
            .await
            .unwrap();

        let reloaded = SettingsStore::load(store).await;
        assert!(!reloaded.current().distracted_notifications);
        assert_eq!(reloaded.current().unit, SpeedUnit::Kph);
    }

    #[tokio::test]
    async fn garbage_falls_back_to_defaults() {
        let store = Arc::new(MemoryStore::new());
        store.set(SETTINGS_KEY, "[1,2".into()).await.unwrap();
        let settings = SettingsStore::load(store).await;
        assert_eq!(settings.current(), DriveSettings::default());
    }
}
