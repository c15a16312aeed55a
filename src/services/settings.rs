use crate::storage::{KeyValueStorage, StorageError};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::warn;

const SETTINGS_PREFIX: &str = "settings";
const SNAPSHOT_KEY: &str = "current";

/// Transcoding overrides attached to a stream URL. `None` means the server
/// decides.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct TranscodeOverrides {
    pub max_bit_rate: Option<u32>,
    pub format: Option<String>,
}

/// The full typed settings surface this core reads. Unknown values fall
/// back to defaults so older persisted snapshots keep loading.
#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    #[serde(default)]
    pub wifi_only_downloads: bool,
    #[serde(default)]
    pub persist_queue: bool,
    #[serde(default)]
    pub download_max_bit_rate: Option<u32>,
    #[serde(default)]
    pub download_format: Option<String>,
    #[serde(default)]
    pub streaming_max_bit_rate: Option<u32>,
    #[serde(default)]
    pub streaming_format: Option<String>,
}

impl SettingsSnapshot {
    pub fn download_overrides(&self) -> TranscodeOverrides {
        normalize(self.download_max_bit_rate, self.download_format.clone())
    }

    pub fn streaming_overrides(&self) -> TranscodeOverrides {
        normalize(self.streaming_max_bit_rate, self.streaming_format.clone())
    }
}

// A zero bitrate and the "raw" format are the stored sentinels for
// "no override".
fn normalize(max_bit_rate: Option<u32>, format: Option<String>) -> TranscodeOverrides {
    TranscodeOverrides {
        max_bit_rate: max_bit_rate.filter(|rate| *rate > 0),
        format: format.filter(|format| format != "raw"),
    }
}

/// Process-wide typed settings registry: one snapshot, write-through
/// persistence, and a watch channel for change subscriptions. Dropping a
/// receiver unsubscribes.
pub struct SettingsStore {
    storage: Arc<dyn KeyValueStorage>,
    snapshot: Mutex<SettingsSnapshot>,
    tx: watch::Sender<SettingsSnapshot>,
}

impl SettingsStore {
    pub async fn load(storage: Arc<dyn KeyValueStorage>) -> Self {
        let snapshot = match storage.get(SETTINGS_PREFIX, SNAPSHOT_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(snapshot) => snapshot,
                Err(error) => {
                    warn!(?error, "Ignoring malformed stored settings");
                    SettingsSnapshot::default()
                }
            },
            Ok(None) => SettingsSnapshot::default(),
            Err(error) => {
                warn!(?error, "Unable to read stored settings");
                SettingsSnapshot::default()
            }
        };

        let (tx, _) = watch::channel(snapshot.clone());

        Self {
            storage,
            snapshot: Mutex::new(snapshot),
            tx,
        }
    }

    pub fn current(&self) -> SettingsSnapshot {
        self.snapshot.lock().unwrap().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SettingsSnapshot> {
        self.tx.subscribe()
    }

    pub async fn update(
        &self,
        apply: impl FnOnce(&mut SettingsSnapshot),
    ) -> Result<(), StorageError> {
        let next = {
            let mut guard = self.snapshot.lock().unwrap();
            apply(&mut guard);
            guard.clone()
        };

        let raw = serde_json::to_string(&next)?;
        self.storage.save(SETTINGS_PREFIX, SNAPSHOT_KEY, &raw).await?;

        let _ = self.tx.send(next);

        Ok(())
    }

    pub async fn set_wifi_only_downloads(&self, enabled: bool) -> Result<(), StorageError> {
        self.update(|snapshot| snapshot.wifi_only_downloads = enabled)
            .await
    }

    pub async fn set_persist_queue(&self, enabled: bool) -> Result<(), StorageError> {
        self.update(|snapshot| snapshot.persist_queue = enabled).await
    }
}
