use crate::types::{PlaylistId, Track, TrackId};
use byte_unit::{Byte, UnitType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Deref;

// DownloadTaskId
#[derive(Eq, PartialEq, Clone, Hash, Debug, Serialize, Deserialize)]
pub struct DownloadTaskId(String);

impl DownloadTaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for DownloadTaskId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&str> for DownloadTaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for DownloadTaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadState {
    Pending,
    Downloading,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl DownloadState {
    /// Terminal states never transition again; the task id behind them is
    /// dead.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadState::Completed | DownloadState::Cancelled | DownloadState::Failed
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

/// Point-in-time snapshot of one transfer, keyed by track in the views.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub track_id: TrackId,
    pub task_id: DownloadTaskId,
    pub state: DownloadState,
    pub progress: f64,
    pub bytes_downloaded: u64,
    pub total_bytes: u64,
}

impl DownloadProgress {
    /// Placeholder row for a task the engine has announced but not yet
    /// reported numbers for.
    pub fn synthetic(track_id: TrackId, task_id: DownloadTaskId, state: DownloadState) -> Self {
        Self {
            track_id,
            task_id,
            state,
            progress: 0.0,
            bytes_downloaded: 0,
            total_bytes: 0,
        }
    }
}

/// Everything the engine needs to fetch one track without calling back
/// into this crate: the URL already carries authentication.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub track_id: TrackId,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration_secs: u32,
    pub url: String,
    pub artwork_url: Option<String>,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct DownloadedTrack {
    pub track_id: TrackId,
    pub title: String,
    pub artist: String,
    pub size_bytes: u64,
    pub local_path: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Clone, Copy, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct StorageSummary {
    pub total_bytes: u64,
    pub track_count: usize,
}

impl StorageSummary {
    pub fn formatted_size(&self) -> String {
        let size = Byte::from_u64(self.total_bytes).get_appropriate_unit(UnitType::Decimal);
        format!("{size:.1}")
    }
}

/// A download admitted while off wifi, parked until the next wifi edge.
#[derive(Clone, PartialEq, Debug)]
pub struct PendingDownload {
    pub track: Track,
    pub playlist_id: Option<PlaylistId>,
}

#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
pub struct EngineTuning {
    pub max_concurrent_downloads: u32,
    pub auto_retry: bool,
    pub max_retry_attempts: u32,
    pub download_artwork: bool,
    pub background_downloads: bool,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 3,
            auto_retry: true,
            max_retry_attempts: 3,
            download_artwork: true,
            background_downloads: true,
        }
    }
}

#[derive(Clone, Copy, Eq, PartialEq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackSourcePreference {
    /// Engine picks the local file when one exists, otherwise streams.
    #[default]
    Auto,
    DownloadedFirst,
    StreamFirst,
}
