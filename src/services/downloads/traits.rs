use super::types::{
    DownloadProgress, DownloadRequest, DownloadState, DownloadTaskId, DownloadedTrack,
    EngineTuning, PlaybackSourcePreference, StorageSummary,
};
use crate::types::{PlaylistId, TrackId};
use async_trait::async_trait;
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum DownloadEngineError {
    #[error("engine rejected the request: {0}")]
    Rejected(String),
    #[error("engine failure: {0}")]
    Failed(#[from] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Clone, Debug)]
pub enum DownloadEngineEvent {
    /// Byte-level progress for a running task. High frequency; consumers
    /// are expected to coalesce.
    Progress(DownloadProgress),
    StateChanged {
        track_id: TrackId,
        task_id: DownloadTaskId,
        state: DownloadState,
        error: Option<String>,
    },
    /// Fired once per finished transfer, after the file is in place.
    Completed(DownloadedTrack),
}

/// The platform download engine. Implementations own the transfer queue,
/// retry policy and local files; this crate never touches the filesystem
/// for media directly.
#[async_trait]
pub trait DownloadEngine: Send + Sync {
    async fn configure(&self, tuning: &EngineTuning) -> Result<(), DownloadEngineError>;

    async fn set_source_preference(
        &self,
        preference: PlaybackSourcePreference,
    ) -> Result<(), DownloadEngineError>;

    /// Re-validates the engine's persistent task list against the files
    /// actually on disk. Called once on activation.
    async fn sync_downloads(&self) -> Result<(), DownloadEngineError>;

    async fn active_downloads(&self) -> Result<Vec<DownloadProgress>, DownloadEngineError>;

    async fn is_track_downloaded(&self, track_id: &TrackId) -> Result<bool, DownloadEngineError>;

    async fn is_downloading(&self, track_id: &TrackId) -> Result<bool, DownloadEngineError>;

    async fn download_track(
        &self,
        request: DownloadRequest,
        playlist_id: Option<&PlaylistId>,
    ) -> Result<(), DownloadEngineError>;

    async fn download_playlist(
        &self,
        playlist_id: &PlaylistId,
        requests: Vec<DownloadRequest>,
    ) -> Result<(), DownloadEngineError>;

    async fn delete_track(&self, track_id: &TrackId) -> Result<(), DownloadEngineError>;

    async fn delete_all(&self) -> Result<(), DownloadEngineError>;

    async fn pause_download(&self, task_id: &DownloadTaskId) -> Result<(), DownloadEngineError>;

    async fn resume_download(&self, task_id: &DownloadTaskId) -> Result<(), DownloadEngineError>;

    async fn cancel_download(&self, task_id: &DownloadTaskId) -> Result<(), DownloadEngineError>;

    async fn retry_download(&self, task_id: &DownloadTaskId) -> Result<(), DownloadEngineError>;

    async fn downloaded_tracks(&self) -> Result<Vec<DownloadedTrack>, DownloadEngineError>;

    async fn storage_summary(&self) -> Result<StorageSummary, DownloadEngineError>;

    /// Event feed for everything above. The receiver sees events emitted
    /// after the call; subscribe before kicking off work.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<DownloadEngineEvent>;
}
