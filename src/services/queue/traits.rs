use super::types::{PlayerTrack, QueueItemId, RepeatMode};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum PlayerEngineError {
    #[error("player engine failure: {0}")]
    Failed(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Engine-side handle for a playlist created through `create_playlist`.
#[derive(Eq, PartialEq, Clone, Hash, Debug)]
pub struct EnginePlaylistId(pub String);

impl std::fmt::Display for EnginePlaylistId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum PlayerEngineEvent {
    /// The playing row changed for any reason, including autoplay advance.
    /// Carries no payload on purpose; consumers re-derive from the engine.
    TrackChanged,
    PositionChanged(Duration),
}

#[derive(Clone, Copy, Eq, PartialEq, Debug, Default)]
pub struct PlayerState {
    pub current_index: Option<usize>,
}

/// The platform playback engine. Its queue is the authoritative one; this
/// crate's view of it is a derived cache.
#[async_trait]
pub trait PlayerEngine: Send + Sync {
    async fn create_playlist(&self, name: &str) -> Result<EnginePlaylistId, PlayerEngineError>;

    async fn delete_playlist(
        &self,
        playlist_id: &EnginePlaylistId,
    ) -> Result<(), PlayerEngineError>;

    async fn add_track(
        &self,
        playlist_id: &EnginePlaylistId,
        track: PlayerTrack,
    ) -> Result<(), PlayerEngineError>;

    async fn add_tracks(
        &self,
        playlist_id: &EnginePlaylistId,
        tracks: Vec<PlayerTrack>,
    ) -> Result<(), PlayerEngineError>;

    async fn reorder_track(
        &self,
        playlist_id: &EnginePlaylistId,
        item_id: &QueueItemId,
        to_index: usize,
    ) -> Result<(), PlayerEngineError>;

    /// Makes the playlist the live queue without starting playback.
    async fn load_playlist(&self, playlist_id: &EnginePlaylistId)
        -> Result<(), PlayerEngineError>;

    async fn play(&self) -> Result<(), PlayerEngineError>;

    async fn pause(&self) -> Result<(), PlayerEngineError>;

    async fn seek_to(&self, position: Duration) -> Result<(), PlayerEngineError>;

    async fn skip_to_index(&self, index: usize) -> Result<(), PlayerEngineError>;

    async fn skip_to_next(&self) -> Result<(), PlayerEngineError>;

    async fn skip_to_previous(&self) -> Result<(), PlayerEngineError>;

    /// Splices an already-added row to play right after the current one.
    async fn play_next(&self, item_id: &QueueItemId) -> Result<(), PlayerEngineError>;

    async fn set_repeat_mode(&self, mode: RepeatMode) -> Result<(), PlayerEngineError>;

    async fn state(&self) -> Result<PlayerState, PlayerEngineError>;

    async fn queue(&self) -> Result<Vec<PlayerTrack>, PlayerEngineError>;

    fn subscribe(&self) -> mpsc::UnboundedReceiver<PlayerEngineEvent>;
}
