use crate::services::settings::TranscodeOverrides;
use crate::types::{Track, TrackId};
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum ApiClientError {
    #[error("api request failed: {0}")]
    RequestFailed(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// The slice of the server API this core needs. Implemented for the
/// concrete Subsonic client in `impls`.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Resolves a track by id. `Ok(None)` means the server authoritatively
    /// does not know the id; transport failures are `Err`.
    async fn get_track(&self, id: &TrackId) -> Result<Option<Track>, ApiClientError>;

    async fn scrobble(&self, id: &TrackId) -> Result<(), ApiClientError>;

    async fn set_starred(&self, id: &TrackId, starred: bool) -> Result<(), ApiClientError>;
}

/// Builds self-contained media URLs (auth embedded in query parameters) for
/// the download and playback engines to fetch directly.
pub trait MediaUrlBuilder: Send + Sync {
    fn stream_url(&self, id: &TrackId, overrides: &TranscodeOverrides) -> String;

    fn cover_art_url(&self, cover_ref: &str) -> String;
}
