use crate::services::api::{ApiClient, ApiClientError, MediaUrlBuilder};
use crate::services::settings::TranscodeOverrides;
use crate::types::{Track, TrackId};
use async_trait::async_trait;
use subsonic_client::{Song, SubsonicClient};

impl From<Song> for Track {
    fn from(song: Song) -> Self {
        Self {
            id: TrackId::new(song.id),
            title: song.title,
            artist: song.artist.unwrap_or_default(),
            album: song.album.unwrap_or_default(),
            duration_secs: song.duration.unwrap_or_default(),
            cover_art: song.cover_art,
            starred: song.starred,
        }
    }
}

#[async_trait]
impl ApiClient for SubsonicClient {
    async fn get_track(&self, id: &TrackId) -> Result<Option<Track>, ApiClientError> {
        let song = self
            .get_song(id.as_str())
            .await
            .map_err(|error| ApiClientError::RequestFailed(Box::new(error)))?;

        Ok(song.map(Track::from))
    }

    async fn scrobble(&self, id: &TrackId) -> Result<(), ApiClientError> {
        self.scrobble(id.as_str(), true)
            .await
            .map_err(|error| ApiClientError::RequestFailed(Box::new(error)))?;

        Ok(())
    }

    async fn set_starred(&self, id: &TrackId, starred: bool) -> Result<(), ApiClientError> {
        let result = if starred {
            self.star(id.as_str()).await
        } else {
            self.unstar(id.as_str()).await
        };

        result.map_err(|error| ApiClientError::RequestFailed(Box::new(error)))?;

        Ok(())
    }
}

impl MediaUrlBuilder for SubsonicClient {
    fn stream_url(&self, id: &TrackId, overrides: &TranscodeOverrides) -> String {
        SubsonicClient::stream_url(
            self,
            id.as_str(),
            overrides.max_bit_rate,
            overrides.format.as_deref(),
        )
    }

    fn cover_art_url(&self, cover_ref: &str) -> String {
        SubsonicClient::cover_art_url(self, cover_ref)
    }
}
