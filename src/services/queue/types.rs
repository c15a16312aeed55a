use crate::types::{Track, TrackId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one queue row. Two enqueues of the same track get distinct
/// instance ids, and a row keeps its id across reorders.
#[derive(Eq, PartialEq, Clone, Hash, Debug, Serialize, Deserialize)]
pub struct QueueItemId(Uuid);

impl QueueItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for QueueItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for QueueItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct QueueItem {
    pub id: QueueItemId,
    pub track: Track,
    pub url: String,
    pub artwork_url: String,
}

impl QueueItem {
    pub fn to_player_track(&self) -> PlayerTrack {
        PlayerTrack {
            id: self.id.clone(),
            track_id: self.track.id.clone(),
            title: self.track.title.clone(),
            artist: self.track.artist.clone(),
            album: self.track.album.clone(),
            duration_secs: self.track.duration_secs,
            url: self.url.clone(),
            artwork_url: self.artwork_url.clone(),
        }
    }
}

/// The flat row handed to the playback engine. What the engine returns
/// from its queue query is re-enriched into `QueueItem`s on re-derivation.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct PlayerTrack {
    pub id: QueueItemId,
    pub track_id: TrackId,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration_secs: u32,
    pub url: String,
    pub artwork_url: String,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    Queue,
    Track,
}

impl RepeatMode {
    pub fn next(&self) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::Queue,
            RepeatMode::Queue => RepeatMode::Track,
            RepeatMode::Track => RepeatMode::Off,
        }
    }
}

#[derive(Clone, Copy, Eq, PartialEq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueSourceKind {
    #[default]
    None,
    Playlist,
    Album,
    Artist,
}

/// Where the queue came from, for the "playing from X" UI line.
#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct QueueSource {
    pub kind: QueueSourceKind,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct PersistedQueue {
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub active_index: usize,
    #[serde(default)]
    pub source: QueueSource,
    #[serde(default)]
    pub repeat_mode: RepeatMode,
}

#[derive(Clone, PartialEq, Debug, Default)]
pub struct ReplaceOptions {
    pub initial_index: usize,
    pub source: Option<QueueSource>,
    pub shuffle: bool,
}

pub struct ClearConfirmOptions {
    /// Pause the engine and wait briefly before the visual removal.
    pub wait: bool,
    /// Invoked after the prompt is accepted, before the queue is cleared.
    pub on_confirm: Option<Box<dyn FnOnce() + Send>>,
}

impl Default for ClearConfirmOptions {
    fn default() -> Self {
        Self {
            wait: false,
            on_confirm: None,
        }
    }
}

/// Outcome of a star toggle. The optimistic flip is kept either way; the
/// variant reports whether the server accepted it.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum StarToggle {
    Confirmed { starred: bool },
    Unconfirmed { starred: bool },
}

#[cfg(test)]
mod repeat_mode_tests {
    use super::*;

    #[test]
    fn should_cycle_through_all_modes() {
        assert_eq!(RepeatMode::Queue, RepeatMode::Off.next());
        assert_eq!(RepeatMode::Track, RepeatMode::Queue.next());
        assert_eq!(RepeatMode::Off, RepeatMode::Track.next());
    }
}
