use crate::services::api::ApiClient;
use crate::types::{Track, TrackId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, warn};

#[derive(Default)]
struct HydratorState {
    resolved: HashMap<TrackId, Track>,
    /// Ids the server authoritatively reported as unknown. Kept separate
    /// from `resolved` so a miss is remembered without refetching, while
    /// transport failures stay retryable.
    missing: HashSet<TrackId>,
    in_flight: HashMap<TrackId, broadcast::Sender<Option<Track>>>,
}

/// Resolves track metadata by id, caching positives and confirmed misses.
/// Concurrent lookups for the same id share a single server request.
pub struct MetadataHydrator {
    api: Arc<dyn ApiClient>,
    state: Arc<Mutex<HydratorState>>,
}

enum Flight {
    Done(Option<Track>),
    Wait(broadcast::Receiver<Option<Track>>),
}

impl MetadataHydrator {
    pub fn create(api: Arc<dyn ApiClient>) -> Self {
        Self {
            api,
            state: Arc::new(Mutex::new(HydratorState::default())),
        }
    }

    /// Returns the track for `track_id`, fetching it on a cache miss.
    /// `None` means the server does not know the id, or this particular
    /// fetch failed; only the former is remembered.
    ///
    /// The fetch itself runs as a detached task and every caller waits on
    /// its outcome, so a caller dropped mid-await cannot strand the
    /// in-flight entry for later lookups of the same id.
    pub async fn resolve(&self, track_id: &TrackId) -> Option<Track> {
        let flight = {
            let mut state = self.state.lock().unwrap();

            if let Some(track) = state.resolved.get(track_id) {
                Flight::Done(Some(track.clone()))
            } else if state.missing.contains(track_id) {
                Flight::Done(None)
            } else if let Some(sender) = state.in_flight.get(track_id) {
                Flight::Wait(sender.subscribe())
            } else {
                // Subscribe before the fetch can publish.
                let (sender, receiver) = broadcast::channel(1);
                state.in_flight.insert(track_id.clone(), sender);

                let api = Arc::clone(&self.api);
                let shared = Arc::clone(&self.state);
                let track_id = track_id.clone();
                actix_rt::spawn(async move {
                    fetch_and_publish(api, shared, track_id).await;
                });

                Flight::Wait(receiver)
            }
        };

        match flight {
            Flight::Done(result) => result,
            Flight::Wait(mut receiver) => receiver.recv().await.unwrap_or_default(),
        }
    }

    /// Fetches `track_id` from the server regardless of cache state and
    /// stores the outcome. A failed refresh leaves the cache untouched.
    pub async fn refresh(&self, track_id: &TrackId) -> Option<Track> {
        match self.api.get_track(track_id).await {
            Ok(Some(track)) => {
                let mut state = self.state.lock().unwrap();
                state.missing.remove(track_id);
                state.resolved.insert(track_id.clone(), track.clone());
                Some(track)
            }
            Ok(None) => {
                let mut state = self.state.lock().unwrap();
                state.resolved.remove(track_id);
                state.missing.insert(track_id.clone());
                None
            }
            Err(error) => {
                warn!(%track_id, ?error, "Unable to refresh track metadata");
                self.state
                    .lock()
                    .unwrap()
                    .resolved
                    .get(track_id)
                    .cloned()
            }
        }
    }

}

async fn fetch_and_publish(
    api: Arc<dyn ApiClient>,
    shared: Arc<Mutex<HydratorState>>,
    track_id: TrackId,
) {
    let result = api.get_track(&track_id).await;

    let (sender, outcome) = {
        let mut state = shared.lock().unwrap();
        let sender = state.in_flight.remove(&track_id);

        let outcome = match result {
            Ok(Some(track)) => {
                state.resolved.insert(track_id.clone(), track.clone());
                Some(track)
            }
            Ok(None) => {
                debug!(%track_id, "Track not found on server");
                state.missing.insert(track_id.clone());
                None
            }
            Err(error) => {
                warn!(%track_id, ?error, "Unable to fetch track metadata");
                None
            }
        };

        (sender, outcome)
    };

    if let Some(sender) = sender {
        // No waiters is fine.
        let _ = sender.send(outcome);
    }
}
