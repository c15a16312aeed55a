use super::traits::{EnginePlaylistId, PlayerEngine, PlayerEngineError, PlayerEngineEvent};
use super::types::{
    ClearConfirmOptions, PersistedQueue, PlayerTrack, QueueItem, QueueItemId, QueueSource,
    RepeatMode, ReplaceOptions, StarToggle,
};
use crate::services::api::{ApiClient, MediaUrlBuilder};
use crate::services::hydrator::MetadataHydrator;
use crate::services::notifier::{ConfirmRequest, Notice, Notifier};
use crate::services::settings::SettingsStore;
use crate::storage::KeyValueStorage;
use crate::types::{Track, TrackId};
use chrono::Utc;
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

const QUEUE_PLAYLIST_NAME: &str = "player-queue";
const QUEUE_STATE_PREFIX: &str = "queue-state";
const QUEUE_STATE_KEY: &str = "current";

/// Past this point into a track, "back" restarts it instead of moving to
/// the previous row.
const RESTART_TRACK_AFTER: Duration = Duration::from_secs(5);
const CLEAR_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error(transparent)]
    EngineError(#[from] PlayerEngineError),
}

#[derive(Default)]
struct QueueState {
    /// Derived cache of the engine's queue, enriched with full tracks.
    items: Vec<QueueItem>,
    /// Track behind each live instance id; engine rows only carry display
    /// fields.
    item_tracks: HashMap<QueueItemId, Track>,
    active_index: usize,
    now_playing: Option<QueueItem>,
    source: QueueSource,
    repeat_mode: RepeatMode,
    engine_playlist: Option<EnginePlaylistId>,
    position: Duration,
}

/// Keeps the logical queue and the playback engine's queue in step. Local
/// mutations are optimistic; every operation finishes by re-deriving the
/// views from the engine, and the engine's track-change event overrides
/// any optimistic guess.
pub struct QueueReconciler {
    engine: Arc<dyn PlayerEngine>,
    api: Arc<dyn ApiClient>,
    hydrator: Arc<MetadataHydrator>,
    urls: Arc<dyn MediaUrlBuilder>,
    settings: Arc<SettingsStore>,
    notifier: Arc<dyn Notifier>,
    storage: Arc<dyn KeyValueStorage>,
    /// Serializes mutating operations so a slow engine call cannot
    /// interleave with the next user action.
    op_lock: async_lock::Mutex<()>,
    state: Mutex<QueueState>,
    activated: AtomicBool,
    tasks: Mutex<Vec<actix_rt::task::JoinHandle<()>>>,
    revision: watch::Sender<u64>,
}

impl QueueReconciler {
    pub fn create(
        engine: Arc<dyn PlayerEngine>,
        api: Arc<dyn ApiClient>,
        hydrator: Arc<MetadataHydrator>,
        urls: Arc<dyn MediaUrlBuilder>,
        settings: Arc<SettingsStore>,
        notifier: Arc<dyn Notifier>,
        storage: Arc<dyn KeyValueStorage>,
    ) -> Arc<Self> {
        let (revision, _) = watch::channel(0u64);

        Arc::new(Self {
            engine,
            api,
            hydrator,
            urls,
            settings,
            notifier,
            storage,
            op_lock: async_lock::Mutex::new(()),
            state: Mutex::new(QueueState::default()),
            activated: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            revision,
        })
    }

    /// Starts the engine event consumer and attempts a queue restore when
    /// persistence is enabled. Calling it twice is a no-op.
    pub async fn activate(self: &Arc<Self>) {
        if self.activated.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut engine_events = self.engine.subscribe();
        let reconciler = Arc::clone(self);
        let consumer = actix_rt::spawn(async move {
            while let Some(event) = engine_events.recv().await {
                reconciler.handle_event(event).await;
            }
        });

        let mut settings_rx = self.settings.subscribe();
        let watcher_self = Arc::clone(self);
        let watcher = actix_rt::spawn(async move {
            let mut persist = settings_rx.borrow().persist_queue;

            while settings_rx.changed().await.is_ok() {
                let now = settings_rx.borrow().persist_queue;

                if persist && !now {
                    if let Err(error) = watcher_self
                        .storage
                        .delete(QUEUE_STATE_PREFIX, QUEUE_STATE_KEY)
                        .await
                    {
                        warn!(?error, "Unable to clear the persisted queue");
                    }
                }

                persist = now;
            }
        });

        self.tasks.lock().unwrap().extend([consumer, watcher]);

        if self.settings.current().persist_queue {
            self.try_restore().await;
        }

        info!("Playback queue reconciler activated");
    }

    pub fn deactivate(&self) {
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }

    async fn handle_event(&self, event: PlayerEngineEvent) {
        match event {
            PlayerEngineEvent::TrackChanged => {
                let _guard = self.op_lock.lock().await;

                self.refresh_active().await;
                self.refresh_now_playing(true).await;
                self.persist_if_enabled().await;
                self.bump_revision();
            }
            PlayerEngineEvent::PositionChanged(position) => {
                self.state.lock().unwrap().position = position;
            }
        }
    }

    /// Replaces the whole queue. The engine playlist is torn down and
    /// rebuilt; playback starts at `initial_index`.
    pub async fn replace(
        &self,
        tracks: Vec<Track>,
        options: ReplaceOptions,
    ) -> Result<(), QueueError> {
        let _guard = self.op_lock.lock().await;
        self.replace_locked(tracks, options).await
    }

    async fn replace_locked(
        &self,
        mut tracks: Vec<Track>,
        options: ReplaceOptions,
    ) -> Result<(), QueueError> {
        if options.shuffle {
            tracks.shuffle(&mut rand::thread_rng());
        }

        self.state.lock().unwrap().source = options.source.clone().unwrap_or_default();

        let items: Vec<QueueItem> = tracks
            .into_iter()
            .map(|track| self.build_item(track))
            .collect();
        let initial = options.initial_index.min(items.len().saturating_sub(1));

        self.load_items(&items).await?;

        if initial > 0 {
            self.engine.skip_to_index(initial).await?;
        }

        self.engine.play().await?;

        // Optimistic; the engine's track-change event confirms or corrects.
        self.set_now_playing(items.get(initial).cloned(), true);
        self.state.lock().unwrap().active_index = initial;

        self.reconcile_views().await;
        self.persist_if_enabled().await;
        self.bump_revision();

        Ok(())
    }

    /// Appends a track. An empty queue behaves like `replace` with a
    /// singleton list. `Ok(false)` means the id did not resolve.
    pub async fn add(&self, track_id: &TrackId) -> Result<bool, QueueError> {
        let _guard = self.op_lock.lock().await;

        let Some(track) = self.hydrator.resolve(track_id).await else {
            warn!(%track_id, "Track to enqueue could not be resolved");
            return Ok(false);
        };

        if self.state.lock().unwrap().items.is_empty() {
            self.replace_locked(vec![track], ReplaceOptions::default())
                .await?;
            return Ok(true);
        }

        let item = self.build_item(track);
        let playlist_id = self.current_playlist().await?;

        self.state
            .lock()
            .unwrap()
            .item_tracks
            .insert(item.id.clone(), item.track.clone());

        if let Err(error) = self
            .engine
            .add_track(&playlist_id, item.to_player_track())
            .await
        {
            // The row never reached the engine; drop the speculative entry.
            self.state.lock().unwrap().item_tracks.remove(&item.id);
            return Err(error.into());
        }

        self.reconcile_views().await;
        self.persist_if_enabled().await;
        self.bump_revision();

        Ok(true)
    }

    /// Appends a track and splices it right after the playing row.
    pub async fn play_next(&self, track_id: &TrackId) -> Result<bool, QueueError> {
        let _guard = self.op_lock.lock().await;

        let Some(track) = self.hydrator.resolve(track_id).await else {
            warn!(%track_id, "Track to enqueue could not be resolved");
            return Ok(false);
        };

        if self.state.lock().unwrap().items.is_empty() {
            self.replace_locked(vec![track], ReplaceOptions::default())
                .await?;
            return Ok(true);
        }

        let item = self.build_item(track);
        let playlist_id = self.current_playlist().await?;

        self.state
            .lock()
            .unwrap()
            .item_tracks
            .insert(item.id.clone(), item.track.clone());

        if let Err(error) = self
            .engine
            .add_track(&playlist_id, item.to_player_track())
            .await
        {
            // The row never reached the engine; drop the speculative entry.
            self.state.lock().unwrap().item_tracks.remove(&item.id);
            return Err(error.into());
        }
        self.engine.play_next(&item.id).await?;

        self.reconcile_views().await;
        self.persist_if_enabled().await;
        self.bump_revision();

        Ok(true)
    }

    pub async fn play_track_now(&self, track_id: &TrackId) -> Result<bool, QueueError> {
        let _guard = self.op_lock.lock().await;

        let Some(track) = self.hydrator.resolve(track_id).await else {
            warn!(%track_id, "Track to play could not be resolved");
            self.notifier.notify(
                Notice::error("Track Not Found")
                    .with_subtitle("The track is not available on the server"),
            );
            return Ok(false);
        };

        self.replace_locked(vec![track], ReplaceOptions::default())
            .await?;
        Ok(true)
    }

    /// Bulk edit from the UI. The playing row is matched by instance id
    /// against the new list, and playback re-skips to its new position
    /// when it survived the edit.
    pub async fn set_queue(&self, items: Vec<QueueItem>) -> Result<(), QueueError> {
        let _guard = self.op_lock.lock().await;

        let playing_id = self
            .state
            .lock()
            .unwrap()
            .now_playing
            .as_ref()
            .map(|item| item.id.clone());
        let target_index =
            playing_id.and_then(|id| items.iter().position(|item| item.id == id));

        self.load_items(&items).await?;

        if let Some(index) = target_index {
            self.engine.skip_to_index(index).await?;
            self.state.lock().unwrap().active_index = index;
        }

        self.reconcile_views().await;
        self.persist_if_enabled().await;
        self.bump_revision();

        Ok(())
    }

    pub async fn reorder(&self, from: usize, to: usize) -> Result<(), QueueError> {
        let _guard = self.op_lock.lock().await;

        let moved = {
            let state = self.state.lock().unwrap();

            if from >= state.items.len() || to >= state.items.len() || from == to {
                None
            } else {
                state
                    .engine_playlist
                    .clone()
                    .map(|playlist_id| (playlist_id, state.items[from].id.clone()))
            }
        };

        let Some((playlist_id, item_id)) = moved else {
            return Ok(());
        };

        self.engine.reorder_track(&playlist_id, &item_id, to).await?;

        self.reconcile_views().await;
        self.persist_if_enabled().await;
        self.bump_revision();

        Ok(())
    }

    pub async fn jump_to(&self, index: usize) -> Result<(), QueueError> {
        let _guard = self.op_lock.lock().await;

        self.engine.skip_to_index(index).await?;

        self.refresh_active().await;
        self.refresh_now_playing(true).await;
        self.persist_if_enabled().await;
        self.bump_revision();

        Ok(())
    }

    pub async fn skip_forward(&self) -> Result<(), QueueError> {
        let _guard = self.op_lock.lock().await;

        self.engine.skip_to_next().await?;

        self.refresh_active().await;
        self.refresh_now_playing(true).await;
        self.persist_if_enabled().await;
        self.bump_revision();

        Ok(())
    }

    /// Restarts the track once it is meaningfully into playback, otherwise
    /// moves to the previous row.
    pub async fn skip_backward(&self) -> Result<(), QueueError> {
        let _guard = self.op_lock.lock().await;

        let position = self.state.lock().unwrap().position;

        if position > RESTART_TRACK_AFTER {
            self.engine.seek_to(Duration::ZERO).await?;
            self.state.lock().unwrap().position = Duration::ZERO;
            self.bump_revision();
            return Ok(());
        }

        self.engine.skip_to_previous().await?;

        self.refresh_active().await;
        self.refresh_now_playing(true).await;
        self.persist_if_enabled().await;
        self.bump_revision();

        Ok(())
    }

    pub async fn clear(&self) -> Result<(), QueueError> {
        let _guard = self.op_lock.lock().await;
        self.clear_locked().await
    }

    /// Interactive clear. Resolves to `Ok(false)` when the prompt is
    /// dismissed.
    pub async fn clear_confirm(&self, options: ClearConfirmOptions) -> Result<bool, QueueError> {
        let confirmed = self
            .notifier
            .confirm(ConfirmRequest {
                title: "Clear Queue".to_string(),
                message: "Remove all tracks from the queue?".to_string(),
                confirm_label: "Clear".to_string(),
                destructive: true,
            })
            .await;

        if !confirmed {
            return Ok(false);
        }

        let _guard = self.op_lock.lock().await;

        if options.wait {
            if let Err(error) = self.engine.pause().await {
                warn!(?error, "Unable to pause before clearing the queue");
            }

            if let Some(on_confirm) = options.on_confirm {
                on_confirm();
            }

            actix_rt::time::sleep(CLEAR_DELAY).await;
        } else if let Some(on_confirm) = options.on_confirm {
            on_confirm();
        }

        self.clear_locked().await?;

        Ok(true)
    }

    async fn clear_locked(&self) -> Result<(), QueueError> {
        if let Err(error) = self.engine.pause().await {
            warn!(?error, "Unable to pause before clearing the queue");
        }

        self.load_items(&[]).await?;

        {
            let mut state = self.state.lock().unwrap();
            state.active_index = 0;
            state.now_playing = None;
            state.source = QueueSource::default();
            state.position = Duration::ZERO;
        }

        self.persist_if_enabled().await;
        self.bump_revision();

        Ok(())
    }

    pub async fn set_repeat_mode(&self, mode: RepeatMode) -> Result<(), QueueError> {
        let _guard = self.op_lock.lock().await;
        self.set_repeat_mode_locked(mode).await
    }

    pub async fn cycle_repeat_mode(&self) -> Result<RepeatMode, QueueError> {
        let _guard = self.op_lock.lock().await;

        let next = self.state.lock().unwrap().repeat_mode.next();
        self.set_repeat_mode_locked(next).await?;

        Ok(next)
    }

    async fn set_repeat_mode_locked(&self, mode: RepeatMode) -> Result<(), QueueError> {
        self.state.lock().unwrap().repeat_mode = mode;
        self.bump_revision();

        self.engine.set_repeat_mode(mode).await?;

        self.persist_if_enabled().await;
        Ok(())
    }

    /// Flips the starred flag on the playing track and every queue row
    /// with the same track id, then reports it to the server. The flip is
    /// kept even when the server call fails; the outcome says which case
    /// occurred. `None` when nothing is playing.
    pub async fn toggle_star(&self) -> Option<StarToggle> {
        let _guard = self.op_lock.lock().await;

        let (track_id, starring) = {
            let mut state = self.state.lock().unwrap();

            let playing = state.now_playing.as_ref()?;
            let track_id = playing.track.id.clone();
            let starring = playing.track.starred.is_none();
            let stamp = starring.then(Utc::now);

            if let Some(item) = state.now_playing.as_mut() {
                item.track.starred = stamp;
            }

            for item in state
                .items
                .iter_mut()
                .filter(|item| item.track.id == track_id)
            {
                item.track.starred = stamp;
            }

            for track in state
                .item_tracks
                .values_mut()
                .filter(|track| track.id == track_id)
            {
                track.starred = stamp;
            }

            (track_id, starring)
        };

        self.bump_revision();

        match self.api.set_starred(&track_id, starring).await {
            Ok(()) => {
                info!(%track_id, starred = starring, "Star toggled");
                self.hydrator.refresh(&track_id).await;
                Some(StarToggle::Confirmed { starred: starring })
            }
            Err(error) => {
                error!(%track_id, ?error, "Unable to toggle star");
                self.notifier.notify(
                    Notice::error("Error")
                        .with_subtitle("An error occurred while liking the track"),
                );
                Some(StarToggle::Unconfirmed { starred: starring })
            }
        }
    }

    fn build_item(&self, track: Track) -> QueueItem {
        let overrides = self.settings.current().streaming_overrides();

        QueueItem {
            id: QueueItemId::new(),
            url: self.urls.stream_url(&track.id, &overrides),
            artwork_url: self.urls.cover_art_url(track.artwork_ref()),
            track,
        }
    }

    /// Tears down the previous engine playlist and loads a fresh one with
    /// the given rows.
    async fn load_items(&self, items: &[QueueItem]) -> Result<(), QueueError> {
        let old_playlist = self.state.lock().unwrap().engine_playlist.take();

        if let Some(playlist_id) = old_playlist {
            if let Err(error) = self.engine.delete_playlist(&playlist_id).await {
                debug!(?error, "Unable to delete the previous engine playlist");
            }
        }

        let playlist_id = self.engine.create_playlist(QUEUE_PLAYLIST_NAME).await?;

        let rows: Vec<PlayerTrack> = items.iter().map(QueueItem::to_player_track).collect();
        self.engine.add_tracks(&playlist_id, rows).await?;
        self.engine.load_playlist(&playlist_id).await?;

        let mut state = self.state.lock().unwrap();
        state.engine_playlist = Some(playlist_id);
        state.items = items.to_vec();
        state.item_tracks = items
            .iter()
            .map(|item| (item.id.clone(), item.track.clone()))
            .collect();

        Ok(())
    }

    async fn current_playlist(&self) -> Result<EnginePlaylistId, QueueError> {
        let existing = self.state.lock().unwrap().engine_playlist.clone();

        if let Some(playlist_id) = existing {
            return Ok(playlist_id);
        }

        let playlist_id = self.engine.create_playlist(QUEUE_PLAYLIST_NAME).await?;
        self.state.lock().unwrap().engine_playlist = Some(playlist_id.clone());

        Ok(playlist_id)
    }

    async fn reconcile_views(&self) {
        self.refresh_queue().await;
        self.refresh_active().await;
    }

    /// Rebuilds the item list from the engine's authoritative queue,
    /// enriching rows with locally-known tracks.
    async fn refresh_queue(&self) {
        let rows = match self.engine.queue().await {
            Ok(rows) => rows,
            Err(error) => {
                warn!(?error, "Unable to re-derive the queue from the engine");
                return;
            }
        };

        let mut state = self.state.lock().unwrap();

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let track = match state.item_tracks.get(&row.id) {
                Some(track) => track.clone(),
                None => track_from_row(&row),
            };

            items.push(QueueItem {
                id: row.id.clone(),
                url: row.url,
                artwork_url: row.artwork_url,
                track,
            });
        }

        let keep: HashSet<QueueItemId> = items
            .iter()
            .map(|item| item.id.clone())
            .chain(state.now_playing.as_ref().map(|item| item.id.clone()))
            .collect();
        state.item_tracks.retain(|id, _| keep.contains(id));
        state.items = items;
    }

    /// Clamped to the derived queue: `state()` and `queue()` can observe
    /// different engine snapshots, and a torn read must not expose an
    /// out-of-range index.
    async fn refresh_active(&self) {
        match self.engine.state().await {
            Ok(player_state) => {
                let mut state = self.state.lock().unwrap();
                let limit = state.items.len().saturating_sub(1);
                state.active_index = player_state.current_index.unwrap_or(0).min(limit);
            }
            Err(error) => warn!(?error, "Unable to re-derive the active index"),
        }
    }

    async fn refresh_now_playing(&self, scrobble: bool) {
        let player_state = match self.engine.state().await {
            Ok(player_state) => player_state,
            Err(error) => {
                warn!(?error, "Unable to re-derive the playing track");
                return;
            }
        };

        let rows = match self.engine.queue().await {
            Ok(rows) => rows,
            Err(error) => {
                warn!(?error, "Unable to re-derive the playing track");
                return;
            }
        };

        let next = rows
            .get(player_state.current_index.unwrap_or(0))
            .map(|row| self.enrich_row(row));

        self.set_now_playing(next, scrobble);
    }

    fn enrich_row(&self, row: &PlayerTrack) -> QueueItem {
        let state = self.state.lock().unwrap();
        let track = state
            .item_tracks
            .get(&row.id)
            .cloned()
            .unwrap_or_else(|| track_from_row(row));

        QueueItem {
            id: row.id.clone(),
            url: row.url.clone(),
            artwork_url: row.artwork_url.clone(),
            track,
        }
    }

    /// Updates now-playing and, when asked to, scrobbles a move to a
    /// different track. The scrobble is fire-and-forget. Restores pass
    /// `scrobble: false` so a relaunch never re-reports the last track.
    fn set_now_playing(&self, next: Option<QueueItem>, scrobble: bool) {
        let changed_to = {
            let mut state = self.state.lock().unwrap();
            let previous = state.now_playing.as_ref().map(|item| item.track.id.clone());
            let current = next.as_ref().map(|item| item.track.id.clone());
            state.now_playing = next;

            match current {
                Some(track_id) if scrobble && previous.as_ref() != Some(&track_id) => {
                    Some(track_id)
                }
                _ => None,
            }
        };

        if let Some(track_id) = changed_to {
            let api = Arc::clone(&self.api);
            actix_rt::spawn(async move {
                match api.scrobble(&track_id).await {
                    Ok(()) => debug!(%track_id, "Track scrobbled"),
                    Err(error) => warn!(%track_id, ?error, "Unable to scrobble the track"),
                }
            });
        }

        self.bump_revision();
    }

    async fn persist_if_enabled(&self) {
        if !self.settings.current().persist_queue {
            return;
        }

        let persisted = {
            let state = self.state.lock().unwrap();
            PersistedQueue {
                tracks: state.items.iter().map(|item| item.track.clone()).collect(),
                active_index: state.active_index,
                source: state.source.clone(),
                repeat_mode: state.repeat_mode,
            }
        };

        let raw = match serde_json::to_string(&persisted) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(?error, "Unable to serialize the queue");
                return;
            }
        };

        if let Err(error) = self
            .storage
            .save(QUEUE_STATE_PREFIX, QUEUE_STATE_KEY, &raw)
            .await
        {
            warn!(?error, "Unable to persist the queue");
        }
    }

    /// Best-effort restore of the persisted queue. Only runs against an
    /// engine whose queue is empty; never starts playback.
    async fn try_restore(&self) {
        let _guard = self.op_lock.lock().await;

        match self.engine.queue().await {
            Ok(rows) if rows.is_empty() => {}
            Ok(_) => {
                // The engine kept its queue across our restart; re-derive
                // instead of overwriting it.
                self.reconcile_views().await;
                self.refresh_now_playing(false).await;
                self.bump_revision();
                return;
            }
            Err(error) => {
                warn!(?error, "Unable to inspect the engine queue before restore");
                return;
            }
        }

        let raw = match self.storage.get(QUEUE_STATE_PREFIX, QUEUE_STATE_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(error) => {
                warn!(?error, "Unable to read the persisted queue");
                return;
            }
        };

        let persisted: PersistedQueue = match serde_json::from_str(&raw) {
            Ok(persisted) => persisted,
            Err(error) => {
                warn!(?error, "Ignoring a malformed persisted queue");
                return;
            }
        };

        if persisted.tracks.is_empty() {
            return;
        }

        let items: Vec<QueueItem> = persisted
            .tracks
            .into_iter()
            .map(|track| self.build_item(track))
            .collect();
        let index = persisted.active_index.min(items.len() - 1);

        if let Err(error) = self.load_items(&items).await {
            warn!(?error, "Unable to restore the persisted queue");
            return;
        }

        if index > 0 {
            if let Err(error) = self.engine.skip_to_index(index).await {
                warn!(?error, "Unable to restore the queue position");
            }
        }

        {
            let mut state = self.state.lock().unwrap();
            state.active_index = index;
            state.source = persisted.source;
            state.repeat_mode = persisted.repeat_mode;
            // No scrobble for a restored row; nothing is playing yet.
            state.now_playing = state.items.get(index).cloned();
        }

        if let Err(error) = self.engine.set_repeat_mode(persisted.repeat_mode).await {
            warn!(?error, "Unable to restore the repeat mode");
        }

        self.reconcile_views().await;
        self.bump_revision();

        info!(count = items.len(), "Queue restored");
    }

    pub fn queue(&self) -> Vec<QueueItem> {
        self.state.lock().unwrap().items.clone()
    }

    pub fn now_playing(&self) -> Option<QueueItem> {
        self.state.lock().unwrap().now_playing.clone()
    }

    pub fn active_index(&self) -> usize {
        self.state.lock().unwrap().active_index
    }

    pub fn source(&self) -> QueueSource {
        self.state.lock().unwrap().source.clone()
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.state.lock().unwrap().repeat_mode
    }

    pub fn position(&self) -> Duration {
        self.state.lock().unwrap().position
    }

    pub fn can_go_forward(&self) -> bool {
        let state = self.state.lock().unwrap();

        if state.items.is_empty() {
            return false;
        }

        state.active_index + 1 < state.items.len() || state.repeat_mode == RepeatMode::Queue
    }

    pub fn can_go_backward(&self) -> bool {
        self.state.lock().unwrap().now_playing.is_some()
    }

    #[cfg(test)]
    pub(crate) fn tracked_item_count(&self) -> usize {
        self.state.lock().unwrap().item_tracks.len()
    }

    /// Counter that increments whenever any view may have changed. Drop
    /// the receiver to unsubscribe.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn bump_revision(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

/// Fallback when a row arrives for an instance id we never enriched, e.g.
/// a queue the engine kept across a process restart.
fn track_from_row(row: &PlayerTrack) -> Track {
    Track {
        id: row.track_id.clone(),
        title: row.title.clone(),
        artist: row.artist.clone(),
        album: row.album.clone(),
        duration_secs: row.duration_secs,
        cover_art: None,
        starred: None,
    }
}
