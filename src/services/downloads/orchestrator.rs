use super::coalescer::ProgressCoalescer;
use super::traits::{DownloadEngine, DownloadEngineError, DownloadEngineEvent};
use super::types::{
    DownloadProgress, DownloadRequest, DownloadState, DownloadTaskId, DownloadedTrack,
    EngineTuning, PendingDownload, PlaybackSourcePreference, StorageSummary,
};
use crate::services::api::MediaUrlBuilder;
use crate::services::connectivity::{
    ConnectivityMonitor, NetworkStateProvider, DEFAULT_POLL_INTERVAL,
};
use crate::services::hydrator::MetadataHydrator;
use crate::services::notifier::{Notice, Notifier};
use crate::services::settings::SettingsStore;
use crate::types::{PlaylistId, Track, TrackId};
use std::collections::{HashMap, HashSet};
use std::mem;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

#[derive(Clone, Debug)]
pub struct DownloadOptions {
    pub tuning: EngineTuning,
    pub flush_interval: Duration,
    pub settle_window: Duration,
    pub poll_interval: Duration,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            tuning: EngineTuning::default(),
            flush_interval: Duration::from_millis(500),
            settle_window: Duration::from_millis(800),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error(transparent)]
    EngineError(#[from] DownloadEngineError),
}

#[derive(Debug)]
enum OrchestratorEvent {
    Engine(DownloadEngineEvent),
    FlushBatch(Vec<DownloadProgress>),
    WifiAvailable,
    SettleElapsed(TrackId),
}

#[derive(Default)]
struct DownloadsState {
    /// Live transfers, one row per track. Completed rows linger here for
    /// the settle window before they are cleared.
    progress: HashMap<TrackId, DownloadProgress>,
    /// Display metadata for tracks in `progress` or just submitted.
    meta: HashMap<TrackId, Track>,
    /// Admitted while off wifi, waiting for the next wifi edge.
    pending: Vec<PendingDownload>,
    /// Tracks inside their settle window.
    settling: HashSet<TrackId>,
    downloaded: Vec<DownloadedTrack>,
    downloaded_ids: HashSet<TrackId>,
    storage: StorageSummary,
}

/// Owns the download lifecycle around the platform engine: admission and
/// de-duplication, the wifi-only gate, progress coalescing, the completion
/// settle window and the downloaded/storage views.
///
/// All engine events funnel through one internal channel consumed by a
/// single spawned loop, so state transitions apply in arrival order.
pub struct DownloadOrchestrator {
    engine: Arc<dyn DownloadEngine>,
    hydrator: Arc<MetadataHydrator>,
    urls: Arc<dyn MediaUrlBuilder>,
    settings: Arc<SettingsStore>,
    notifier: Arc<dyn Notifier>,
    network: Arc<dyn NetworkStateProvider>,
    monitor: Arc<ConnectivityMonitor>,
    coalescer: ProgressCoalescer,
    options: DownloadOptions,
    state: Mutex<DownloadsState>,
    events_tx: mpsc::UnboundedSender<OrchestratorEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<OrchestratorEvent>>>,
    tasks: Mutex<Vec<actix_rt::task::JoinHandle<()>>>,
    revision: watch::Sender<u64>,
}

impl DownloadOrchestrator {
    pub fn create(
        engine: Arc<dyn DownloadEngine>,
        hydrator: Arc<MetadataHydrator>,
        urls: Arc<dyn MediaUrlBuilder>,
        settings: Arc<SettingsStore>,
        notifier: Arc<dyn Notifier>,
        network: Arc<dyn NetworkStateProvider>,
        options: DownloadOptions,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (revision, _) = watch::channel(0u64);

        let flush_tx = events_tx.clone();
        let coalescer = ProgressCoalescer::create(
            options.flush_interval,
            Arc::new(move |batch| {
                let _ = flush_tx.send(OrchestratorEvent::FlushBatch(batch));
            }),
        );

        let monitor = ConnectivityMonitor::new(Arc::clone(&network), options.poll_interval);

        Arc::new(Self {
            engine,
            hydrator,
            urls,
            settings,
            notifier,
            network,
            monitor,
            coalescer,
            options,
            state: Mutex::new(DownloadsState::default()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            tasks: Mutex::new(Vec::new()),
            revision,
        })
    }

    /// Configures the engine, seeds the live map from tasks that survived a
    /// process restart and starts the event loops. Calling it twice is a
    /// no-op.
    pub async fn activate(self: &Arc<Self>) {
        let events_rx = self.events_rx.lock().unwrap().take();
        let Some(mut events_rx) = events_rx else {
            return;
        };

        // Subscribe before seeding so a transition arriving mid-seed is
        // queued rather than lost.
        let mut engine_events = self.engine.subscribe();

        if let Err(error) = self.engine.configure(&self.options.tuning).await {
            warn!(?error, "Unable to configure the download engine");
        }

        if let Err(error) = self
            .engine
            .set_source_preference(PlaybackSourcePreference::Auto)
            .await
        {
            warn!(?error, "Unable to set the playback source preference");
        }

        if let Err(error) = self.engine.sync_downloads().await {
            warn!(?error, "Download state sync failed, continuing activation");
        }

        match self.engine.active_downloads().await {
            Ok(rows) => {
                let mut state = self.state.lock().unwrap();
                for row in rows.into_iter().filter(|row| row.state.is_active()) {
                    state.progress.insert(row.track_id.clone(), row);
                }
            }
            Err(error) => warn!(?error, "Unable to seed active downloads"),
        }

        self.refresh_views().await;
        self.backfill_metadata();

        let edge_tx = self.events_tx.clone();
        self.monitor.set_edge_callback(move || {
            let _ = edge_tx.send(OrchestratorEvent::WifiAvailable);
        });
        self.monitor.start();

        let forward_tx = self.events_tx.clone();
        let forwarder = actix_rt::spawn(async move {
            while let Some(event) = engine_events.recv().await {
                if forward_tx.send(OrchestratorEvent::Engine(event)).is_err() {
                    break;
                }
            }
        });

        let orchestrator = Arc::clone(self);
        let consumer = actix_rt::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                orchestrator.handle_event(event).await;
            }
        });

        self.tasks.lock().unwrap().extend([forwarder, consumer]);

        info!("Download orchestrator activated");
    }

    /// Stops event processing and periodic work. Views stay readable.
    pub fn deactivate(&self) {
        self.monitor.stop();
        self.coalescer.stop();

        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }

    async fn handle_event(self: &Arc<Self>, event: OrchestratorEvent) {
        match event {
            OrchestratorEvent::Engine(DownloadEngineEvent::Progress(row)) => {
                self.coalescer.push(row);
            }
            OrchestratorEvent::Engine(DownloadEngineEvent::StateChanged {
                track_id,
                task_id,
                state,
                error,
            }) => {
                self.apply_state_change(track_id, task_id, state, error);
                self.backfill_metadata();
            }
            OrchestratorEvent::Engine(DownloadEngineEvent::Completed(track)) => {
                self.notifier
                    .notify(Notice::success("Download Complete").with_subtitle(&track.title));
                self.refresh_views().await;
            }
            OrchestratorEvent::FlushBatch(batch) => {
                self.apply_progress_batch(batch);
                self.backfill_metadata();
            }
            OrchestratorEvent::WifiAvailable => {
                self.drain_pending().await;
            }
            OrchestratorEvent::SettleElapsed(track_id) => {
                self.finish_settled(track_id).await;
            }
        }
    }

    fn apply_state_change(
        &self,
        track_id: TrackId,
        task_id: DownloadTaskId,
        state: DownloadState,
        error: Option<String>,
    ) {
        match state {
            DownloadState::Pending | DownloadState::Downloading => {
                let mut guard = self.state.lock().unwrap();
                let row = guard.progress.entry(track_id.clone()).or_insert_with(|| {
                    DownloadProgress::synthetic(track_id.clone(), task_id.clone(), state)
                });
                row.state = state;
                row.task_id = task_id;
            }
            DownloadState::Paused => {
                self.coalescer.discard(&track_id);

                let mut guard = self.state.lock().unwrap();
                if let Some(row) = guard.progress.get_mut(&track_id) {
                    row.state = DownloadState::Paused;
                }
            }
            DownloadState::Cancelled | DownloadState::Failed => {
                self.coalescer.discard(&track_id);

                {
                    let mut guard = self.state.lock().unwrap();
                    guard.settling.remove(&track_id);
                    guard.progress.remove(&track_id);
                    guard.meta.remove(&track_id);
                }

                if state == DownloadState::Failed {
                    warn!(%track_id, ?error, "Download failed");
                    self.notifier.notify(Notice::error("Download Failed").with_subtitle(
                        error.unwrap_or_else(|| "The download could not be completed".to_string()),
                    ));
                }
            }
            DownloadState::Completed => {
                self.coalescer.discard(&track_id);

                let start_settle = {
                    let mut guard = self.state.lock().unwrap();
                    let first = guard.settling.insert(track_id.clone());

                    if first {
                        let row = guard.progress.entry(track_id.clone()).or_insert_with(|| {
                            DownloadProgress::synthetic(
                                track_id.clone(),
                                task_id.clone(),
                                DownloadState::Completed,
                            )
                        });
                        row.state = DownloadState::Completed;
                        row.progress = 1.0;
                    }

                    first
                };

                if start_settle {
                    let events_tx = self.events_tx.clone();
                    let settle_window = self.options.settle_window;
                    let settled_id = track_id.clone();

                    actix_rt::spawn(async move {
                        actix_rt::time::sleep(settle_window).await;
                        let _ = events_tx.send(OrchestratorEvent::SettleElapsed(settled_id));
                    });
                }
            }
        }

        self.bump_revision();
    }

    fn apply_progress_batch(&self, batch: Vec<DownloadProgress>) {
        {
            let mut guard = self.state.lock().unwrap();

            for row in batch {
                if row.state.is_terminal() {
                    // Terminal transitions are owned by the state-change
                    // path; a stale buffered sample must not resurrect the
                    // entry.
                    guard.progress.remove(&row.track_id);
                } else if !guard.settling.contains(&row.track_id) {
                    guard.progress.insert(row.track_id.clone(), row);
                }
            }
        }

        self.bump_revision();
    }

    async fn drain_pending(self: &Arc<Self>) {
        let pending = mem::take(&mut self.state.lock().unwrap().pending);

        if pending.is_empty() {
            return;
        }

        info!(count = pending.len(), "Wifi restored, starting pending downloads");

        let subtitle = if pending.len() == 1 {
            "Starting 1 pending download".to_string()
        } else {
            format!("Starting {} pending downloads", pending.len())
        };
        self.notifier
            .notify(Notice::success("Wi-Fi Connected").with_subtitle(subtitle));

        for PendingDownload { track, playlist_id } in pending {
            if let Err(error) = self.submit_track(track, playlist_id.as_ref(), false).await {
                warn!(?error, "Unable to start pending download");
            }
        }

        self.bump_revision();
    }

    async fn finish_settled(&self, track_id: TrackId) {
        {
            let mut guard = self.state.lock().unwrap();

            if !guard.settling.remove(&track_id) {
                return;
            }

            guard.progress.remove(&track_id);
            guard.meta.remove(&track_id);
        }

        self.refresh_views().await;
    }

    /// Admits one track. Duplicate requests, already-downloaded tracks and
    /// wifi-gated requests all resolve to `Ok` with a notice; only an
    /// engine submission failure is an `Err`.
    pub async fn download_track(
        &self,
        track: Track,
        playlist_id: Option<PlaylistId>,
    ) -> Result<(), DownloadError> {
        let track_id = track.id.clone();

        if self
            .engine
            .is_track_downloaded(&track_id)
            .await
            .unwrap_or(false)
        {
            self.notifier
                .notify(Notice::info("Already Downloaded").with_subtitle(&track.title));
            return Ok(());
        }

        let engine_active = self.engine.is_downloading(&track_id).await.unwrap_or(false);
        let locally_known = {
            let guard = self.state.lock().unwrap();
            guard.progress.contains_key(&track_id) || guard.meta.contains_key(&track_id)
        };

        if engine_active || locally_known {
            self.notifier
                .notify(Notice::info("Already Downloading").with_subtitle(&track.title));
            return Ok(());
        }

        if self.settings.current().wifi_only_downloads && !self.wifi_available_now().await {
            self.monitor.mark_off_wifi();

            self.state
                .lock()
                .unwrap()
                .pending
                .push(PendingDownload { track, playlist_id });
            self.bump_revision();

            self.notifier.notify(
                Notice::info("Wi-Fi Only Mode")
                    .with_subtitle("Download will start when connected to Wi-Fi"),
            );
            return Ok(());
        }

        self.submit_track(track, playlist_id.as_ref(), true).await
    }

    /// Resolves the id through the hydrator first. `Ok(false)` means the
    /// server does not know the track.
    pub async fn download_track_by_id(&self, track_id: &TrackId) -> Result<bool, DownloadError> {
        match self.hydrator.resolve(track_id).await {
            Some(track) => {
                self.download_track(track, None).await?;
                Ok(true)
            }
            None => {
                warn!(%track_id, "Track to download could not be resolved");
                Ok(false)
            }
        }
    }

    pub async fn download_playlist(
        &self,
        playlist_id: PlaylistId,
        tracks: Vec<Track>,
    ) -> Result<(), DownloadError> {
        let total = tracks.len();
        let mut wanted = Vec::new();

        for track in tracks {
            if self
                .engine
                .is_track_downloaded(&track.id)
                .await
                .unwrap_or(false)
            {
                continue;
            }

            if self.engine.is_downloading(&track.id).await.unwrap_or(false) {
                continue;
            }

            wanted.push(track);
        }

        if wanted.is_empty() {
            self.notifier.notify(
                Notice::info("Already Downloaded")
                    .with_subtitle(format!("All {total} tracks are downloaded")),
            );
            return Ok(());
        }

        if self.settings.current().wifi_only_downloads && !self.wifi_available_now().await {
            self.monitor.mark_off_wifi();

            let count = wanted.len();
            {
                let mut guard = self.state.lock().unwrap();
                guard
                    .pending
                    .extend(wanted.into_iter().map(|track| PendingDownload {
                        track,
                        playlist_id: Some(playlist_id.clone()),
                    }));
            }
            self.bump_revision();

            let subtitle = if count == 1 {
                "1 download will start when connected to Wi-Fi".to_string()
            } else {
                format!("{count} downloads will start when connected to Wi-Fi")
            };
            self.notifier
                .notify(Notice::info("Wi-Fi Only Mode").with_subtitle(subtitle));
            return Ok(());
        }

        {
            let mut guard = self.state.lock().unwrap();
            wanted.retain(|track| {
                !guard.progress.contains_key(&track.id) && !guard.meta.contains_key(&track.id)
            });

            for track in &wanted {
                guard.meta.insert(track.id.clone(), track.clone());
            }
        }

        if wanted.is_empty() {
            self.notifier.notify(Notice::info("Already Downloading"));
            return Ok(());
        }

        self.bump_revision();

        let skipped = total - wanted.len();
        let requests: Vec<DownloadRequest> =
            wanted.iter().map(|track| self.build_request(track)).collect();
        let ids: Vec<TrackId> = wanted.iter().map(|track| track.id.clone()).collect();

        match self.engine.download_playlist(&playlist_id, requests).await {
            Ok(()) => {
                info!(%playlist_id, count = ids.len(), "Playlist download submitted");

                let subtitle = if skipped > 0 {
                    format!("{} tracks ({skipped} already downloaded)", ids.len())
                } else {
                    format!("{} tracks", ids.len())
                };
                self.notifier
                    .notify(Notice::info("Downloading").with_subtitle(subtitle));
                Ok(())
            }
            Err(error) => {
                error!(%playlist_id, ?error, "Unable to submit playlist download");

                {
                    let mut guard = self.state.lock().unwrap();
                    for id in &ids {
                        guard.meta.remove(id);
                    }
                }
                self.bump_revision();

                self.notifier.notify(
                    Notice::error("Download Error")
                        .with_subtitle("The playlist download could not be started"),
                );
                Err(error.into())
            }
        }
    }

    /// Final admission step. The re-check and the speculative meta insert
    /// happen under one lock, so two racing calls for the same track
    /// produce exactly one engine submission.
    async fn submit_track(
        &self,
        track: Track,
        playlist_id: Option<&PlaylistId>,
        announce: bool,
    ) -> Result<(), DownloadError> {
        let request = self.build_request(&track);
        let track_id = track.id.clone();
        let title = track.title.clone();

        let admitted = {
            let mut guard = self.state.lock().unwrap();

            if guard.progress.contains_key(&track_id) || guard.meta.contains_key(&track_id) {
                false
            } else {
                guard.meta.insert(track_id.clone(), track);
                true
            }
        };

        if !admitted {
            if announce {
                self.notifier
                    .notify(Notice::info("Already Downloading").with_subtitle(title));
            }
            return Ok(());
        }

        self.bump_revision();

        match self.engine.download_track(request, playlist_id).await {
            Ok(()) => {
                info!(%track_id, "Download submitted");

                if announce {
                    self.notifier
                        .notify(Notice::info("Downloading").with_subtitle(title));
                }
                Ok(())
            }
            Err(error) => {
                error!(%track_id, ?error, "Unable to submit download");

                self.state.lock().unwrap().meta.remove(&track_id);
                self.bump_revision();

                self.notifier.notify(
                    Notice::error("Download Error")
                        .with_subtitle("The download could not be started"),
                );
                Err(error.into())
            }
        }
    }

    fn build_request(&self, track: &Track) -> DownloadRequest {
        let overrides = self.settings.current().download_overrides();

        DownloadRequest {
            track_id: track.id.clone(),
            title: track.title.clone(),
            artist: track.artist.clone(),
            album: track.album.clone(),
            duration_secs: track.duration_secs,
            url: self.urls.stream_url(&track.id, &overrides),
            artwork_url: Some(self.urls.cover_art_url(track.artwork_ref())),
        }
    }

    async fn wifi_available_now(&self) -> bool {
        match self.network.network_type().await {
            Ok(network_type) => network_type.is_wifi(),
            Err(error) => {
                // An unreadable radio must not strand the request.
                warn!(?error, "Unable to query network state, admitting download");
                true
            }
        }
    }

    pub async fn delete_track(&self, track_id: &TrackId) -> Result<(), DownloadError> {
        self.engine.delete_track(track_id).await?;
        info!(%track_id, "Downloaded track deleted");
        self.refresh_views().await;
        Ok(())
    }

    pub async fn delete_all(&self) -> Result<(), DownloadError> {
        self.engine.delete_all().await?;
        info!("All downloaded tracks deleted");
        self.refresh_views().await;
        Ok(())
    }

    /// Pause takes effect when the engine confirms through a state-change
    /// event; local state is not touched here.
    pub async fn pause_download(&self, task_id: &DownloadTaskId) -> Result<(), DownloadError> {
        if let Err(error) = self.engine.pause_download(task_id).await {
            error!(%task_id, ?error, "Unable to pause download");
            self.notifier.notify(Notice::error("Pause Failed"));
            return Err(error.into());
        }

        Ok(())
    }

    pub async fn resume_download(&self, task_id: &DownloadTaskId) -> Result<(), DownloadError> {
        if let Err(error) = self.engine.resume_download(task_id).await {
            error!(%task_id, ?error, "Unable to resume download");
            self.notifier.notify(Notice::error("Resume Failed"));
            return Err(error.into());
        }

        Ok(())
    }

    pub async fn cancel_download(&self, task_id: &DownloadTaskId) -> Result<(), DownloadError> {
        if let Err(error) = self.engine.cancel_download(task_id).await {
            error!(%task_id, ?error, "Unable to cancel download");
            self.notifier.notify(Notice::error("Cancel Failed"));
            return Err(error.into());
        }

        Ok(())
    }

    pub async fn retry_download(&self, task_id: &DownloadTaskId) -> Result<(), DownloadError> {
        if let Err(error) = self.engine.retry_download(task_id).await {
            error!(%task_id, ?error, "Unable to retry download");
            self.notifier.notify(Notice::error("Retry Failed"));
            return Err(error.into());
        }

        Ok(())
    }

    /// Re-reads the downloaded set and the storage summary from the engine.
    pub async fn refresh_views(&self) {
        match self.engine.downloaded_tracks().await {
            Ok(tracks) => {
                let mut guard = self.state.lock().unwrap();
                guard.downloaded_ids = tracks.iter().map(|row| row.track_id.clone()).collect();
                guard.downloaded = tracks;
            }
            Err(error) => warn!(?error, "Unable to refresh downloaded tracks"),
        }

        match self.engine.storage_summary().await {
            Ok(summary) => self.state.lock().unwrap().storage = summary,
            Err(error) => warn!(?error, "Unable to refresh storage summary"),
        }

        self.bump_revision();
    }

    /// Fetches display metadata for live rows that are missing it, e.g.
    /// transfers restored from a previous process.
    fn backfill_metadata(self: &Arc<Self>) {
        let missing: Vec<TrackId> = {
            let guard = self.state.lock().unwrap();
            guard
                .progress
                .keys()
                .filter(|id| !guard.meta.contains_key(*id))
                .cloned()
                .collect()
        };

        if missing.is_empty() {
            return;
        }

        let orchestrator = Arc::clone(self);
        actix_rt::spawn(async move {
            let mut changed = false;

            for track_id in missing {
                let Some(track) = orchestrator.hydrator.resolve(&track_id).await else {
                    continue;
                };

                let mut guard = orchestrator.state.lock().unwrap();
                // The transfer may have ended while we were fetching.
                if guard.progress.contains_key(&track_id) {
                    guard.meta.insert(track_id, track);
                    changed = true;
                }
            }

            if changed {
                orchestrator.bump_revision();
            }
        });
    }

    pub fn is_track_downloaded(&self, track_id: &TrackId) -> bool {
        self.state.lock().unwrap().downloaded_ids.contains(track_id)
    }

    pub fn track_progress(&self, track_id: &TrackId) -> Option<DownloadProgress> {
        self.state.lock().unwrap().progress.get(track_id).cloned()
    }

    pub fn downloading_meta(&self, track_id: &TrackId) -> Option<Track> {
        self.state.lock().unwrap().meta.get(track_id).cloned()
    }

    /// True while at least one transfer is actually moving bytes. Pending
    /// and paused rows do not count.
    pub fn is_downloading(&self) -> bool {
        self.state
            .lock()
            .unwrap()
            .progress
            .values()
            .any(|row| row.state == DownloadState::Downloading)
    }

    pub fn active_downloads(&self) -> Vec<DownloadProgress> {
        let guard = self.state.lock().unwrap();
        let mut rows: Vec<DownloadProgress> = guard
            .progress
            .values()
            .filter(|row| row.state.is_active())
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.track_id.as_str().cmp(b.track_id.as_str()));
        rows
    }

    pub fn downloaded_tracks(&self) -> Vec<DownloadedTrack> {
        self.state.lock().unwrap().downloaded.clone()
    }

    pub fn storage_summary(&self) -> StorageSummary {
        self.state.lock().unwrap().storage
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    pub fn wifi_only_blocked(&self) -> bool {
        self.settings.current().wifi_only_downloads && !self.monitor.is_on_wifi()
    }

    pub fn is_on_wifi(&self) -> bool {
        self.monitor.is_on_wifi()
    }

    /// Counter that increments whenever any view may have changed. Drop the
    /// receiver to unsubscribe.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn bump_revision(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}
