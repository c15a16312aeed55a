mod coalescer;
mod orchestrator;
mod traits;
mod types;

pub use orchestrator::{DownloadError, DownloadOptions, DownloadOrchestrator};
pub use traits::{DownloadEngine, DownloadEngineError, DownloadEngineEvent};
pub use types::{
    DownloadProgress, DownloadRequest, DownloadState, DownloadTaskId, DownloadedTrack,
    EngineTuning, PendingDownload, PlaybackSourcePreference, StorageSummary,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::api::{ApiClient, ApiClientError, MediaUrlBuilder};
    use crate::services::connectivity::{NetworkStateError, NetworkStateProvider, NetworkType};
    use crate::services::hydrator::MetadataHydrator;
    use crate::services::notifier::{ConfirmRequest, Notice, Notifier};
    use crate::services::settings::{SettingsStore, TranscodeOverrides};
    use crate::storage::{InMemoryStorage, KeyValueStorage};
    use crate::types::{PlaylistId, Track, TrackId};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct MockEngine {
        downloaded: Mutex<HashSet<TrackId>>,
        downloading: Mutex<HashSet<TrackId>>,
        active: Mutex<Vec<DownloadProgress>>,
        submissions: Mutex<Vec<DownloadRequest>>,
        playlist_submissions: Mutex<Vec<(PlaylistId, Vec<DownloadRequest>)>>,
        transfer_ops: Mutex<Vec<String>>,
        records: Mutex<Vec<DownloadedTrack>>,
        summary: Mutex<StorageSummary>,
        tunings: Mutex<Vec<EngineTuning>>,
        preferences: Mutex<Vec<PlaybackSourcePreference>>,
        syncs: AtomicUsize,
        fail_submissions: AtomicBool,
        fail_transfer_ops: AtomicBool,
        check_delay_ms: AtomicU64,
        events_tx: mpsc::UnboundedSender<DownloadEngineEvent>,
        events_rx: Mutex<Option<mpsc::UnboundedReceiver<DownloadEngineEvent>>>,
    }

    impl MockEngine {
        fn new() -> Arc<Self> {
            let (events_tx, events_rx) = mpsc::unbounded_channel();

            Arc::new(Self {
                downloaded: Mutex::new(HashSet::new()),
                downloading: Mutex::new(HashSet::new()),
                active: Mutex::new(Vec::new()),
                submissions: Mutex::new(Vec::new()),
                playlist_submissions: Mutex::new(Vec::new()),
                transfer_ops: Mutex::new(Vec::new()),
                records: Mutex::new(Vec::new()),
                summary: Mutex::new(StorageSummary::default()),
                tunings: Mutex::new(Vec::new()),
                preferences: Mutex::new(Vec::new()),
                syncs: AtomicUsize::new(0),
                fail_submissions: AtomicBool::new(false),
                fail_transfer_ops: AtomicBool::new(false),
                check_delay_ms: AtomicU64::new(0),
                events_tx,
                events_rx: Mutex::new(Some(events_rx)),
            })
        }

        fn emit(&self, event: DownloadEngineEvent) {
            self.events_tx.send(event).unwrap();
        }

        /// Marks the track downloaded on the mock's side and emits the
        /// completion events a real engine would.
        fn complete(&self, record: DownloadedTrack) {
            self.downloaded.lock().unwrap().insert(record.track_id.clone());
            self.records.lock().unwrap().push(record.clone());
            self.summary.lock().unwrap().total_bytes += record.size_bytes;
            self.summary.lock().unwrap().track_count += 1;

            self.emit(DownloadEngineEvent::StateChanged {
                track_id: record.track_id.clone(),
                task_id: DownloadTaskId::new(format!("task-{}", record.track_id)),
                state: DownloadState::Completed,
                error: None,
            });
            self.emit(DownloadEngineEvent::Completed(record));
        }

        async fn check_delay(&self) {
            let delay = self.check_delay_ms.load(Ordering::SeqCst);

            if delay > 0 {
                actix_rt::time::sleep(Duration::from_millis(delay)).await;
            }
        }
    }

    #[async_trait]
    impl DownloadEngine for MockEngine {
        async fn configure(&self, tuning: &EngineTuning) -> Result<(), DownloadEngineError> {
            self.tunings.lock().unwrap().push(*tuning);
            Ok(())
        }

        async fn set_source_preference(
            &self,
            preference: PlaybackSourcePreference,
        ) -> Result<(), DownloadEngineError> {
            self.preferences.lock().unwrap().push(preference);
            Ok(())
        }

        async fn sync_downloads(&self) -> Result<(), DownloadEngineError> {
            self.syncs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn active_downloads(&self) -> Result<Vec<DownloadProgress>, DownloadEngineError> {
            Ok(self.active.lock().unwrap().clone())
        }

        async fn is_track_downloaded(
            &self,
            track_id: &TrackId,
        ) -> Result<bool, DownloadEngineError> {
            self.check_delay().await;
            Ok(self.downloaded.lock().unwrap().contains(track_id))
        }

        async fn is_downloading(&self, track_id: &TrackId) -> Result<bool, DownloadEngineError> {
            self.check_delay().await;
            Ok(self.downloading.lock().unwrap().contains(track_id))
        }

        async fn download_track(
            &self,
            request: DownloadRequest,
            _playlist_id: Option<&PlaylistId>,
        ) -> Result<(), DownloadEngineError> {
            if self.fail_submissions.load(Ordering::SeqCst) {
                return Err(DownloadEngineError::Rejected("disk full".to_string()));
            }

            self.downloading.lock().unwrap().insert(request.track_id.clone());
            self.submissions.lock().unwrap().push(request);
            Ok(())
        }

        async fn download_playlist(
            &self,
            playlist_id: &PlaylistId,
            requests: Vec<DownloadRequest>,
        ) -> Result<(), DownloadEngineError> {
            if self.fail_submissions.load(Ordering::SeqCst) {
                return Err(DownloadEngineError::Rejected("disk full".to_string()));
            }

            let mut downloading = self.downloading.lock().unwrap();
            for request in &requests {
                downloading.insert(request.track_id.clone());
            }

            self.playlist_submissions
                .lock()
                .unwrap()
                .push((playlist_id.clone(), requests));
            Ok(())
        }

        async fn delete_track(&self, track_id: &TrackId) -> Result<(), DownloadEngineError> {
            self.downloaded.lock().unwrap().remove(track_id);
            self.records
                .lock()
                .unwrap()
                .retain(|record| record.track_id != *track_id);
            Ok(())
        }

        async fn delete_all(&self) -> Result<(), DownloadEngineError> {
            self.downloaded.lock().unwrap().clear();
            self.records.lock().unwrap().clear();
            *self.summary.lock().unwrap() = StorageSummary::default();
            Ok(())
        }

        async fn pause_download(&self, task_id: &DownloadTaskId) -> Result<(), DownloadEngineError> {
            if self.fail_transfer_ops.load(Ordering::SeqCst) {
                return Err(DownloadEngineError::Failed("engine offline".into()));
            }

            self.transfer_ops.lock().unwrap().push(format!("pause:{task_id}"));
            Ok(())
        }

        async fn resume_download(
            &self,
            task_id: &DownloadTaskId,
        ) -> Result<(), DownloadEngineError> {
            if self.fail_transfer_ops.load(Ordering::SeqCst) {
                return Err(DownloadEngineError::Failed("engine offline".into()));
            }

            self.transfer_ops.lock().unwrap().push(format!("resume:{task_id}"));
            Ok(())
        }

        async fn cancel_download(
            &self,
            task_id: &DownloadTaskId,
        ) -> Result<(), DownloadEngineError> {
            if self.fail_transfer_ops.load(Ordering::SeqCst) {
                return Err(DownloadEngineError::Failed("engine offline".into()));
            }

            self.transfer_ops.lock().unwrap().push(format!("cancel:{task_id}"));
            Ok(())
        }

        async fn retry_download(&self, task_id: &DownloadTaskId) -> Result<(), DownloadEngineError> {
            if self.fail_transfer_ops.load(Ordering::SeqCst) {
                return Err(DownloadEngineError::Failed("engine offline".into()));
            }

            self.transfer_ops.lock().unwrap().push(format!("retry:{task_id}"));
            Ok(())
        }

        async fn downloaded_tracks(&self) -> Result<Vec<DownloadedTrack>, DownloadEngineError> {
            Ok(self.records.lock().unwrap().clone())
        }

        async fn storage_summary(&self) -> Result<StorageSummary, DownloadEngineError> {
            Ok(*self.summary.lock().unwrap())
        }

        fn subscribe(&self) -> mpsc::UnboundedReceiver<DownloadEngineEvent> {
            self.events_rx
                .lock()
                .unwrap()
                .take()
                .expect("the mock engine supports a single subscriber")
        }
    }

    struct MockApi {
        tracks: Mutex<HashMap<TrackId, Track>>,
        calls: AtomicUsize,
    }

    impl MockApi {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                tracks: Mutex::new(HashMap::new()),
                calls: AtomicUsize::new(0),
            })
        }

        fn put(&self, track: Track) {
            self.tracks.lock().unwrap().insert(track.id.clone(), track);
        }
    }

    #[async_trait]
    impl ApiClient for MockApi {
        async fn get_track(&self, id: &TrackId) -> Result<Option<Track>, ApiClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.tracks.lock().unwrap().get(id).cloned())
        }

        async fn scrobble(&self, _id: &TrackId) -> Result<(), ApiClientError> {
            Ok(())
        }

        async fn set_starred(&self, _id: &TrackId, _starred: bool) -> Result<(), ApiClientError> {
            Ok(())
        }
    }

    struct MockUrls;

    impl MediaUrlBuilder for MockUrls {
        fn stream_url(&self, id: &TrackId, overrides: &TranscodeOverrides) -> String {
            match overrides.max_bit_rate {
                Some(rate) => format!("stream://{id}?rate={rate}"),
                None => format!("stream://{id}"),
            }
        }

        fn cover_art_url(&self, cover_ref: &str) -> String {
            format!("art://{cover_ref}")
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        notices: Mutex<Vec<Notice>>,
    }

    impl RecordingNotifier {
        fn titles(&self) -> Vec<String> {
            self.notices
                .lock()
                .unwrap()
                .iter()
                .map(|notice| notice.title.clone())
                .collect()
        }

        fn subtitle_of(&self, title: &str) -> Option<String> {
            self.notices
                .lock()
                .unwrap()
                .iter()
                .find(|notice| notice.title == title)
                .and_then(|notice| notice.subtitle.clone())
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn notify(&self, notice: Notice) {
            self.notices.lock().unwrap().push(notice);
        }

        async fn confirm(&self, _request: ConfirmRequest) -> bool {
            true
        }
    }

    struct MockNetwork {
        network_type: Mutex<NetworkType>,
    }

    impl MockNetwork {
        fn new(network_type: NetworkType) -> Arc<Self> {
            Arc::new(Self {
                network_type: Mutex::new(network_type),
            })
        }

        fn set(&self, network_type: NetworkType) {
            *self.network_type.lock().unwrap() = network_type;
        }
    }

    #[async_trait]
    impl NetworkStateProvider for MockNetwork {
        async fn network_type(&self) -> Result<NetworkType, NetworkStateError> {
            Ok(*self.network_type.lock().unwrap())
        }
    }

    struct TestBed {
        engine: Arc<MockEngine>,
        api: Arc<MockApi>,
        network: Arc<MockNetwork>,
        notifier: Arc<RecordingNotifier>,
        settings: Arc<SettingsStore>,
        orchestrator: Arc<DownloadOrchestrator>,
    }

    impl TestBed {
        async fn create() -> Self {
            Self::with_engine(MockEngine::new()).await
        }

        async fn with_engine(engine: Arc<MockEngine>) -> Self {
            let api = MockApi::new();
            let network = MockNetwork::new(NetworkType::Wifi);
            let notifier = Arc::new(RecordingNotifier::default());
            let storage: Arc<dyn KeyValueStorage> = Arc::new(InMemoryStorage::new());
            let settings = Arc::new(SettingsStore::load(storage).await);
            let hydrator = Arc::new(MetadataHydrator::create(api.clone() as Arc<dyn ApiClient>));

            let options = DownloadOptions {
                flush_interval: Duration::from_millis(10),
                settle_window: Duration::from_millis(60),
                poll_interval: Duration::from_millis(10),
                ..DownloadOptions::default()
            };

            let orchestrator = DownloadOrchestrator::create(
                engine.clone() as Arc<dyn DownloadEngine>,
                hydrator,
                Arc::new(MockUrls),
                settings.clone(),
                notifier.clone() as Arc<dyn Notifier>,
                network.clone() as Arc<dyn NetworkStateProvider>,
                options,
            );
            orchestrator.activate().await;

            Self {
                engine,
                api,
                network,
                notifier,
                settings,
                orchestrator,
            }
        }
    }

    fn track(id: &str, title: &str) -> Track {
        Track {
            id: TrackId::new(id),
            title: title.to_string(),
            artist: "Artist".to_string(),
            album: "Album".to_string(),
            duration_secs: 200,
            cover_art: None,
            starred: None,
        }
    }

    fn record(id: &str, title: &str) -> DownloadedTrack {
        DownloadedTrack {
            track_id: TrackId::new(id),
            title: title.to_string(),
            artist: "Artist".to_string(),
            size_bytes: 4_000_000,
            local_path: format!("/music/{id}.mp3"),
            completed_at: Utc::now(),
        }
    }

    fn progress_row(id: &str, state: DownloadState, progress: f64) -> DownloadProgress {
        DownloadProgress {
            track_id: TrackId::new(id),
            task_id: DownloadTaskId::new(format!("task-{id}")),
            state,
            progress,
            bytes_downloaded: (progress * 1000.0) as u64,
            total_bytes: 1000,
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }

            actix_rt::time::sleep(Duration::from_millis(5)).await;
        }

        panic!("condition was not met in time");
    }

    #[actix_rt::test]
    async fn should_submit_racing_requests_for_the_same_track_once() {
        let bed = TestBed::create().await;
        bed.engine.check_delay_ms.store(5, Ordering::SeqCst);

        let (first, second) = tokio::join!(
            bed.orchestrator.download_track(track("tr-1", "Song"), None),
            bed.orchestrator.download_track(track("tr-1", "Song"), None),
        );
        first.unwrap();
        second.unwrap();

        let submissions = bed.engine.submissions.lock().unwrap();
        assert_eq!(1, submissions.len());
        assert_eq!("stream://tr-1", submissions[0].url);
        assert_eq!(Some("art://tr-1".to_string()), submissions[0].artwork_url);

        let titles = bed.notifier.titles();
        assert!(titles.contains(&"Downloading".to_string()));
        assert!(titles.contains(&"Already Downloading".to_string()));
    }

    #[actix_rt::test]
    async fn should_not_resubmit_an_already_downloaded_track() {
        let bed = TestBed::create().await;
        bed.engine.downloaded.lock().unwrap().insert(TrackId::new("tr-1"));

        bed.orchestrator
            .download_track(track("tr-1", "Song"), None)
            .await
            .unwrap();

        assert!(bed.engine.submissions.lock().unwrap().is_empty());
        assert_eq!(vec!["Already Downloaded"], bed.notifier.titles());
    }

    #[actix_rt::test]
    async fn should_filter_playlist_downloads_and_report_the_skip_count() {
        let bed = TestBed::create().await;
        bed.engine.downloaded.lock().unwrap().insert(TrackId::new("tr-1"));

        bed.orchestrator
            .download_playlist(
                PlaylistId::new("pl-1"),
                vec![
                    track("tr-1", "First"),
                    track("tr-2", "Second"),
                    track("tr-3", "Third"),
                ],
            )
            .await
            .unwrap();

        let playlist_submissions = bed.engine.playlist_submissions.lock().unwrap();
        assert_eq!(1, playlist_submissions.len());
        assert_eq!(PlaylistId::new("pl-1"), playlist_submissions[0].0);
        assert_eq!(2, playlist_submissions[0].1.len());

        assert_eq!(
            Some("2 tracks (1 already downloaded)".to_string()),
            bed.notifier.subtitle_of("Downloading")
        );
    }

    #[actix_rt::test]
    async fn should_report_when_the_whole_playlist_is_downloaded() {
        let bed = TestBed::create().await;
        {
            let mut downloaded = bed.engine.downloaded.lock().unwrap();
            downloaded.insert(TrackId::new("tr-1"));
            downloaded.insert(TrackId::new("tr-2"));
        }

        bed.orchestrator
            .download_playlist(
                PlaylistId::new("pl-1"),
                vec![track("tr-1", "First"), track("tr-2", "Second")],
            )
            .await
            .unwrap();

        assert!(bed.engine.playlist_submissions.lock().unwrap().is_empty());
        assert_eq!(
            Some("All 2 tracks are downloaded".to_string()),
            bed.notifier.subtitle_of("Already Downloaded")
        );
    }

    #[actix_rt::test]
    async fn should_queue_downloads_requested_off_wifi() {
        let bed = TestBed::create().await;
        bed.settings.set_wifi_only_downloads(true).await.unwrap();
        bed.network.set(NetworkType::Cellular);

        bed.orchestrator
            .download_track(track("tr-1", "First"), None)
            .await
            .unwrap();
        bed.orchestrator
            .download_track(track("tr-2", "Second"), None)
            .await
            .unwrap();

        assert_eq!(2, bed.orchestrator.pending_count());
        assert!(bed.engine.submissions.lock().unwrap().is_empty());
        assert!(bed.orchestrator.wifi_only_blocked());
        assert_eq!(
            vec!["Wi-Fi Only Mode", "Wi-Fi Only Mode"],
            bed.notifier.titles()
        );
    }

    #[actix_rt::test]
    async fn should_drain_the_pending_queue_once_when_wifi_returns() {
        let bed = TestBed::create().await;
        bed.settings.set_wifi_only_downloads(true).await.unwrap();
        bed.network.set(NetworkType::Cellular);

        bed.orchestrator
            .download_track(track("tr-1", "First"), None)
            .await
            .unwrap();
        bed.orchestrator
            .download_track(track("tr-2", "Second"), None)
            .await
            .unwrap();

        bed.network.set(NetworkType::Wifi);

        wait_until(|| bed.orchestrator.pending_count() == 0).await;
        wait_until(|| bed.engine.submissions.lock().unwrap().len() == 2).await;

        assert_eq!(
            Some("Starting 2 pending downloads".to_string()),
            bed.notifier.subtitle_of("Wi-Fi Connected")
        );

        // Drained submissions are announced once, in aggregate.
        let downloading_notices = bed
            .notifier
            .titles()
            .into_iter()
            .filter(|title| title == "Downloading")
            .count();
        assert_eq!(0, downloading_notices);

        // No second drain on subsequent polls.
        actix_rt::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(2, bed.engine.submissions.lock().unwrap().len());
    }

    #[actix_rt::test]
    async fn should_apply_only_the_newest_progress_sample_per_flush() {
        let bed = TestBed::create().await;

        bed.engine.emit(DownloadEngineEvent::Progress(progress_row(
            "tr-1",
            DownloadState::Downloading,
            0.1,
        )));
        bed.engine.emit(DownloadEngineEvent::Progress(progress_row(
            "tr-1",
            DownloadState::Downloading,
            0.2,
        )));
        bed.engine.emit(DownloadEngineEvent::Progress(progress_row(
            "tr-1",
            DownloadState::Downloading,
            0.9,
        )));

        wait_until(|| {
            bed.orchestrator
                .track_progress(&TrackId::new("tr-1"))
                .is_some()
        })
        .await;

        let row = bed.orchestrator.track_progress(&TrackId::new("tr-1")).unwrap();
        assert_eq!(0.9, row.progress);
        assert_eq!(DownloadState::Downloading, row.state);
    }

    #[actix_rt::test]
    async fn should_not_let_a_buffered_sample_outlive_a_terminal_state() {
        let bed = TestBed::create().await;

        bed.engine.emit(DownloadEngineEvent::Progress(progress_row(
            "tr-1",
            DownloadState::Downloading,
            0.5,
        )));
        bed.engine.emit(DownloadEngineEvent::StateChanged {
            track_id: TrackId::new("tr-1"),
            task_id: DownloadTaskId::new("task-tr-1"),
            state: DownloadState::Failed,
            error: Some("checksum mismatch".to_string()),
        });

        wait_until(|| !bed.notifier.titles().is_empty()).await;

        assert_eq!(
            Some("checksum mismatch".to_string()),
            bed.notifier.subtitle_of("Download Failed")
        );

        // Let the flush interval pass; the discarded sample must not
        // resurrect the row.
        actix_rt::time::sleep(Duration::from_millis(30)).await;
        assert!(bed
            .orchestrator
            .track_progress(&TrackId::new("tr-1"))
            .is_none());
        assert!(bed
            .orchestrator
            .downloading_meta(&TrackId::new("tr-1"))
            .is_none());
    }

    #[actix_rt::test]
    async fn should_hold_completed_downloads_visible_for_the_settle_window() {
        let bed = TestBed::create().await;
        let id = TrackId::new("tr-1");

        bed.orchestrator
            .download_track(track("tr-1", "Song"), None)
            .await
            .unwrap();

        bed.engine.complete(record("tr-1", "Song"));

        wait_until(|| {
            bed.orchestrator
                .track_progress(&id)
                .map(|row| row.state == DownloadState::Completed && row.progress == 1.0)
                .unwrap_or(false)
        })
        .await;

        wait_until(|| bed.orchestrator.track_progress(&id).is_none()).await;

        assert!(bed.orchestrator.is_track_downloaded(&id));
        assert_eq!(1, bed.orchestrator.downloaded_tracks().len());
        assert!(bed.notifier.titles().contains(&"Download Complete".to_string()));
        assert_eq!("4.0 MB", bed.orchestrator.storage_summary().formatted_size());
    }

    #[actix_rt::test]
    async fn should_roll_back_metadata_when_the_engine_rejects_a_submission() {
        let bed = TestBed::create().await;
        bed.engine.fail_submissions.store(true, Ordering::SeqCst);

        let result = bed
            .orchestrator
            .download_track(track("tr-1", "Song"), None)
            .await;

        assert!(result.is_err());
        assert!(bed
            .orchestrator
            .downloading_meta(&TrackId::new("tr-1"))
            .is_none());
        assert!(bed.notifier.titles().contains(&"Download Error".to_string()));

        // The failed admission left nothing behind, so a retry goes through.
        bed.engine.fail_submissions.store(false, Ordering::SeqCst);
        bed.orchestrator
            .download_track(track("tr-1", "Song"), None)
            .await
            .unwrap();
        assert_eq!(1, bed.engine.submissions.lock().unwrap().len());
    }

    #[actix_rt::test]
    async fn should_seed_live_progress_from_the_engine_on_activation() {
        let engine = MockEngine::new();
        engine
            .active
            .lock()
            .unwrap()
            .push(progress_row("tr-9", DownloadState::Downloading, 0.4));

        let bed = TestBed::with_engine(engine).await;
        bed.api.put(track("tr-9", "Restored"));

        let row = bed.orchestrator.track_progress(&TrackId::new("tr-9")).unwrap();
        assert_eq!(0.4, row.progress);

        wait_until(|| {
            bed.orchestrator
                .downloading_meta(&TrackId::new("tr-9"))
                .is_some()
        })
        .await;
    }

    #[actix_rt::test]
    async fn should_not_refetch_metadata_for_unresolvable_tracks() {
        let engine = MockEngine::new();
        engine
            .active
            .lock()
            .unwrap()
            .push(progress_row("gone", DownloadState::Downloading, 0.2));

        let bed = TestBed::with_engine(engine).await;

        wait_until(|| bed.api.calls.load(Ordering::SeqCst) == 1).await;

        // Another flush triggers another backfill pass; the memoized miss
        // must keep it from calling the server again.
        bed.engine.emit(DownloadEngineEvent::Progress(progress_row(
            "gone",
            DownloadState::Downloading,
            0.3,
        )));
        actix_rt::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(1, bed.api.calls.load(Ordering::SeqCst));
        assert!(bed
            .orchestrator
            .downloading_meta(&TrackId::new("gone"))
            .is_none());
    }

    #[actix_rt::test]
    async fn should_count_only_running_transfers_as_downloading() {
        let bed = TestBed::create().await;
        let id = TrackId::new("tr-1");
        assert!(!bed.orchestrator.is_downloading());

        bed.engine.emit(DownloadEngineEvent::StateChanged {
            track_id: id.clone(),
            task_id: DownloadTaskId::new("task-tr-1"),
            state: DownloadState::Pending,
            error: None,
        });
        wait_until(|| bed.orchestrator.track_progress(&id).is_some()).await;
        assert!(!bed.orchestrator.is_downloading());

        bed.engine.emit(DownloadEngineEvent::Progress(progress_row(
            "tr-1",
            DownloadState::Downloading,
            0.3,
        )));
        wait_until(|| bed.orchestrator.is_downloading()).await;

        bed.engine.emit(DownloadEngineEvent::StateChanged {
            track_id: id.clone(),
            task_id: DownloadTaskId::new("task-tr-1"),
            state: DownloadState::Paused,
            error: None,
        });
        wait_until(|| !bed.orchestrator.is_downloading()).await;
        // The paused row stays visible, it just no longer counts.
        assert!(bed.orchestrator.track_progress(&id).is_some());
    }

    #[actix_rt::test]
    async fn should_configure_the_engine_on_activation() {
        let bed = TestBed::create().await;

        let tunings = bed.engine.tunings.lock().unwrap();
        assert_eq!(1, tunings.len());
        assert_eq!(3, tunings[0].max_concurrent_downloads);

        assert_eq!(
            vec![PlaybackSourcePreference::Auto],
            *bed.engine.preferences.lock().unwrap()
        );
        assert_eq!(1, bed.engine.syncs.load(Ordering::SeqCst));
    }

    #[actix_rt::test]
    async fn should_surface_transfer_control_failures() {
        let bed = TestBed::create().await;
        bed.engine.fail_transfer_ops.store(true, Ordering::SeqCst);

        let result = bed
            .orchestrator
            .pause_download(&DownloadTaskId::new("task-1"))
            .await;

        assert!(result.is_err());
        assert_eq!(vec!["Pause Failed"], bed.notifier.titles());
    }

    #[actix_rt::test]
    async fn should_refresh_views_after_deleting_downloads() {
        let engine = MockEngine::new();
        engine.downloaded.lock().unwrap().insert(TrackId::new("tr-1"));
        engine.records.lock().unwrap().push(record("tr-1", "Song"));

        let bed = TestBed::with_engine(engine).await;
        assert!(bed.orchestrator.is_track_downloaded(&TrackId::new("tr-1")));

        bed.orchestrator
            .delete_track(&TrackId::new("tr-1"))
            .await
            .unwrap();

        assert!(!bed.orchestrator.is_track_downloaded(&TrackId::new("tr-1")));
        assert!(bed.orchestrator.downloaded_tracks().is_empty());
    }

    #[actix_rt::test]
    async fn should_resolve_tracks_by_id_before_downloading() {
        let bed = TestBed::create().await;
        bed.api.put(track("tr-1", "Song"));

        assert!(bed
            .orchestrator
            .download_track_by_id(&TrackId::new("tr-1"))
            .await
            .unwrap());
        assert_eq!(1, bed.engine.submissions.lock().unwrap().len());

        assert!(!bed
            .orchestrator
            .download_track_by_id(&TrackId::new("missing"))
            .await
            .unwrap());
        assert_eq!(1, bed.engine.submissions.lock().unwrap().len());
    }

    #[actix_rt::test]
    async fn should_bump_the_revision_when_views_change() {
        let bed = TestBed::create().await;
        let mut revision = bed.orchestrator.subscribe_changes();
        let seen = *revision.borrow_and_update();

        bed.orchestrator
            .download_track(track("tr-1", "Song"), None)
            .await
            .unwrap();

        revision.changed().await.unwrap();
        assert!(*revision.borrow() > seen);
    }
}
