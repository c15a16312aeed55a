use super::types::DownloadProgress;
use crate::types::TrackId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) type ApplyBatch = Arc<dyn Fn(Vec<DownloadProgress>) + Send + Sync>;

enum FlushTimer {
    Idle,
    Scheduled,
}

struct CoalescerInner {
    /// Newest sample per track since the last flush.
    buffer: HashMap<TrackId, DownloadProgress>,
    timer: FlushTimer,
    flush_task: Option<actix_rt::task::JoinHandle<()>>,
}

/// Collapses the engine's progress firehose into one batch per interval.
/// The first sample after an idle period arms the timer; samples arriving
/// while it is armed only overwrite their track's buffered row.
pub(crate) struct ProgressCoalescer {
    inner: Arc<Mutex<CoalescerInner>>,
    flush_interval: Duration,
    apply: ApplyBatch,
}

impl ProgressCoalescer {
    pub(crate) fn create(flush_interval: Duration, apply: ApplyBatch) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CoalescerInner {
                buffer: HashMap::new(),
                timer: FlushTimer::Idle,
                flush_task: None,
            })),
            flush_interval,
            apply,
        }
    }

    pub(crate) fn push(&self, progress: DownloadProgress) {
        let mut inner = self.inner.lock().unwrap();
        inner.buffer.insert(progress.track_id.clone(), progress);

        if matches!(inner.timer, FlushTimer::Scheduled) {
            return;
        }

        inner.timer = FlushTimer::Scheduled;

        let shared = Arc::clone(&self.inner);
        let apply = Arc::clone(&self.apply);
        let flush_interval = self.flush_interval;

        inner.flush_task = Some(actix_rt::spawn(async move {
            actix_rt::time::sleep(flush_interval).await;

            let batch = {
                let mut inner = shared.lock().unwrap();
                inner.timer = FlushTimer::Idle;
                inner.flush_task = None;
                inner.buffer.drain().map(|(_, row)| row).collect::<Vec<_>>()
            };

            // Every buffered row may have been discarded in the meantime.
            if !batch.is_empty() {
                apply(batch);
            }
        }));
    }

    /// Drops the buffered row for a track whose transfer just ended, so a
    /// stale percentage cannot land after the terminal transition.
    pub(crate) fn discard(&self, track_id: &TrackId) {
        self.inner.lock().unwrap().buffer.remove(track_id);
    }

    pub(crate) fn stop(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.buffer.clear();
        inner.timer = FlushTimer::Idle;

        if let Some(task) = inner.flush_task.take() {
            task.abort();
        }
    }
}
