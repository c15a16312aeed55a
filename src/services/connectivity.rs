use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum NetworkType {
    Wifi,
    Cellular,
    Ethernet,
    Offline,
}

impl NetworkType {
    pub fn is_wifi(&self) -> bool {
        matches!(self, NetworkType::Wifi)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkStateError {
    #[error("network state unavailable: {0}")]
    Unavailable(#[from] Box<dyn std::error::Error + Send + Sync>),
}

#[async_trait]
pub trait NetworkStateProvider: Send + Sync {
    async fn network_type(&self) -> Result<NetworkType, NetworkStateError>;
}

type EdgeCallback = Box<dyn Fn() + Send + Sync>;

/// Polls the platform network state on a fixed interval and fires the
/// registered callback once per transition onto wifi. Query failures are
/// treated as "no change". The poll loop must be stopped by the owning
/// component so a re-activation cannot leave two loops running.
pub struct ConnectivityMonitor {
    provider: Arc<dyn NetworkStateProvider>,
    poll_interval: Duration,
    on_wifi: AtomicBool,
    edge_callback: Mutex<Option<EdgeCallback>>,
    poll_task: Mutex<Option<actix_rt::task::JoinHandle<()>>>,
}

impl ConnectivityMonitor {
    pub fn new(provider: Arc<dyn NetworkStateProvider>, poll_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            provider,
            poll_interval,
            on_wifi: AtomicBool::new(true),
            edge_callback: Mutex::new(None),
            poll_task: Mutex::new(None),
        })
    }

    /// Last polled sample. Starts optimistic (`true`) until the first poll
    /// lands.
    pub fn is_on_wifi(&self) -> bool {
        self.on_wifi.load(Ordering::Relaxed)
    }

    /// Downgrades the exposed sample without waiting for the next poll.
    /// Used when an admission-time query observes non-wifi directly.
    pub fn mark_off_wifi(&self) {
        self.on_wifi.store(false, Ordering::Relaxed);
    }

    pub fn set_edge_callback(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.edge_callback.lock().unwrap() = Some(Box::new(callback));
    }

    pub fn start(self: &Arc<Self>) {
        let mut task_guard = self.poll_task.lock().unwrap();

        if task_guard.is_some() {
            return;
        }

        let monitor = Arc::clone(self);
        *task_guard = Some(actix_rt::spawn(async move {
            // The first sample never produces an edge: the device is assumed
            // to be on wifi until a poll says otherwise.
            let mut was_on_wifi = true;

            loop {
                match monitor.provider.network_type().await {
                    Ok(network_type) => {
                        let now_on_wifi = network_type.is_wifi();
                        monitor.on_wifi.store(now_on_wifi, Ordering::Relaxed);

                        if now_on_wifi && !was_on_wifi {
                            debug!("Wifi became available");

                            if let Some(callback) = monitor.edge_callback.lock().unwrap().as_ref() {
                                callback();
                            }
                        }

                        was_on_wifi = now_on_wifi;
                    }
                    Err(error) => {
                        warn!(?error, "Unable to query network state");
                    }
                }

                actix_rt::time::sleep(monitor.poll_interval).await;
            }
        }));
    }

    pub fn stop(&self) {
        if let Some(task) = self.poll_task.lock().unwrap().take() {
            task.abort();
        }
    }
}
