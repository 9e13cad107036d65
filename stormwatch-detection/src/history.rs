//! Alert history polling
//!
//! [`AlertHistoryPoller`] queries a [`HistorySource`] on a fixed interval and
//! replaces `history_snapshot` wholesale on every successful fetch. A failed
//! fetch leaves the previous snapshot in place.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stormwatch_core::{
    decode_history, AlertLogEntry, DetectionServerConfig, EventReporter, SessionEvent,
    SessionStore, StormwatchError,
};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use url::Url;

/// Where alert history comes from
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Fetch the complete current history
    async fn fetch(&self) -> Result<Vec<AlertLogEntry>, StormwatchError>;
}

/// History source querying the Detection Server's `/alerts/logs` endpoint
#[derive(Debug, Clone)]
pub struct HttpHistorySource {
    client: reqwest::Client,
    url: Url,
}

impl HttpHistorySource {
    /// Create a source for the configured server
    pub fn new(config: &DetectionServerConfig) -> Result<Self, StormwatchError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| StormwatchError::InvalidConfiguration {
                field: "server".to_string(),
                reason: format!("cannot build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            url: config.history_url(),
        })
    }

    /// URL being queried
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl HistorySource for HttpHistorySource {
    async fn fetch(&self) -> Result<Vec<AlertLogEntry>, StormwatchError> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| StormwatchError::HistoryFetch {
                reason: if e.is_timeout() {
                    "history request timed out".to_string()
                } else {
                    format!("history request failed: {}", e)
                },
                status: None,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(StormwatchError::HistoryFetch {
                reason: format!("server answered {}", status),
                status: Some(status.as_u16()),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| StormwatchError::HistoryFetch {
                reason: format!("cannot read history body: {}", e),
                status: Some(status.as_u16()),
            })?;

        decode_history(&body)
    }
}

/// One fetch-and-apply step shared by the scheduled task and manual fetches
#[derive(Clone)]
struct Fetcher {
    source: Arc<dyn HistorySource>,
    store: SessionStore,
    events: EventReporter,
    active: Arc<AtomicBool>,
}

impl Fetcher {
    async fn run_once(&self) -> Result<usize, StormwatchError> {
        match self.source.fetch().await {
            Ok(entries) => {
                let count = entries.len();
                let mut stopped = false;
                self.store.update(|state| {
                    if !self.active.load(Ordering::SeqCst) {
                        stopped = true;
                        return false;
                    }
                    if state.history_snapshot == entries {
                        return false;
                    }
                    state.history_snapshot = entries;
                    true
                });
                if stopped {
                    debug!("History poller stopped, discarding fetch result");
                    return Ok(count);
                }
                debug!(entries = count, "History snapshot refreshed");
                self.events
                    .report(SessionEvent::HistoryUpdated { entries: count });
                Ok(count)
            }
            Err(error) => {
                warn!("History fetch failed, keeping previous snapshot: {}", error);
                self.events.report(SessionEvent::HistoryFetchFailed {
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }
}

struct RunningPoll {
    active: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Periodically refreshes the alert history snapshot
pub struct AlertHistoryPoller {
    source: Arc<dyn HistorySource>,
    store: SessionStore,
    events: EventReporter,
    running: Mutex<Option<RunningPoll>>,
}

impl AlertHistoryPoller {
    /// Create a stopped poller
    pub fn new(source: Arc<dyn HistorySource>, store: SessionStore, events: EventReporter) -> Self {
        Self {
            source,
            store,
            events,
            running: Mutex::new(None),
        }
    }

    /// Start polling: one fetch immediately, then one per `interval`.
    ///
    /// Fetches never overlap; a slow fetch delays the next tick. Starting a
    /// running poller is a no-op.
    pub fn start(&self, interval: Duration) -> Result<(), StormwatchError> {
        if interval.is_zero() {
            return Err(StormwatchError::InvalidConfiguration {
                field: "poll_interval".to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        let mut running = self.running.lock();
        if running.is_some() {
            return Ok(());
        }

        let active = Arc::new(AtomicBool::new(true));
        let fetcher = self.fetcher(active.clone());
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                // Failures are reported by the fetcher; the next tick retries
                let _ = fetcher.run_once().await;
            }
        });

        info!(interval_ms = interval.as_millis() as u64, "History polling started");
        *running = Some(RunningPoll { active, task });
        Ok(())
    }

    /// Stop polling. Idempotent.
    ///
    /// A fetch in flight when this returns is discarded, never applied.
    pub fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };
        // Flip under the store lock so an in-flight apply lands before this or not at all
        self.store.update(|_| {
            running.active.store(false, Ordering::SeqCst);
            false
        });
        running.task.abort();
        info!("History polling stopped");
    }

    /// Whether the scheduled task is running
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Fetch once outside the schedule; returns the number of entries applied
    pub async fn fetch_now(&self) -> Result<usize, StormwatchError> {
        self.fetcher(Arc::new(AtomicBool::new(true))).run_once().await
    }

    fn fetcher(&self, active: Arc<AtomicBool>) -> Fetcher {
        Fetcher {
            source: self.source.clone(),
            store: self.store.clone(),
            events: self.events.clone(),
            active,
        }
    }
}

impl Drop for AlertHistoryPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for AlertHistoryPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertHistoryPoller")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
