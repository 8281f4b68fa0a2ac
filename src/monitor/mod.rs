//! Per-tier polling scheduler.
//!
//! A [`Monitor`] owns a set of registered URIs and a repeating timer. Each
//! tick polls every registered URI, oldest-checked first, retries failures
//! a bounded number of times and publishes one [`Received`] per URI on the
//! channel handed to [`Monitor::new`]. The timer is re-armed only after a
//! pass (retries included) has finished, so passes never overlap.

pub mod connectivity;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::PollingConfig;
use crate::domain::{Feed, Tier};
use crate::fetcher::FeedSource;

pub use connectivity::{AlwaysOnline, Connectivity, RouteProbe};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Stopped,
    Running,
    Suspended,
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub interval: Duration,
    pub retry_count: u32,
    pub retry_interval: Duration,
}

impl MonitorSettings {
    pub fn for_tier(tier: Tier, polling: &PollingConfig) -> Self {
        let interval = match tier {
            Tier::High => polling.high_interval,
            Tier::Low | Tier::None => polling.low_interval,
        };
        Self {
            interval,
            retry_count: polling.retry_count,
            retry_interval: polling.retry_interval,
        }
    }
}

/// A fetch result (or a synthetic error feed) published by a monitor.
///
/// `uri` is the URI that was registered and polled. `feed.uri` may differ
/// when the registered URI is a page that links to its feed.
#[derive(Debug, Clone)]
pub struct Received {
    pub tier: Tier,
    pub uri: String,
    pub feed: Feed,
}

/// What a single pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped_offline: bool,
}

#[derive(Debug, Clone, Copy)]
struct Control {
    state: MonitorState,
    // Bumped on every start/stop/suspend; a timer task exits once its epoch
    // is no longer current.
    epoch: u64,
}

struct Inner {
    tier: Tier,
    settings: MonitorSettings,
    source: Arc<dyn FeedSource>,
    connectivity: Arc<dyn Connectivity>,
    registry: Mutex<HashMap<String, Option<DateTime<Utc>>>>,
    events: mpsc::UnboundedSender<Received>,
    pass_lock: tokio::sync::Mutex<()>,
}

pub struct Monitor {
    inner: Arc<Inner>,
    control: watch::Sender<Control>,
}

impl Monitor {
    pub fn new(
        tier: Tier,
        settings: MonitorSettings,
        source: Arc<dyn FeedSource>,
        connectivity: Arc<dyn Connectivity>,
        events: mpsc::UnboundedSender<Received>,
    ) -> Self {
        let (control, _) = watch::channel(Control {
            state: MonitorState::Stopped,
            epoch: 0,
        });
        Self {
            inner: Arc::new(Inner {
                tier,
                settings,
                source,
                connectivity,
                registry: Mutex::new(HashMap::new()),
                events,
                pass_lock: tokio::sync::Mutex::new(()),
            }),
            control,
        }
    }

    pub fn tier(&self) -> Tier {
        self.inner.tier
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.inner.settings
    }

    pub fn state(&self) -> MonitorState {
        self.control.borrow().state
    }

    /// Arms the repeating timer; the first pass runs after `delay`. Also
    /// resumes a suspended monitor.
    pub fn start(&self, delay: Duration) {
        let mut epoch = 0;
        self.control.send_modify(|control| {
            control.state = MonitorState::Running;
            control.epoch += 1;
            epoch = control.epoch;
        });

        let inner = self.inner.clone();
        let control = self.control.subscribe();
        tokio::spawn(run_timer(inner, control, epoch, delay));

        debug!(tier = ?self.inner.tier, ?delay, "Monitor started");
    }

    /// Pauses ticking. Registrations are kept; `start` resumes.
    pub fn suspend(&self) {
        self.transition(MonitorState::Suspended);
    }

    /// Cancels the timer. A pass already in flight runs to completion.
    pub fn stop(&self) {
        self.transition(MonitorState::Stopped);
    }

    fn transition(&self, state: MonitorState) {
        self.control.send_modify(|control| {
            control.state = state;
            control.epoch += 1;
        });
        debug!(tier = ?self.inner.tier, ?state, "Monitor state changed");
    }

    /// No-op if the URI is already registered.
    pub fn register(&self, uri: &str, last_checked: Option<DateTime<Utc>>) {
        self.inner
            .registry()
            .entry(uri.to_string())
            .or_insert(last_checked);
    }

    /// Unregisters `uri`, handing back its last-checked time so the caller
    /// can carry it to another tier. `None` if it wasn't registered.
    pub fn remove(&self, uri: &str) -> Option<Option<DateTime<Utc>>> {
        self.inner.registry().remove(uri)
    }

    pub fn clear(&self) {
        self.inner.registry().clear();
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.inner.registry().contains_key(uri)
    }

    pub fn last_checked(&self, uri: &str) -> Option<DateTime<Utc>> {
        self.inner.registry().get(uri).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.inner.registry().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.registry().is_empty()
    }

    /// Registered URIs, oldest-checked first.
    pub fn uris(&self) -> Vec<String> {
        self.inner.due_order()
    }

    /// Polls `uris` right now, outside the timer. Periodic ticking is
    /// suspended for the duration and resumed afterwards if it was running.
    pub async fn update(&self, uris: Vec<String>) -> PassSummary {
        let was_running = self.state() == MonitorState::Running;
        if was_running {
            self.suspend();
        }

        let summary = self.inner.poll(uris).await;

        if was_running && self.state() == MonitorState::Suspended {
            self.start(self.inner.settings.interval);
        }
        summary
    }

    /// One full pass over every registered URI, as a tick would run it.
    pub async fn poll_registered(&self) -> PassSummary {
        self.inner.poll_registered().await
    }
}

async fn run_timer(
    inner: Arc<Inner>,
    mut control: watch::Receiver<Control>,
    epoch: u64,
    delay: Duration,
) {
    let mut wait = delay;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = control.wait_for(|c| c.epoch != epoch) => return,
        }

        let current = *control.borrow();
        if current.epoch != epoch || current.state != MonitorState::Running {
            return;
        }

        inner.poll_registered().await;
        wait = inner.settings.interval;
    }
}

impl Inner {
    fn registry(&self) -> MutexGuard<'_, HashMap<String, Option<DateTime<Utc>>>> {
        // The map holds plain data, so a poisoned lock is still consistent.
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn due_order(&self) -> Vec<String> {
        let mut due: Vec<(String, Option<DateTime<Utc>>)> = self
            .registry()
            .iter()
            .map(|(uri, checked)| (uri.clone(), *checked))
            .collect();
        due.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        due.into_iter().map(|(uri, _)| uri).collect()
    }

    async fn poll_registered(&self) -> PassSummary {
        let uris = self.due_order();
        if uris.is_empty() {
            return PassSummary::default();
        }
        self.poll(uris).await
    }

    async fn poll(&self, uris: Vec<String>) -> PassSummary {
        let _pass = self.pass_lock.lock().await;
        let mut summary = PassSummary::default();

        if !self.connectivity.is_online() {
            debug!(tier = ?self.tier, "Offline, skipping pass");
            summary.skipped_offline = true;
            return summary;
        }

        let mut failed = Vec::new();
        for uri in uris {
            match self.source.fetch_feed(&uri).await {
                Ok(feed) => {
                    self.publish_success(&uri, feed);
                    summary.succeeded += 1;
                }
                Err(e) => {
                    debug!(uri = %uri, error = %e, "Fetch failed, queued for retry");
                    failed.push((uri, e));
                }
            }
        }

        for round in 1..=self.settings.retry_count {
            if failed.is_empty() {
                break;
            }
            tokio::time::sleep(self.settings.retry_interval).await;
            debug!(tier = ?self.tier, round, pending = failed.len(), "Retry round");

            let mut still_failing = Vec::new();
            for (uri, _) in failed {
                match self.source.fetch_feed(&uri).await {
                    Ok(feed) => {
                        self.publish_success(&uri, feed);
                        summary.succeeded += 1;
                    }
                    Err(e) => still_failing.push((uri, e)),
                }
            }
            failed = still_failing;
        }

        if !failed.is_empty() && !self.connectivity.is_online() {
            debug!(tier = ?self.tier, dropped = failed.len(), "Went offline, not reporting failures");
            failed.clear();
        }

        let now = Utc::now();
        for (uri, e) in failed {
            warn!(uri = %uri, error = %e, "Giving up on feed for this pass");
            let feed = Feed::failed(uri.clone(), e.to_string(), now);
            self.publish(uri, feed);
            summary.failed += 1;
        }

        info!(
            tier = ?self.tier,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Poll pass complete"
        );
        summary
    }

    fn publish_success(&self, uri: &str, mut feed: Feed) {
        let checked = *feed.last_checked.get_or_insert_with(Utc::now);
        if let Some(slot) = self.registry().get_mut(uri) {
            *slot = Some(checked);
        }
        self.publish(uri.to_string(), feed);
    }

    fn publish(&self, uri: String, feed: Feed) {
        let received = Received {
            tier: self.tier,
            uri,
            feed,
        };
        if self.events.send(received).is_err() {
            debug!(tier = ?self.tier, "No subscriber listening, dropping result");
        }
    }
}
