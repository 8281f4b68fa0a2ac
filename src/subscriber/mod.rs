//! The orchestrator.
//!
//! A [`Subscriber`] owns the subscription tree, the [`CacheStore`] and one
//! [`Monitor`] per [`Tier`]. It is the only mutator of tree and cache state:
//! monitors fetch in the background and queue their results, and the
//! subscriber folds them in when [`receive`](Subscriber::receive) runs.
//!
//! Every entry is registered with at most one polling monitor, the one its
//! frequency classifies it into. Entries set to [`Frequency::None`] are
//! registered nowhere and are only fetched by an explicit
//! [`update`](Subscriber::update).

pub mod classify;
pub mod merge;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::app::{Result, TributaryError};
use crate::cache::CacheStore;
use crate::config::PollingConfig;
use crate::domain::{
    Category, Entry, Feed, Frequency, Node, NodeId, SubscriptionTree, Tier, TreeChange,
};
use crate::fetcher::FeedSource;
use crate::monitor::{Connectivity, Monitor, MonitorSettings, PassSummary, Received};
use crate::store::{self, CategoryRecord, DebouncedSaver};

pub use classify::{is_high_frequency, is_low_frequency, target_tier};
pub use merge::merge_into;

pub struct Subscriber {
    tree: SubscriptionTree,
    cache: CacheStore,
    monitors: HashMap<Tier, Monitor>,
    source: Arc<dyn FeedSource>,
    received: mpsc::UnboundedReceiver<Received>,
    saver: Option<DebouncedSaver>,
    active_days: i64,
    startup_delay: Duration,
}

impl Subscriber {
    pub fn new(
        polling: &PollingConfig,
        cache: CacheStore,
        source: Arc<dyn FeedSource>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        let (events, received) = mpsc::unbounded_channel();
        let monitors = Tier::ALL
            .into_iter()
            .map(|tier| {
                let monitor = Monitor::new(
                    tier,
                    MonitorSettings::for_tier(tier, polling),
                    source.clone(),
                    connectivity.clone(),
                    events.clone(),
                );
                (tier, monitor)
            })
            .collect();

        Self {
            tree: SubscriptionTree::new(),
            cache,
            monitors,
            source,
            received,
            saver: None,
            active_days: polling.active_days,
            startup_delay: polling.startup_delay,
        }
    }

    /// Structural tree changes are handed to `saver` from now on.
    pub fn with_saver(mut self, saver: DebouncedSaver) -> Self {
        self.saver = Some(saver);
        self
    }

    pub fn tree(&self) -> &SubscriptionTree {
        &self.tree
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn monitor(&self, tier: Tier) -> &Monitor {
        &self.monitors[&tier]
    }

    /// Replaces the tree with saved records and schedules every entry.
    /// Cached metadata is read so classification sees real publish dates.
    pub fn load(&mut self, records: &[CategoryRecord]) {
        for monitor in self.monitors.values() {
            monitor.clear();
        }
        for (_, entry) in self.tree.entries() {
            self.cache.remove(&entry.uri, false);
        }

        self.tree = store::tree_from_records(records);
        for (_, entry) in self.tree.entries() {
            let mut feed = Feed::new(entry.uri.clone());
            feed.link = entry.link.clone();
            if self.cache.add(feed).is_ok() {
                self.cache.hydrate(&entry.uri);
            }
        }

        let ids: Vec<NodeId> = self.tree.entries().into_iter().map(|(id, _)| id).collect();
        for id in &ids {
            self.reschedule(*id);
        }
        info!(entries = ids.len(), "Loaded subscriptions");
    }

    pub fn records(&self) -> Vec<CategoryRecord> {
        store::records_from_tree(&self.tree)
    }

    /// Arms the polling tiers. The never-poll monitor is not started.
    pub fn start(&self) {
        for tier in Tier::ALL.into_iter().filter(|tier| tier.is_polling()) {
            self.monitors[&tier].start(self.startup_delay);
        }
    }

    /// Stops polling, folds in results that already arrived, flushes the
    /// cache and writes the tree one last time.
    pub async fn shutdown(&mut self) {
        for monitor in self.monitors.values() {
            monitor.stop();
        }
        self.process_pending();
        self.cache.shutdown();
        if let Some(saver) = self.saver.take() {
            saver.schedule(self.records());
            saver.flush().await;
        }
        info!("Subscriber shut down");
    }

    /// Subscribes to `uri` under `parent` (`None` for the root). The URI is
    /// fetched first: a page that only links to its feed is stored under the
    /// feed's own URI, and fetch errors reach the caller.
    pub async fn add(&mut self, uri: &str, parent: Option<NodeId>) -> Result<NodeId> {
        if self.tree.contains_uri(uri) {
            return Err(TributaryError::DuplicateSubscription(uri.to_string()));
        }
        self.tree.children(parent)?;

        let fetched = self.source.fetch_feed(uri).await?;
        let resolved = fetched.uri.clone();
        if self.tree.contains_uri(&resolved) {
            return Err(TributaryError::DuplicateSubscription(resolved));
        }

        self.cache.add(Feed::new(resolved.clone()))?;
        let (id, change) = match self
            .tree
            .insert(parent, Node::Entry(Entry::new(resolved.clone())))
        {
            Ok(added) => added,
            Err(e) => {
                self.cache.remove(&resolved, false);
                return Err(e);
            }
        };

        self.apply(&resolved, fetched);
        self.reschedule(id);
        self.persist(&change);
        info!(uri = %resolved, "Subscribed");
        Ok(id)
    }

    pub fn add_category(&mut self, title: &str, parent: Option<NodeId>) -> Result<NodeId> {
        let (id, change) = self
            .tree
            .insert(parent, Node::Category(Category::new(title)))?;
        self.persist(&change);
        Ok(id)
    }

    /// Removes a node and, for a category, everything below it. Each removed
    /// entry is unregistered and dropped from the cache; `delete_cache` also
    /// deletes its cache file. Returns the removed URIs.
    pub fn remove(&mut self, id: NodeId, delete_cache: bool) -> Result<Vec<String>> {
        let (removed, change) = self.tree.remove(id)?;

        let mut uris = Vec::with_capacity(removed.len());
        for entry in removed {
            for monitor in self.monitors.values() {
                monitor.remove(&entry.uri);
            }
            self.cache.remove(&entry.uri, delete_cache);
            self.source.forget(&entry.uri);
            uris.push(entry.uri);
        }

        self.persist(&change);
        info!(removed = uris.len(), "Unsubscribed");
        Ok(uris)
    }

    pub fn move_node(&mut self, id: NodeId, dest: Option<NodeId>, index: usize) -> Result<()> {
        let change = self.tree.move_node(id, dest, index)?;
        self.persist(&change);
        Ok(())
    }

    pub fn rename(&mut self, id: NodeId, title: &str) -> Result<()> {
        let change = self.tree.rename(id, title)?;
        self.persist(&change);
        Ok(())
    }

    /// Changes an entry's polling preference and moves it to the matching
    /// tier. Returns the tier it ended up in.
    pub fn set_frequency(&mut self, id: NodeId, frequency: Frequency) -> Result<Option<Tier>> {
        let entry = self.tree.entry_mut(id).ok_or(TributaryError::UnknownNode)?;
        entry.frequency = frequency;
        let tier = self.reschedule(id);
        self.persist(&TreeChange::Updated(id));
        Ok(tier)
    }

    /// The polling monitor `uri` is registered with, if any.
    pub fn registered_tier(&self, uri: &str) -> Option<Tier> {
        Tier::ALL
            .into_iter()
            .filter(|tier| tier.is_polling())
            .find(|tier| self.monitors[tier].contains(uri))
    }

    /// Moves the entry to the tier it classifies into now. Its last-checked
    /// time travels along so the new tier doesn't poll it straight away.
    pub fn reschedule(&mut self, id: NodeId) -> Option<Tier> {
        let entry = self.tree.entry(id)?;
        let feed = self.cache.peek(&entry.uri);
        let target = target_tier(entry, feed, Utc::now(), self.active_days);
        let current = self.registered_tier(&entry.uri);
        if current == target {
            return target;
        }

        let carried = current
            .and_then(|tier| self.monitors[&tier].remove(&entry.uri))
            .flatten()
            .or_else(|| feed.and_then(|feed| feed.last_checked));
        if let Some(tier) = target {
            self.monitors[&tier].register(&entry.uri, carried);
        }

        debug!(uri = %entry.uri, from = ?current, to = ?target, "Rescheduled");
        target
    }

    /// Moves the cache pin from `from` to `to` and returns the newly
    /// selected feed. The old pin is released first so the capacity check
    /// that follows can already evict it.
    pub fn select(&mut self, from: Option<NodeId>, to: Option<NodeId>) -> Option<&mut Feed> {
        if let Some(entry) = from.and_then(|id| self.tree.entry(id)) {
            self.cache.unlock(&entry.uri);
        }
        let entry = to.and_then(|id| self.tree.entry(id))?;
        self.cache.get(&entry.uri, true)
    }

    /// Full access to an entry's feed; counts as a cache touch.
    pub fn feed(&mut self, id: NodeId) -> Option<&mut Feed> {
        let entry = self.tree.entry(id)?;
        self.cache.get(&entry.uri, false)
    }

    pub fn peek_feed(&self, id: NodeId) -> Option<&Feed> {
        self.tree
            .entry(id)
            .and_then(|entry| self.cache.peek(&entry.uri))
    }

    /// Marks one item read. `Ok(false)` if it was already read or `index`
    /// is out of range.
    pub fn mark_read(&mut self, uri: &str, index: usize) -> Result<bool> {
        let id = self.tree.find(uri).ok_or(TributaryError::UnknownNode)?;
        let feed = self
            .cache
            .get(uri, false)
            .ok_or(TributaryError::UnknownNode)?;
        let changed = feed
            .items
            .get_mut(index)
            .is_some_and(|item| item.mark_read());
        let count = feed.unread_count();
        self.tree.set_count(id, count);
        Ok(changed)
    }

    /// Returns how many items changed.
    pub fn mark_all_read(&mut self, uri: &str) -> Result<usize> {
        let id = self.tree.find(uri).ok_or(TributaryError::UnknownNode)?;
        let feed = self
            .cache
            .get(uri, false)
            .ok_or(TributaryError::UnknownNode)?;
        let changed = feed
            .items
            .iter_mut()
            .map(|item| item.mark_read())
            .filter(|changed| *changed)
            .count();
        self.tree.set_count(id, 0);
        Ok(changed)
    }

    /// Polls every entry at or below `ids` now, through the monitor of the
    /// tier it is registered in (the never-poll monitor for dormant
    /// entries). Results queue up like any scheduled poll; call
    /// [`process_pending`](Self::process_pending) to apply them.
    pub async fn update(&self, ids: &[NodeId]) -> PassSummary {
        let mut groups: BTreeMap<Tier, Vec<String>> = BTreeMap::new();
        for id in ids {
            for (_, entry) in self.tree.entries_under(*id) {
                let tier = self.registered_tier(&entry.uri).unwrap_or(Tier::None);
                let uris = groups.entry(tier).or_default();
                if !uris.contains(&entry.uri) {
                    uris.push(entry.uri.clone());
                }
            }
        }

        let mut total = PassSummary::default();
        for (tier, uris) in groups {
            let summary = self.monitors[&tier].update(uris).await;
            total.succeeded += summary.succeeded;
            total.failed += summary.failed;
            total.skipped_offline |= summary.skipped_offline;
        }
        total
    }

    pub async fn refresh_all(&self) -> PassSummary {
        let roots = self
            .tree
            .children(None)
            .map(<[NodeId]>::to_vec)
            .unwrap_or_default();
        self.update(&roots).await
    }

    /// Applies one monitor result. Returns how many items were added, or
    /// `None` for error results and URIs that are no longer subscribed.
    pub fn receive(&mut self, received: Received) -> Option<usize> {
        debug!(tier = ?received.tier, uri = %received.uri, "Received feed");
        self.apply(&received.uri, received.feed)
    }

    /// Applies every result queued so far without waiting.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(received) = self.received.try_recv() {
            self.receive(received);
            handled += 1;
        }
        handled
    }

    /// Waits for the next monitor result.
    pub async fn next_event(&mut self) -> Option<Received> {
        self.received.recv().await
    }

    /// Merges `fetched` into the entry subscribed as `uri`. The fetched feed
    /// may carry a different URI when `uri` is a page that links to it.
    fn apply(&mut self, uri: &str, mut fetched: Feed) -> Option<usize> {
        let Some(id) = self.tree.find(uri) else {
            debug!(uri = %uri, "Result for a removed subscription, dropping");
            return None;
        };
        if fetched.uri != uri {
            debug!(uri = %uri, resolved = %fetched.uri, "Subscription resolved through its page");
        }

        if let Some(error) = fetched.error.take() {
            if let Some(entry) = self.tree.entry_mut(id) {
                entry.error = Some(error);
            }
            return None;
        }

        let feed = self.cache.get(uri, false)?;
        let added = merge_into(feed, fetched);
        let count = feed.unread_count();
        let title = feed.title.clone();
        let link = feed.link.clone();

        if let Some(entry) = self.tree.entry_mut(id) {
            entry.error = None;
            entry.link = link;
            if entry.title.is_empty() {
                entry.title = title;
            }
        }
        self.tree.set_count(id, count);
        self.reschedule(id);

        if added > 0 {
            debug!(count, added, "Merged new items");
        }
        Some(added)
    }

    fn persist(&self, change: &TreeChange) {
        if !change.is_structural() {
            return;
        }
        if let Some(saver) = &self.saver {
            saver.schedule(self.records());
        }
    }
}
