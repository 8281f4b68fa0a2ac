//! Capacity-bounded feed cache.
//!
//! Every subscribed feed stays registered in the map, but only `capacity`
//! unpinned feeds are *resident* (hold their full item list). When an access
//! pushes the resident count over capacity, the least recently touched
//! unpinned feed is stashed: written to its cache file and emptied in memory.
//! The next [`CacheStore::get`] recovers its unread items from that file.

pub mod file;

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::app::{Result, TributaryError};
use crate::domain::Feed;

pub struct CacheStore {
    dir: PathBuf,
    capacity: usize,
    read_only: bool,
    feeds: HashMap<String, Feed>,
    pinned: HashSet<String>,
    /// Resident URIs, least recently touched first.
    touch_order: VecDeque<String>,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>, capacity: usize, read_only: bool) -> Result<Self> {
        let dir = dir.into();
        if !read_only {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self {
            dir,
            capacity: capacity.max(1),
            read_only,
            feeds: HashMap::new(),
            pinned: HashSet::new(),
            touch_order: VecDeque::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.feeds.contains_key(uri)
    }

    pub fn is_resident(&self, uri: &str) -> bool {
        self.touch_order.iter().any(|u| u == uri)
    }

    pub fn is_pinned(&self, uri: &str) -> bool {
        self.pinned.contains(uri)
    }

    pub fn resident_count(&self) -> usize {
        self.touch_order.len()
    }

    pub fn resident_unpinned_count(&self) -> usize {
        self.touch_order
            .iter()
            .filter(|uri| !self.pinned.contains(*uri))
            .count()
    }

    pub fn file_path(&self, uri: &str) -> PathBuf {
        self.dir.join(file::cache_file_name(uri))
    }

    /// Registers a feed. It becomes resident on its first [`get`](Self::get).
    pub fn add(&mut self, feed: Feed) -> Result<()> {
        if self.feeds.contains_key(&feed.uri) {
            return Err(TributaryError::DuplicateSubscription(feed.uri));
        }
        self.feeds.insert(feed.uri.clone(), feed);
        Ok(())
    }

    /// Drops a feed. `delete_file` is for permanent unsubscribes; a plain
    /// removal leaves the cache file for a later re-add.
    pub fn remove(&mut self, uri: &str, delete_file: bool) -> Option<Feed> {
        self.touch_order.retain(|u| u != uri);
        self.pinned.remove(uri);
        let feed = self.feeds.remove(uri);

        if delete_file && !self.read_only {
            let path = self.file_path(uri);
            match fs::remove_file(&path) {
                Ok(()) => debug!(uri, "Deleted cache file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(uri, error = %e, "Failed to delete cache file"),
            }
        }

        feed
    }

    /// Read-only view. Does not touch, recover or count as an access.
    pub fn peek(&self, uri: &str) -> Option<&Feed> {
        self.feeds.get(uri)
    }

    /// Fills in a freshly registered feed's metadata from its cache file
    /// without loading items or touching it, so a restart can classify and
    /// schedule feeds before any of them becomes resident.
    pub fn hydrate(&mut self, uri: &str) {
        let path = self.file_path(uri);
        let Some(feed) = self.feeds.get_mut(uri) else {
            return;
        };
        if feed.last_checked.is_some() {
            return;
        }

        match file::read_feed(&path) {
            Ok(Some(stored)) => {
                if feed.title.is_empty() {
                    feed.title = stored.title;
                }
                feed.description = stored.description;
                feed.link = stored.link;
                feed.last_checked = stored.last_checked;
                feed.last_published = stored.last_published;
            }
            Ok(None) => {}
            Err(e) => warn!(uri, error = %e, "Unreadable cache file, ignoring"),
        }
    }

    /// Full access to a feed: recovers it from disk if it was stashed, marks
    /// it most recently used and, with `pin`, exempts it from eviction until
    /// [`unlock`](Self::unlock). May stash some other feed to stay within
    /// capacity.
    pub fn get(&mut self, uri: &str, pin: bool) -> Option<&mut Feed> {
        if !self.feeds.contains_key(uri) {
            return None;
        }

        // Pin before any eviction bookkeeping so a just-pinned feed can never
        // be picked as the victim.
        if pin {
            self.pinned.insert(uri.to_string());
        }

        match self.touch_order.iter().position(|u| u == uri) {
            Some(pos) => {
                self.touch_order.remove(pos);
            }
            None => self.recover(uri),
        }
        self.touch_order.push_back(uri.to_string());

        self.enforce_capacity(uri);
        self.feeds.get_mut(uri)
    }

    /// Clears the pin; the feed is evictable from the next capacity check.
    pub fn unlock(&mut self, uri: &str) {
        self.pinned.remove(uri);
    }

    /// Writes every resident feed, pinned ones included, and forgets the
    /// touch order. Nothing is written in read-only mode.
    pub fn shutdown(&mut self) {
        if self.read_only {
            info!("Read-only cache, skipping flush");
        } else {
            let mut written = 0;
            for uri in &self.touch_order {
                let Some(feed) = self.feeds.get(uri) else {
                    continue;
                };
                match file::write_feed(&self.file_path(uri), feed) {
                    Ok(()) => written += 1,
                    Err(e) => warn!(uri = %uri, error = %e, "Failed to flush feed to cache"),
                }
            }
            info!(written, "Flushed cache");
        }

        self.touch_order.clear();
        self.pinned.clear();
    }

    /// Pulls stashed state back in. Only runs when the in-memory feed is
    /// empty, so items that could not be written out are never overwritten
    /// by an older file.
    fn recover(&mut self, uri: &str) {
        let path = self.file_path(uri);
        let Some(feed) = self.feeds.get_mut(uri) else {
            return;
        };
        if !feed.items.is_empty() {
            return;
        }

        match file::read_feed(&path) {
            Ok(Some(stored)) => {
                feed.title = stored.title;
                feed.description = stored.description;
                feed.link = stored.link;
                feed.last_checked = stored.last_checked;
                feed.last_published = stored.last_published;
                feed.items = stored
                    .items
                    .into_iter()
                    .filter(|item| item.is_unread())
                    .collect();
                debug!(uri, items = feed.items.len(), "Recovered feed from cache");
            }
            Ok(None) => {}
            Err(e) => warn!(uri, error = %e, "Unreadable cache file, ignoring"),
        }
    }

    fn enforce_capacity(&mut self, current: &str) {
        while self.resident_unpinned_count() > self.capacity {
            let victim = self
                .touch_order
                .iter()
                .find(|uri| uri.as_str() != current && !self.pinned.contains(*uri))
                .cloned();
            match victim {
                Some(uri) => self.stash(&uri),
                None => break,
            }
        }
    }

    /// Writes `uri` to disk and drops its items from memory. If the write
    /// can't happen the items stay in memory, but the feed still leaves the
    /// resident set.
    fn stash(&mut self, uri: &str) {
        self.touch_order.retain(|u| u != uri);
        let path = self.file_path(uri);
        let read_only = self.read_only;
        let Some(feed) = self.feeds.get_mut(uri) else {
            return;
        };

        if read_only {
            debug!(uri, "Read-only cache, not stashing items");
            return;
        }

        match file::write_feed(&path, feed) {
            Ok(()) => {
                feed.items = Vec::new();
                debug!(uri, "Stashed feed");
            }
            Err(e) => warn!(uri, error = %e, "Failed to stash feed, keeping items in memory"),
        }
    }
}
