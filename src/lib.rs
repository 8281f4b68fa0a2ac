//! # Tributary
//!
//! A feed subscription engine: tiered polling of RSS/Atom feeds with a
//! capacity-bounded, disk-backed feed cache.
//!
//! ## Architecture
//!
//! ```text
//! Fetcher → Normalizer → FeedClient → Monitor (per tier) → Subscriber → CacheStore
//!                                                                    ↘ TreeStore
//! ```
//!
//! - [`fetcher`]: conditional HTTP GET, HTML alternate-link discovery, [`FeedClient`](fetcher::FeedClient)
//! - [`normalizer`]: feed sniffing and RSS/Atom parsing into [`Feed`](domain::Feed)
//! - [`monitor`]: per-tier polling scheduler with retries and offline skips
//! - [`cache`]: resident set with pin/unlock, stashing idle feeds to disk
//! - [`subscriber`]: the subscription tree, tier classification and delta merge
//! - [`store`]: debounced persistence of the subscription tree
//!
//! ## Quick Start
//!
//! ```bash
//! # Subscribe (a blog page that links its feed works too)
//! tributary add https://blog.rust-lang.org/feed.xml --category Rust
//!
//! # Show the tree with unread counts and tiers
//! tributary list
//!
//! # Poll until Ctrl-C
//! tributary run
//! ```

/// Application context and error handling.
///
/// [`AppContext`](app::AppContext) wires the HTTP stack, the feed client and
/// the tree store together and builds a ready [`Subscriber`](subscriber::Subscriber).
pub mod app;

/// Capacity-bounded feed cache with one MD5-named JSON file per feed.
pub mod cache;

/// Command-line interface using clap.
pub mod cli;

/// Configuration loaded from `~/.config/tributary/config.toml`.
pub mod config;

/// Foreground runner with signal-driven shutdown.
pub mod daemon;

/// Core domain models.
///
/// - [`Feed`](domain::Feed) and [`Item`](domain::Item)
/// - [`SubscriptionTree`](domain::SubscriptionTree): arena of entries and categories
/// - [`Frequency`](domain::Frequency) and [`Tier`](domain::Tier)
pub mod domain;

/// HTTP fetching, redirect discovery and the [`FeedSource`](fetcher::FeedSource) seam.
pub mod fetcher;

/// Per-tier polling scheduler.
pub mod monitor;

/// Feed sniffing and parsing.
///
/// Converts RSS 0.9x/1.0/2.0 and Atom into [`Feed`](domain::Feed) values.
pub mod normalizer;

/// Subscription-tree persistence.
pub mod store;

/// Orchestrator tying the tree, the cache and the monitors together.
pub mod subscriber;
