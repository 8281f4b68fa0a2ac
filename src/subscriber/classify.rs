//! Which polling tier an entry belongs to.

use chrono::{DateTime, Duration, Utc};

use crate::domain::{Entry, Feed, Frequency, Tier};

/// Explicit High, or Auto with a feed that published within `active_days`.
/// A feed that was never checked is assumed active.
pub fn is_high_frequency(
    entry: &Entry,
    feed: Option<&Feed>,
    now: DateTime<Utc>,
    active_days: i64,
) -> bool {
    match entry.frequency {
        Frequency::High => true,
        Frequency::Auto => {
            let Some(feed) = feed else {
                return true;
            };
            if feed.last_checked.is_none() {
                return true;
            }
            // A window too large to represent covers every publish date.
            let window = Duration::try_days(active_days);
            feed.last_published.is_some_and(|published| {
                window.map_or(true, |window| now - published <= window)
            })
        }
        Frequency::Low | Frequency::None => false,
    }
}

pub fn is_low_frequency(
    entry: &Entry,
    feed: Option<&Feed>,
    now: DateTime<Utc>,
    active_days: i64,
) -> bool {
    entry.frequency != Frequency::None && !is_high_frequency(entry, feed, now, active_days)
}

/// The polling tier for `entry`, or `None` when it is never polled.
pub fn target_tier(
    entry: &Entry,
    feed: Option<&Feed>,
    now: DateTime<Utc>,
    active_days: i64,
) -> Option<Tier> {
    if is_high_frequency(entry, feed, now, active_days) {
        Some(Tier::High)
    } else if is_low_frequency(entry, feed, now, active_days) {
        Some(Tier::Low)
    } else {
        None
    }
}
