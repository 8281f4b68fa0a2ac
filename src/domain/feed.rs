use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Item;

/// One subscribed source. `uri` is the identity; everything else is
/// refreshed by polling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Feed {
    pub title: String,
    pub description: String,
    pub uri: String,
    pub link: String,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_published: Option<DateTime<Utc>>,
    /// Newest first.
    pub items: Vec<Item>,
    /// Last fetch error. Never written to the cache file.
    #[serde(skip)]
    pub error: Option<String>,
}

impl Feed {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }

    /// Synthetic result published when every retry for `uri` failed.
    pub fn failed(uri: impl Into<String>, error: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            uri: uri.into(),
            last_checked: Some(now),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|item| item.is_unread()).count()
    }

    /// Newest publish time across the items.
    pub fn newest_publish_time(&self) -> Option<DateTime<Utc>> {
        self.items.iter().filter_map(|item| item.publish_time).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ItemStatus;
    use chrono::TimeZone;

    #[test]
    fn test_unread_count() {
        let mut feed = Feed::new("https://example.com/feed");
        feed.items.push(Item::new("a", "1"));
        feed.items.push(Item::new("b", "2"));
        feed.items[1].status = ItemStatus::Read;
        assert_eq!(feed.unread_count(), 1);
    }

    #[test]
    fn test_failed_feed_shape() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let feed = Feed::failed("https://example.com/feed", "timeout", now);
        assert_eq!(feed.last_checked, Some(now));
        assert_eq!(feed.error.as_deref(), Some("timeout"));
        assert!(feed.items.is_empty());
    }

    #[test]
    fn test_error_not_serialized() {
        let now = Utc::now();
        let feed = Feed::failed("u", "boom", now);
        let json = serde_json::to_value(&feed).unwrap();
        assert!(json.get("Error").is_none());
        assert_eq!(json["Uri"], "u");
    }
}
