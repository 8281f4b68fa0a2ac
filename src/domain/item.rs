use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Read state of an [`Item`]. Items start out `Unread` when parsed and only
/// ever move to `Read`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemStatus {
    #[default]
    Uninitialized,
    Unread,
    Read,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Item {
    pub title: String,
    pub summary: String,
    pub content: String,
    pub categories: BTreeSet<String>,
    pub link: String,
    pub publish_time: Option<DateTime<Utc>>,
    pub status: ItemStatus,
}

impl Item {
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            status: ItemStatus::Unread,
            ..Default::default()
        }
    }

    pub fn is_unread(&self) -> bool {
        self.status == ItemStatus::Unread
    }

    /// Unread → Read. Returns `true` if the status changed.
    pub fn mark_read(&mut self) -> bool {
        if self.status == ItemStatus::Unread {
            self.status = ItemStatus::Read;
            true
        } else {
            false
        }
    }

    /// Identity used when publish times can't tell two items apart.
    pub fn same_article(&self, other: &Item) -> bool {
        if !self.link.is_empty() || !other.link.is_empty() {
            self.link == other.link && self.title == other.title
        } else {
            self.title == other.title
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_item_is_unread() {
        let item = Item::new("Title", "https://example.com/1");
        assert!(item.is_unread());
    }

    #[test]
    fn test_mark_read_is_one_way() {
        let mut item = Item::new("Title", "https://example.com/1");
        assert!(item.mark_read());
        assert_eq!(item.status, ItemStatus::Read);
        assert!(!item.mark_read());
        assert_eq!(item.status, ItemStatus::Read);
    }

    #[test]
    fn test_uninitialized_is_not_marked_read() {
        let mut item = Item::default();
        assert!(!item.mark_read());
        assert_eq!(item.status, ItemStatus::Uninitialized);
    }

    #[test]
    fn test_same_article_uses_link_and_title() {
        let a = Item::new("A", "https://example.com/1");
        let b = Item::new("A", "https://example.com/1");
        let c = Item::new("A", "https://example.com/2");
        assert!(a.same_article(&b));
        assert!(!a.same_article(&c));
        assert!(Item::new("T", "").same_article(&Item::new("T", "")));
    }

    #[test]
    fn test_status_serializes_as_name() {
        let json = serde_json::to_string(&ItemStatus::Unread).unwrap();
        assert_eq!(json, "\"Unread\"");
    }

    #[test]
    fn test_pascal_case_keys() {
        let item = Item::new("T", "L");
        let value = serde_json::to_value(&item).unwrap();
        assert!(value.get("PublishTime").is_some());
        assert_eq!(value["Status"], "Unread");
    }
}
