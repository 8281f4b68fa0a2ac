//! Subscription-tree persistence.
//!
//! The tree is saved as a list of category records. Loose root entries live
//! in a category with an empty title, which is flattened back into the root
//! on load.

pub mod debounce;
pub mod json;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::app::{Result, TributaryError};
use crate::domain::{Category, Entry, Frequency, Node, NodeId, SubscriptionTree};

pub use debounce::DebouncedSaver;
pub use json::JsonTreeStore;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CategoryRecord {
    pub title: String,
    pub categories: Vec<CategoryRecord>,
    pub entries: Vec<EntryRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EntryRecord {
    pub title: String,
    pub uri: String,
    pub link: String,
    pub count: usize,
    pub frequency: Frequency,
    pub skip_content: bool,
}

impl From<&Entry> for EntryRecord {
    fn from(entry: &Entry) -> Self {
        Self {
            title: entry.title.clone(),
            uri: entry.uri.clone(),
            link: entry.link.clone(),
            count: entry.count,
            frequency: entry.frequency,
            skip_content: entry.skip_content,
        }
    }
}

impl From<&EntryRecord> for Entry {
    fn from(record: &EntryRecord) -> Self {
        Entry {
            title: record.title.clone(),
            link: record.link.clone(),
            count: record.count,
            frequency: record.frequency,
            skip_content: record.skip_content,
            ..Entry::new(record.uri.clone())
        }
    }
}

/// Backing store for the subscription tree.
pub trait TreeStore: Send + Sync {
    fn load(&self) -> Result<Vec<CategoryRecord>>;
    fn save(&self, records: &[CategoryRecord]) -> Result<()>;
}

/// Builds a tree from saved records. Entries whose URI is already in the
/// tree are skipped with a warning rather than failing the whole load.
pub fn tree_from_records(records: &[CategoryRecord]) -> SubscriptionTree {
    let mut tree = SubscriptionTree::new();
    let mut loose = Vec::new();

    for record in records {
        if record.title.is_empty() {
            loose.extend(record.entries.iter());
            // Nested categories under the loose bucket still get a home.
            for child in &record.categories {
                push_category(&mut tree, None, child);
            }
        } else {
            push_category(&mut tree, None, record);
        }
    }
    for entry in loose {
        push_entry(&mut tree, None, entry);
    }

    tree
}

fn push_category(tree: &mut SubscriptionTree, parent: Option<NodeId>, record: &CategoryRecord) {
    let id = match tree.push(parent, Node::Category(Category::new(record.title.clone()))) {
        Ok((id, _)) => id,
        Err(e) => {
            warn!(title = %record.title, error = %e, "Skipping category");
            return;
        }
    };
    for child in &record.categories {
        push_category(tree, Some(id), child);
    }
    for entry in &record.entries {
        push_entry(tree, Some(id), entry);
    }
}

fn push_entry(tree: &mut SubscriptionTree, parent: Option<NodeId>, record: &EntryRecord) {
    if let Err(e) = tree.push(parent, Node::Entry(Entry::from(record))) {
        match e {
            TributaryError::DuplicateSubscription(uri) => {
                warn!(uri = %uri, "Duplicate subscription in saved tree, skipping")
            }
            other => warn!(uri = %record.uri, error = %other, "Skipping entry"),
        }
    }
}

/// Inverse of [`tree_from_records`]. Loose root entries come first, in a
/// record with an empty title; it is omitted when there are none.
pub fn records_from_tree(tree: &SubscriptionTree) -> Vec<CategoryRecord> {
    let Ok(roots) = tree.children(None) else {
        return Vec::new();
    };

    let mut loose = CategoryRecord::default();
    let mut records = Vec::new();
    for id in roots {
        match tree.get(*id) {
            Some(Node::Entry(entry)) => loose.entries.push(EntryRecord::from(entry)),
            Some(Node::Category(_)) => records.push(category_record(tree, *id)),
            None => {}
        }
    }

    if !loose.entries.is_empty() {
        records.insert(0, loose);
    }
    records
}

fn category_record(tree: &SubscriptionTree, id: NodeId) -> CategoryRecord {
    let mut record = CategoryRecord {
        title: tree.get(id).map(|node| node.title().to_string()).unwrap_or_default(),
        ..Default::default()
    };
    let children = tree.children(Some(id)).unwrap_or(&[]);
    for child in children {
        match tree.get(*child) {
            Some(Node::Entry(entry)) => record.entries.push(EntryRecord::from(entry)),
            Some(Node::Category(_)) => record.categories.push(category_record(tree, *child)),
            None => {}
        }
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(uri: &str) -> EntryRecord {
        EntryRecord {
            uri: uri.into(),
            title: format!("T {}", uri),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_title_category_is_flattened() {
        let records = vec![
            CategoryRecord {
                title: String::new(),
                entries: vec![entry("a"), entry("b")],
                ..Default::default()
            },
            CategoryRecord {
                title: "News".into(),
                entries: vec![entry("c")],
                ..Default::default()
            },
        ];

        let tree = tree_from_records(&records);
        let roots = tree.children(None).unwrap();

        assert_eq!(roots.len(), 3);
        // Categories are grouped above loose entries.
        assert_eq!(tree.get(roots[0]).unwrap().title(), "News");
        assert_eq!(tree.get(roots[1]).unwrap().as_entry().unwrap().uri, "a");
        assert_eq!(tree.get(roots[2]).unwrap().as_entry().unwrap().uri, "b");
        assert!(tree.contains_uri("c"));
    }

    #[test]
    fn test_nested_categories_and_fields_survive() {
        let mut inner = CategoryRecord {
            title: "Inner".into(),
            ..Default::default()
        };
        inner.entries.push(EntryRecord {
            uri: "deep".into(),
            count: 4,
            frequency: Frequency::None,
            skip_content: true,
            ..Default::default()
        });
        let records = vec![CategoryRecord {
            title: "Outer".into(),
            categories: vec![inner],
            entries: vec![entry("shallow")],
        }];

        let tree = tree_from_records(&records);
        let deep = tree.find("deep").unwrap();
        let stored = tree.entry(deep).unwrap();
        assert_eq!(stored.count, 4);
        assert_eq!(stored.frequency, Frequency::None);
        assert!(stored.skip_content);
        assert_eq!(tree.ancestors(deep).len(), 2);

        assert_eq!(records_from_tree(&tree), records);
    }

    #[test]
    fn test_duplicate_uri_is_skipped() {
        let records = vec![
            CategoryRecord {
                title: "A".into(),
                entries: vec![entry("x")],
                ..Default::default()
            },
            CategoryRecord {
                title: "B".into(),
                entries: vec![entry("x")],
                ..Default::default()
            },
        ];
        let tree = tree_from_records(&records);
        assert_eq!(tree.entries().len(), 1);
    }

    #[test]
    fn test_json_shape() {
        let records = vec![CategoryRecord {
            title: String::new(),
            entries: vec![EntryRecord {
                uri: "u".into(),
                frequency: Frequency::None,
                ..Default::default()
            }],
            ..Default::default()
        }];
        let value = serde_json::to_value(&records).unwrap();
        assert_eq!(value[0]["Title"], "");
        assert_eq!(value[0]["Entries"][0]["Uri"], "u");
        assert_eq!(value[0]["Entries"][0]["Frequency"], -1);
        assert_eq!(value[0]["Entries"][0]["SkipContent"], false);
        assert!(value[0]["Categories"].is_array());
    }
}
