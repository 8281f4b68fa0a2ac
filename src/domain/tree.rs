//! Subscription tree stored as an arena.
//!
//! Nodes refer to each other by [`NodeId`] instead of live references. Every
//! node has exactly one container: the root list or one category's children.
//! Category unread counts are folded bottom-up on demand so they can never
//! go stale.

use std::collections::HashMap;

use crate::app::{Result, TributaryError};
use crate::domain::Frequency;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub uri: String,
    pub title: String,
    pub link: String,
    /// Last known unread count; survives the feed being stashed to disk.
    pub count: usize,
    pub frequency: Frequency,
    pub skip_content: bool,
    pub error: Option<String>,
}

impl Entry {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            title: String::new(),
            link: String::new(),
            count: 0,
            frequency: Frequency::Auto,
            skip_content: false,
            error: None,
        }
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            &self.uri
        } else {
            &self.title
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub title: String,
    pub children: Vec<NodeId>,
    pub expanded: bool,
}

impl Category {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            children: Vec::new(),
            expanded: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Entry(Entry),
    Category(Category),
}

impl Node {
    pub fn title(&self) -> &str {
        match self {
            Node::Entry(entry) => entry.display_title(),
            Node::Category(category) => &category.title,
        }
    }

    pub fn as_entry(&self) -> Option<&Entry> {
        match self {
            Node::Entry(entry) => Some(entry),
            Node::Category(_) => None,
        }
    }

    pub fn as_category(&self) -> Option<&Category> {
        match self {
            Node::Category(category) => Some(category),
            Node::Entry(_) => None,
        }
    }
}

/// What a tree mutation did, so persistence and UI layers can react
/// without the tree knowing about them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeChange {
    Added(NodeId),
    Removed(NodeId),
    Moved {
        id: NodeId,
        from: Option<NodeId>,
        to: Option<NodeId>,
    },
    Renamed(NodeId),
    /// A persisted attribute other than the title changed (frequency).
    Updated(NodeId),
    CountChanged(NodeId),
}

impl TreeChange {
    /// Changes that alter the persisted shape of the tree.
    pub fn is_structural(&self) -> bool {
        !matches!(self, TreeChange::CountChanged(_))
    }
}

#[derive(Debug, Clone)]
struct Slot {
    node: Node,
    parent: Option<NodeId>,
}

#[derive(Debug, Clone, Default)]
pub struct SubscriptionTree {
    // Removed slots stay `None`; ids are never reused.
    slots: Vec<Option<Slot>>,
    roots: Vec<NodeId>,
    by_uri: HashMap<String, NodeId>,
}

impl SubscriptionTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id.0)?.as_ref().map(|slot| &slot.node)
    }

    pub fn entry(&self, id: NodeId) -> Option<&Entry> {
        self.get(id)?.as_entry()
    }

    pub fn entry_mut(&mut self, id: NodeId) -> Option<&mut Entry> {
        match &mut self.slots.get_mut(id.0)?.as_mut()?.node {
            Node::Entry(entry) => Some(entry),
            Node::Category(_) => None,
        }
    }

    pub fn category_mut(&mut self, id: NodeId) -> Option<&mut Category> {
        match &mut self.slots.get_mut(id.0)?.as_mut()?.node {
            Node::Category(category) => Some(category),
            Node::Entry(_) => None,
        }
    }

    pub fn find(&self, uri: &str) -> Option<NodeId> {
        self.by_uri.get(uri).copied()
    }

    pub fn contains_uri(&self, uri: &str) -> bool {
        self.by_uri.contains_key(uri)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slots.get(id.0)?.as_ref()?.parent
    }

    /// Children of a category, or the root list for `None`.
    pub fn children(&self, parent: Option<NodeId>) -> Result<&[NodeId]> {
        match parent {
            None => Ok(&self.roots),
            Some(id) => self
                .get(id)
                .and_then(Node::as_category)
                .map(|category| category.children.as_slice())
                .ok_or(TributaryError::UnknownNode),
        }
    }

    /// Parent chain from the immediate parent up to the root.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.parent(id);
        while let Some(parent) = current {
            chain.push(parent);
            current = self.parent(parent);
        }
        chain
    }

    /// Inserts before the container's first loose entry so categories stay
    /// grouped above entries and new entries land at the top of the entry
    /// block.
    pub fn insert(&mut self, parent: Option<NodeId>, node: Node) -> Result<(NodeId, TreeChange)> {
        let index = {
            let siblings = self.children(parent)?;
            siblings
                .iter()
                .position(|id| matches!(self.get(*id), Some(Node::Entry(_))))
                .unwrap_or(siblings.len())
        };
        self.insert_at(parent, index, node)
    }

    /// Appends at the end of the container.
    pub fn push(&mut self, parent: Option<NodeId>, node: Node) -> Result<(NodeId, TreeChange)> {
        let index = self.children(parent)?.len();
        self.insert_at(parent, index, node)
    }

    fn insert_at(
        &mut self,
        parent: Option<NodeId>,
        index: usize,
        node: Node,
    ) -> Result<(NodeId, TreeChange)> {
        // Validate the container before allocating a slot.
        self.children(parent)?;

        if let Node::Entry(entry) = &node {
            if self.by_uri.contains_key(&entry.uri) {
                return Err(TributaryError::DuplicateSubscription(entry.uri.clone()));
            }
        }

        let id = NodeId(self.slots.len());
        if let Node::Entry(entry) = &node {
            self.by_uri.insert(entry.uri.clone(), id);
        }
        self.slots.push(Some(Slot { node, parent }));
        self.container_mut(parent)?.insert(index, id);

        Ok((id, TreeChange::Added(id)))
    }

    /// Detaches `id` and everything below it. Returns the removed entries so
    /// the caller can unregister them.
    pub fn remove(&mut self, id: NodeId) -> Result<(Vec<Entry>, TreeChange)> {
        if self.get(id).is_none() {
            return Err(TributaryError::UnknownNode);
        }

        let parent = self.parent(id);
        self.container_mut(parent)?.retain(|child| *child != id);

        let mut removed = Vec::new();
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let Some(slot) = self.slots.get_mut(current.0).and_then(Option::take) else {
                continue;
            };
            match slot.node {
                Node::Entry(entry) => {
                    self.by_uri.remove(&entry.uri);
                    removed.push(entry);
                }
                Node::Category(category) => pending.extend(category.children),
            }
        }

        Ok((removed, TreeChange::Removed(id)))
    }

    /// Moves `id` into `dest` at `index`, where `index` counts positions in
    /// the destination after `id` has been detached. Out-of-range indexes
    /// append.
    pub fn move_node(
        &mut self,
        id: NodeId,
        dest: Option<NodeId>,
        index: usize,
    ) -> Result<TreeChange> {
        if self.get(id).is_none() {
            return Err(TributaryError::UnknownNode);
        }
        self.children(dest)?;
        if let Some(dest_id) = dest {
            if dest_id == id || self.ancestors(dest_id).contains(&id) {
                return Err(TributaryError::InvalidMove);
            }
        }

        let from = self.parent(id);
        self.container_mut(from)?.retain(|child| *child != id);

        let container = self.container_mut(dest)?;
        let index = index.min(container.len());
        container.insert(index, id);

        if let Some(slot) = self.slots.get_mut(id.0).and_then(Option::as_mut) {
            slot.parent = dest;
        }

        Ok(TreeChange::Moved { id, from, to: dest })
    }

    pub fn rename(&mut self, id: NodeId, title: impl Into<String>) -> Result<TreeChange> {
        let slot = self
            .slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(TributaryError::UnknownNode)?;
        match &mut slot.node {
            Node::Entry(entry) => entry.title = title.into(),
            Node::Category(category) => category.title = title.into(),
        }
        Ok(TreeChange::Renamed(id))
    }

    /// Records a new unread count on an entry. `None` when nothing changed.
    pub fn set_count(&mut self, id: NodeId, count: usize) -> Option<TreeChange> {
        let entry = self.entry_mut(id)?;
        if entry.count == count {
            return None;
        }
        entry.count = count;
        Some(TreeChange::CountChanged(id))
    }

    /// Entry count, or the recursive sum for a category.
    pub fn unread_count(&self, id: NodeId) -> usize {
        match self.get(id) {
            Some(Node::Entry(entry)) => entry.count,
            Some(Node::Category(category)) => category
                .children
                .iter()
                .map(|child| self.unread_count(*child))
                .sum(),
            None => 0,
        }
    }

    pub fn total_unread(&self) -> usize {
        self.roots.iter().map(|id| self.unread_count(*id)).sum()
    }

    /// All entries in display order (depth first).
    pub fn entries(&self) -> Vec<(NodeId, &Entry)> {
        let mut out = Vec::new();
        self.collect_entries(&self.roots, &mut out);
        out
    }

    /// Entries at or below `id`.
    pub fn entries_under(&self, id: NodeId) -> Vec<(NodeId, &Entry)> {
        let mut out = Vec::new();
        self.collect_entries(&[id], &mut out);
        out
    }

    fn collect_entries<'a>(&'a self, ids: &[NodeId], out: &mut Vec<(NodeId, &'a Entry)>) {
        for id in ids {
            match self.get(*id) {
                Some(Node::Entry(entry)) => out.push((*id, entry)),
                Some(Node::Category(category)) => self.collect_entries(&category.children, out),
                None => {}
            }
        }
    }

    fn container_mut(&mut self, parent: Option<NodeId>) -> Result<&mut Vec<NodeId>> {
        match parent {
            None => Ok(&mut self.roots),
            Some(id) => self
                .category_mut(id)
                .map(|category| &mut category.children)
                .ok_or(TributaryError::UnknownNode),
        }
    }
}
