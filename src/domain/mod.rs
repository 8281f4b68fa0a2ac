pub mod feed;
pub mod frequency;
pub mod item;
pub mod tree;

pub use feed::Feed;
pub use frequency::{Frequency, Tier};
pub use item::{Item, ItemStatus};
pub use tree::{Category, Entry, Node, NodeId, SubscriptionTree, TreeChange};
