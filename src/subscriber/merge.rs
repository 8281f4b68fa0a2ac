//! Folding a freshly fetched feed into the cached one.

use std::cmp::Reverse;

use crate::domain::{Feed, Item};

/// Prepends the fetched items that are newer than `target.last_checked` and
/// refreshes the feed metadata. Fetched items are sorted newest first before
/// trimming, so servers that list items out of order still merge correctly.
/// Undated items can't be compared against the threshold; they are kept only
/// when nothing in the feed already looks like the same article.
///
/// Returns how many items were added.
pub fn merge_into(target: &mut Feed, fetched: Feed) -> usize {
    let threshold = target.last_checked;
    let mut incoming = fetched.items;
    incoming.sort_by_key(|item| Reverse(item.publish_time));

    let mut fresh: Vec<Item> = Vec::new();
    for item in incoming {
        let newer = match (item.publish_time, threshold) {
            (Some(published), Some(threshold)) => published > threshold,
            _ => true,
        };
        if !newer {
            continue;
        }
        let known = target
            .items
            .iter()
            .chain(fresh.iter())
            .any(|existing| existing.same_article(&item));
        if !known {
            fresh.push(item);
        }
    }

    let added = fresh.len();
    if added > 0 {
        fresh.append(&mut target.items);
        target.items = fresh;
    }

    if !fetched.title.is_empty() {
        target.title = fetched.title;
    }
    target.description = fetched.description;
    target.link = fetched.link;
    target.last_checked = fetched.last_checked.or(target.last_checked);
    if fetched.last_published.is_some() {
        target.last_published = fetched.last_published;
    }
    target.error = None;

    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ItemStatus;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, 0, 0, 0).unwrap()
    }

    fn item(title: &str, day: Option<u32>) -> Item {
        let mut item = Item::new(title, format!("https://x.example/{}", title));
        item.publish_time = day.map(at);
        item
    }

    fn fetched(checked_day: u32, items: Vec<Item>) -> Feed {
        let mut feed = Feed::new("https://x.example/rss");
        feed.title = "X".into();
        feed.description = "about x".into();
        feed.link = "https://x.example/".into();
        feed.last_checked = Some(at(checked_day));
        feed.last_published = items.iter().filter_map(|i| i.publish_time).max();
        feed.items = items;
        feed
    }

    #[test]
    fn test_first_merge_takes_everything() {
        let mut target = Feed::new("https://x.example/rss");
        let added = merge_into(
            &mut target,
            fetched(10, vec![item("c", Some(3)), item("b", Some(2)), item("a", Some(1))]),
        );

        assert_eq!(added, 3);
        assert_eq!(target.unread_count(), 3);
        assert_eq!(target.title, "X");
        assert_eq!(target.link, "https://x.example/");
        assert_eq!(target.last_checked, Some(at(10)));
        assert_eq!(target.last_published, Some(at(3)));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut target = Feed::new("https://x.example/rss");
        let result = fetched(10, vec![item("b", Some(2)), item("a", Some(1))]);

        merge_into(&mut target, result.clone());
        let before = target.clone();
        let added = merge_into(&mut target, result);

        assert_eq!(added, 0);
        assert_eq!(target, before);
    }

    #[test]
    fn test_only_newer_items_are_prepended() {
        let mut target = Feed::new("https://x.example/rss");
        merge_into(&mut target, fetched(10, vec![item("old", Some(5))]));
        target.items[0].status = ItemStatus::Read;

        let added = merge_into(
            &mut target,
            fetched(20, vec![item("old", Some(5)), item("new", Some(15)), item("older", Some(8))]),
        );

        assert_eq!(added, 1);
        let titles: Vec<&str> = target.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["new", "old"]);
        assert_eq!(target.items[1].status, ItemStatus::Read);
        assert_eq!(target.last_checked, Some(at(20)));
    }

    #[test]
    fn test_out_of_order_items_are_sorted() {
        let mut target = Feed::new("https://x.example/rss");
        merge_into(
            &mut target,
            fetched(10, vec![item("a", Some(1)), item("c", Some(3)), item("b", Some(2))]),
        );
        let titles: Vec<&str> = target.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_undated_items_deduplicated() {
        let mut target = Feed::new("https://x.example/rss");
        merge_into(&mut target, fetched(10, vec![item("plain", None)]));
        let added = merge_into(&mut target, fetched(11, vec![item("plain", None), item("other", None)]));

        assert_eq!(added, 1);
        assert_eq!(target.items.len(), 2);
        assert_eq!(target.items[0].title, "other");
    }

    #[test]
    fn test_header_only_result_keeps_items() {
        let mut target = Feed::new("https://x.example/rss");
        merge_into(&mut target, fetched(10, vec![item("a", Some(1))]));
        target.error = Some("earlier failure".into());

        let mut header = fetched(12, Vec::new());
        header.last_published = None;
        merge_into(&mut target, header);

        assert_eq!(target.items.len(), 1);
        assert_eq!(target.last_published, Some(at(1)));
        assert_eq!(target.last_checked, Some(at(12)));
        assert!(target.error.is_none());
    }
}
