use crate::app::{AppContext, Result, TributaryError};
use crate::domain::{Frequency, Node, NodeId};
use crate::subscriber::Subscriber;

pub async fn add_feed(ctx: &AppContext, url: &str, category: Option<&str>) -> Result<()> {
    let mut subscriber = ctx.subscriber()?;

    let result = async {
        let parent = match category {
            Some(title) => Some(find_or_create_category(&mut subscriber, title)?),
            None => None,
        };
        subscriber.add(url, parent).await
    }
    .await;

    let outcome = match result {
        Ok(id) => {
            if let Some(entry) = subscriber.tree().entry(id) {
                println!("Added feed: {}", entry.uri);
                println!("Feed title: {}", entry.display_title());
                println!("Fetched {} items", entry.count);
            }
            Ok(())
        }
        Err(TributaryError::DuplicateSubscription(uri)) => {
            println!("Feed already exists: {}", uri);
            Ok(())
        }
        Err(e) => Err(e),
    };

    subscriber.shutdown().await;
    outcome
}

pub async fn remove_feed(ctx: &AppContext, url: &str, keep_cache: bool) -> Result<()> {
    let mut subscriber = ctx.subscriber()?;
    let outcome = match subscriber.tree().find(url) {
        Some(id) => subscriber.remove(id, !keep_cache).map(|_| {
            println!("Removed feed: {}", url);
        }),
        None => Err(TributaryError::Other(format!("Not subscribed: {}", url))),
    };
    subscriber.shutdown().await;
    outcome
}

pub async fn add_category(ctx: &AppContext, title: &str) -> Result<()> {
    let mut subscriber = ctx.subscriber()?;
    let outcome = find_or_create_category(&mut subscriber, title).map(|_| {
        println!("Category: {}", title);
    });
    subscriber.shutdown().await;
    outcome
}

pub async fn update_feeds(ctx: &AppContext) -> Result<()> {
    let mut subscriber = ctx.subscriber()?;
    let count = subscriber.tree().entries().len();
    if count == 0 {
        println!("No feeds to update");
        subscriber.shutdown().await;
        return Ok(());
    }

    println!("Updating {} feeds...", count);
    let before = subscriber.tree().total_unread();
    let summary = subscriber.refresh_all().await;
    subscriber.process_pending();

    if summary.skipped_offline {
        println!("Offline, nothing fetched");
    } else {
        for (_, entry) in subscriber.tree().entries() {
            if let Some(error) = &entry.error {
                eprintln!("  Error updating {}: {}", entry.display_title(), error);
            }
        }
        let after = subscriber.tree().total_unread();
        println!(
            "Update complete: {} new items, {} errors",
            after.saturating_sub(before),
            summary.failed
        );
    }

    subscriber.shutdown().await;
    Ok(())
}

pub async fn set_frequency(ctx: &AppContext, url: &str, frequency: Frequency) -> Result<()> {
    let mut subscriber = ctx.subscriber()?;
    let outcome = match subscriber.tree().find(url) {
        Some(id) => subscriber.set_frequency(id, frequency).map(|tier| match tier {
            Some(tier) => println!("{} polls on the {:?} tier", url, tier),
            None => println!("{} is no longer polled", url),
        }),
        None => Err(TributaryError::Other(format!("Not subscribed: {}", url))),
    };
    subscriber.shutdown().await;
    outcome
}

pub async fn list_feeds(ctx: &AppContext) -> Result<()> {
    let mut subscriber = ctx.subscriber()?;

    if subscriber.tree().is_empty() {
        println!("No feeds");
    } else {
        let roots = subscriber.tree().children(None)?.to_vec();
        print_nodes(&subscriber, &roots, 0);
    }

    subscriber.shutdown().await;
    Ok(())
}

fn print_nodes(subscriber: &Subscriber, ids: &[NodeId], depth: usize) {
    let tree = subscriber.tree();
    let indent = "  ".repeat(depth);
    for id in ids {
        match tree.get(*id) {
            Some(Node::Category(category)) => {
                println!("{}{}/ ({} unread)", indent, category.title, tree.unread_count(*id));
                print_nodes(subscriber, &category.children, depth + 1);
            }
            Some(Node::Entry(entry)) => {
                let tier = subscriber
                    .registered_tier(&entry.uri)
                    .map(|tier| format!("{:?}", tier).to_lowercase())
                    .unwrap_or_else(|| "off".to_string());
                let error = entry
                    .error
                    .as_deref()
                    .map(|e| format!(" [error: {}]", e))
                    .unwrap_or_default();
                println!(
                    "{}[{:>4}] {} ({}) {}/{}{}",
                    indent,
                    entry.count,
                    entry.display_title(),
                    entry.uri,
                    entry.frequency,
                    tier,
                    error
                );
            }
            None => {}
        }
    }
}

fn find_or_create_category(subscriber: &mut Subscriber, title: &str) -> Result<NodeId> {
    let tree = subscriber.tree();
    let existing = tree.children(None)?.iter().copied().find(|id| {
        matches!(tree.get(*id), Some(Node::Category(category)) if category.title == title)
    });
    match existing {
        Some(id) => Ok(id),
        None => subscriber.add_category(title, None),
    }
}
