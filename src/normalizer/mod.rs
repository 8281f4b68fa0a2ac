use std::sync::OnceLock;

use chrono::Utc;
use feed_rs::model::Link;
use feed_rs::parser;
use html_escape::decode_html_entities;
use regex::Regex;

use crate::app::{Result, TributaryError};
use crate::domain::{Feed, Item};

/// Document kinds recognised from the root element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    /// `<rss>`: RSS 0.91, 0.92 and 2.0
    Rss,
    /// `<rdf:RDF>`: RSS 1.0
    Rdf,
    /// `<feed>`: Atom 0.3 and 1.0
    Atom,
}

// Bytes inspected when looking for the root element.
const SNIFF_WINDOW: usize = 64 * 1024;

fn root_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<!--.*?-->|<!\[CDATA\[.*?\]\]>|<[?!][^>]*>|<([A-Za-z_][\w:.-]*)")
            .expect("root element regex")
    })
}

#[derive(Clone)]
pub struct Normalizer;

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Looks at the first element of the document. `None` means the body is
    /// not a feed (usually an HTML page).
    pub fn sniff(&self, body: &[u8]) -> Option<FeedFormat> {
        let window = &body[..body.len().min(SNIFF_WINDOW)];
        let text = String::from_utf8_lossy(window);

        let root = root_regex()
            .captures_iter(&text)
            .find_map(|cap| cap.get(1))?
            .as_str();
        let local = root.rsplit(':').next().unwrap_or(root);

        if local.eq_ignore_ascii_case("rss") {
            Some(FeedFormat::Rss)
        } else if local.eq_ignore_ascii_case("rdf") {
            Some(FeedFormat::Rdf)
        } else if local.eq_ignore_ascii_case("feed") {
            Some(FeedFormat::Atom)
        } else {
            None
        }
    }

    /// Parses a feed document and stamps `uri` on the result.
    pub fn normalize(&self, uri: &str, body: &[u8]) -> Result<Feed> {
        let parsed = parser::parse(body).map_err(|e| TributaryError::FeedParse(e.to_string()))?;

        let items: Vec<Item> = parsed
            .entries
            .into_iter()
            .map(|entry| {
                let mut item = Item::new(
                    entry
                        .title
                        .map(|t| decode_html_entities(&t.content).to_string())
                        .unwrap_or_default(),
                    preferred_link(&entry.links).unwrap_or_default(),
                );
                item.summary = entry
                    .summary
                    .map(|s| decode_html_entities(&s.content).to_string())
                    .unwrap_or_default();
                item.content = entry
                    .content
                    .and_then(|c| c.body)
                    .map(|b| decode_html_entities(&b).to_string())
                    .unwrap_or_default();
                item.publish_time = entry
                    .published
                    .or(entry.updated)
                    .map(|dt| dt.with_timezone(&Utc));
                item.categories = entry
                    .categories
                    .into_iter()
                    .map(|c| c.label.unwrap_or(c.term))
                    .filter(|c| !c.is_empty())
                    .collect();
                item
            })
            .collect();

        let mut feed = Feed::new(uri);
        feed.title = parsed
            .title
            .map(|t| decode_html_entities(&t.content).to_string())
            .unwrap_or_default();
        feed.description = parsed
            .description
            .map(|d| decode_html_entities(&d.content).to_string())
            .unwrap_or_default();
        feed.link = preferred_link(&parsed.links).unwrap_or_default();
        feed.items = items;
        feed.last_published = feed.newest_publish_time();

        Ok(feed)
    }
}

/// The alternate (or unqualified) link, falling back to the first one.
fn preferred_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|l| l.rel.as_deref().map_or(true, |rel| rel == "alternate"))
        .or_else(|| links.first())
        .map(|l| l.href.clone())
}
