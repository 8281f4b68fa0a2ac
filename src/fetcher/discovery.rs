//! Finds feed links advertised by an HTML page through
//! `<link rel="alternate" type="application/rss+xml" href="...">`.

use std::collections::HashMap;
use std::sync::OnceLock;

use html_escape::decode_html_entities;
use regex::Regex;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlternateLink {
    /// Absolute URL of the advertised feed.
    pub href: String,
    /// The `type` attribute as written, e.g. `application/atom+xml`.
    pub kind: String,
}

fn link_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<link\b[^>]*>").expect("link tag regex"))
}

fn attribute_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)([a-z][a-z0-9_:-]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
            .expect("attribute regex")
    })
}

fn attributes(tag: &str) -> HashMap<String, String> {
    attribute_regex()
        .captures_iter(tag)
        .filter_map(|cap| {
            let name = cap.get(1)?.as_str().to_ascii_lowercase();
            let value = cap.get(2).or(cap.get(3)).or(cap.get(4))?.as_str();
            Some((name, decode_html_entities(value).trim().to_string()))
        })
        .collect()
}

fn is_feed_type(kind: &str) -> bool {
    let kind = kind.to_ascii_lowercase();
    kind.contains("rss") || kind.contains("atom")
}

fn resolve(page_uri: &str, href: &str) -> Option<String> {
    match Url::parse(page_uri) {
        Ok(base) => base.join(href).ok().map(String::from),
        Err(_) => Url::parse(href).ok().map(String::from),
    }
}

/// All RSS/Atom alternates on the page, ordered by `type` so the pick is
/// deterministic. Links with the same type keep document order.
pub fn alternate_links(page_uri: &str, html: &str) -> Vec<AlternateLink> {
    let mut links: Vec<AlternateLink> = link_tag_regex()
        .find_iter(html)
        .filter_map(|tag| {
            let attrs = attributes(tag.as_str());
            let is_alternate = attrs.get("rel").is_some_and(|rel| {
                rel.split_whitespace()
                    .any(|token| token.eq_ignore_ascii_case("alternate"))
            });
            if !is_alternate {
                return None;
            }
            let kind = attrs.get("type").filter(|kind| is_feed_type(kind))?;
            let href = attrs.get("href").filter(|href| !href.is_empty())?;
            Some(AlternateLink {
                href: resolve(page_uri, href)?,
                kind: kind.clone(),
            })
        })
        .collect();

    links.sort_by(|a, b| a.kind.cmp(&b.kind));
    links
}

/// The candidate a fetch should follow, if any.
pub fn first_alternate(page_uri: &str, html: &str) -> Option<String> {
    alternate_links(page_uri, html)
        .into_iter()
        .next()
        .map(|link| link.href)
}
