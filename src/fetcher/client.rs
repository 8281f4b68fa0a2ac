use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use url::Url;

use crate::app::{Result, TributaryError};
use crate::domain::Feed;
use crate::fetcher::{discovery, FeedSource, FetchResult, Fetcher};
use crate::normalizer::Normalizer;

/// Emitted whenever a fetch had to follow an HTML page's alternate link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub from: String,
    pub to: String,
}

/// Validators and metadata from the last successful parse of a URI, used
/// for conditional requests and to answer a 304.
#[derive(Debug, Clone)]
struct Remembered {
    etag: Option<String>,
    last_modified: Option<String>,
    header: Feed,
}

enum Fetched {
    Feed(Feed),
    Page(Vec<u8>),
}

/// Fetches a URI and turns it into a [`Feed`], following HTML
/// `<link rel="alternate">` hints when the URI points at a web page.
pub struct FeedClient {
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    normalizer: Normalizer,
    max_redirects: usize,
    remembered: Mutex<HashMap<String, Remembered>>,
    // Requested URI → the feed URI discovery resolved it to.
    aliases: Mutex<HashMap<String, String>>,
    redirects: broadcast::Sender<Redirect>,
}

impl FeedClient {
    pub fn new(fetcher: Arc<dyn Fetcher + Send + Sync>, max_redirects: usize) -> Self {
        let (redirects, _) = broadcast::channel(64);
        Self {
            fetcher,
            normalizer: Normalizer::new(),
            max_redirects,
            remembered: Mutex::new(HashMap::new()),
            aliases: Mutex::new(HashMap::new()),
            redirects,
        }
    }

    /// Receives `(original, resolved)` pairs for every discovery hop.
    pub fn subscribe_redirects(&self) -> broadcast::Receiver<Redirect> {
        self.redirects.subscribe()
    }

    pub async fn fetch(&self, uri: &str) -> Result<Feed> {
        Url::parse(uri)?;
        let mut current = uri.to_string();

        for _ in 0..=self.max_redirects {
            match self.fetch_once(&current).await? {
                Fetched::Feed(feed) => {
                    if current != uri {
                        lock(&self.aliases).insert(uri.to_string(), current);
                    }
                    return Ok(feed);
                }
                Fetched::Page(body) => {
                    let html = String::from_utf8_lossy(&body);
                    let next = discovery::first_alternate(&current, &html)
                        .ok_or_else(|| TributaryError::NotAFeed(current.clone()))?;

                    info!(from = %current, to = %next, "Following alternate feed link");
                    // Nobody listening is fine.
                    let _ = self.redirects.send(Redirect {
                        from: current.clone(),
                        to: next.clone(),
                    });
                    current = next;
                }
            }
        }

        Err(TributaryError::NotAFeed(uri.to_string()))
    }

    async fn fetch_once(&self, uri: &str) -> Result<Fetched> {
        let (etag, last_modified) = {
            let remembered = self.remembered();
            match remembered.get(uri) {
                Some(r) => (r.etag.clone(), r.last_modified.clone()),
                None => (None, None),
            }
        };

        let result = self
            .fetcher
            .fetch(uri, etag.as_deref(), last_modified.as_deref())
            .await?;

        match result {
            FetchResult::NotModified => {
                debug!(uri, "Feed not modified");
                let mut feed = self
                    .remembered()
                    .get(uri)
                    .map(|r| r.header.clone())
                    .unwrap_or_else(|| Feed::new(uri));
                feed.last_checked = Some(Utc::now());
                Ok(Fetched::Feed(feed))
            }
            FetchResult::Content {
                body,
                etag,
                last_modified,
            } => {
                if body.iter().all(u8::is_ascii_whitespace) {
                    return Err(TributaryError::NotFound(uri.to_string()));
                }
                if self.normalizer.sniff(&body).is_none() {
                    return Ok(Fetched::Page(body));
                }

                let mut feed = self.normalizer.normalize(uri, &body)?;
                feed.last_checked = Some(Utc::now());

                let mut header = feed.clone();
                header.items.clear();
                self.remembered().insert(
                    uri.to_string(),
                    Remembered {
                        etag,
                        last_modified,
                        header,
                    },
                );

                Ok(Fetched::Feed(feed))
            }
        }
    }

    /// Forgets the validators for `uri`, and for the feed it resolved to
    /// if it was a page.
    pub fn forget(&self, uri: &str) {
        let resolved = lock(&self.aliases).remove(uri);
        let mut remembered = self.remembered();
        remembered.remove(uri);
        if let Some(resolved) = resolved {
            remembered.remove(&resolved);
        }
    }

    fn remembered(&self) -> MutexGuard<'_, HashMap<String, Remembered>> {
        lock(&self.remembered)
    }
}

// Both maps hold plain data, so a poisoned lock is still consistent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl FeedSource for FeedClient {
    async fn fetch_feed(&self, uri: &str) -> Result<Feed> {
        self.fetch(uri).await
    }

    fn forget(&self, uri: &str) {
        FeedClient::forget(self, uri);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>B</title><link>https://b.example/</link><description>d</description>
<item><title>one</title><link>https://b.example/1</link><pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate></item>
</channel></rss>"#;

    const PAGE: &str = r#"<html><head>
<link rel="alternate" type="application/rss+xml" href="https://b.example/rss">
</head><body>hi</body></html>"#;

    /// Serves canned bodies; answers 304 when the caller's ETag matches.
    #[derive(Default)]
    struct CannedFetcher {
        bodies: HashMap<String, (String, Option<String>)>,
        requests: Mutex<Vec<(String, Option<String>)>>,
    }

    impl CannedFetcher {
        fn with(mut self, url: &str, body: &str, etag: Option<&str>) -> Self {
            self.bodies
                .insert(url.to_string(), (body.to_string(), etag.map(String::from)));
            self
        }
    }

    #[async_trait]
    impl Fetcher for CannedFetcher {
        async fn fetch(
            &self,
            url: &str,
            etag: Option<&str>,
            _last_modified: Option<&str>,
        ) -> Result<FetchResult> {
            self.requests
                .lock()
                .unwrap()
                .push((url.to_string(), etag.map(String::from)));
            let (body, served_etag) = self
                .bodies
                .get(url)
                .cloned()
                .ok_or(TributaryError::Status(404))?;
            if etag.is_some() && etag == served_etag.as_deref() {
                return Ok(FetchResult::NotModified);
            }
            Ok(FetchResult::Content {
                body: body.into_bytes(),
                etag: served_etag,
                last_modified: None,
            })
        }
    }

    fn client(fetcher: CannedFetcher) -> FeedClient {
        FeedClient::new(Arc::new(fetcher), 3)
    }

    #[tokio::test]
    async fn test_fetch_feed_directly() {
        let client = client(CannedFetcher::default().with("https://b.example/rss", RSS, None));
        let feed = client.fetch("https://b.example/rss").await.unwrap();

        assert_eq!(feed.uri, "https://b.example/rss");
        assert_eq!(feed.title, "B");
        assert_eq!(feed.items.len(), 1);
        assert!(feed.last_checked.is_some());
        assert!(feed.last_published.is_some());
    }

    #[tokio::test]
    async fn test_html_page_follows_alternate_and_notifies() {
        let client = client(
            CannedFetcher::default()
                .with("https://b.example/page.html", PAGE, None)
                .with("https://b.example/rss", RSS, None),
        );
        let mut redirects = client.subscribe_redirects();

        let feed = client.fetch("https://b.example/page.html").await.unwrap();

        assert_eq!(feed.uri, "https://b.example/rss");
        assert_eq!(
            redirects.try_recv().unwrap(),
            Redirect {
                from: "https://b.example/page.html".into(),
                to: "https://b.example/rss".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_html_without_alternate_is_not_a_feed() {
        let client = client(CannedFetcher::default().with(
            "https://c.example/",
            "<html><body>nothing</body></html>",
            None,
        ));
        let err = client.fetch("https://c.example/").await.unwrap_err();
        assert!(matches!(err, TributaryError::NotAFeed(uri) if uri == "https://c.example/"));
    }

    #[tokio::test]
    async fn test_redirect_loop_is_bounded() {
        let looping = r#"<link rel="alternate" type="application/rss+xml" href="https://d.example/">"#;
        let fetcher = CannedFetcher::default().with("https://d.example/", looping, None);
        let client = FeedClient::new(Arc::new(fetcher), 2);

        let err = client.fetch("https://d.example/").await.unwrap_err();
        assert!(matches!(err, TributaryError::NotAFeed(_)));
    }

    #[tokio::test]
    async fn test_status_and_empty_body_errors() {
        let client = client(CannedFetcher::default().with("https://e.example/", "  \n", None));
        assert!(matches!(
            client.fetch("https://missing.example/").await,
            Err(TributaryError::Status(404))
        ));
        assert!(matches!(
            client.fetch("https://e.example/").await,
            Err(TributaryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_etag_sent_and_not_modified_returns_header_only() {
        let fetcher = CannedFetcher::default().with("https://b.example/rss", RSS, Some("\"v1\""));
        let client = FeedClient::new(Arc::new(fetcher), 3);

        let first = client.fetch("https://b.example/rss").await.unwrap();
        let second = client.fetch("https://b.example/rss").await.unwrap();

        assert_eq!(first.items.len(), 1);
        assert!(second.items.is_empty());
        assert_eq!(second.title, "B");
        assert_eq!(second.last_published, first.last_published);
        assert!(second.last_checked >= first.last_checked);
    }

    #[tokio::test]
    async fn test_unparseable_uri_is_rejected_before_fetching() {
        let fetcher = Arc::new(CannedFetcher::default());
        let client = FeedClient::new(fetcher.clone(), 3);

        let err = client.fetch("not a url").await.unwrap_err();

        assert!(matches!(err, TributaryError::InvalidUrl(_)));
        assert!(fetcher.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_forget_drops_validators_of_page_and_resolved_feed() {
        let client = client(
            CannedFetcher::default()
                .with("https://b.example/page.html", PAGE, None)
                .with("https://b.example/rss", RSS, Some("\"v1\""))
                .with("https://f.example/rss", RSS, Some("\"v2\"")),
        );
        client.fetch("https://b.example/page.html").await.unwrap();
        client.fetch("https://f.example/rss").await.unwrap();
        assert_eq!(client.remembered().len(), 2);

        client.forget("https://b.example/page.html");
        assert!(!client.remembered().contains_key("https://b.example/rss"));
        assert!(lock(&client.aliases).is_empty());

        FeedSource::forget(&client, "https://f.example/rss");
        assert!(client.remembered().is_empty());
    }
}
