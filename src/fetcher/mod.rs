pub mod client;
pub mod discovery;
pub mod http_fetcher;

use async_trait::async_trait;

use crate::app::Result;
use crate::domain::Feed;

pub use client::{FeedClient, Redirect};

#[derive(Debug)]
pub enum FetchResult {
    /// New content fetched successfully
    Content {
        body: Vec<u8>,
        etag: Option<String>,
        last_modified: Option<String>,
    },
    /// Content not modified (HTTP 304)
    NotModified,
}

/// Raw HTTP layer: one conditional GET.
#[async_trait]
pub trait Fetcher {
    async fn fetch(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<FetchResult>;
}

/// Anything that can turn a URI into a parsed [`Feed`]. The schedulers poll
/// through this seam.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_feed(&self, uri: &str) -> Result<Feed>;

    /// Drops whatever was kept about `uri` between fetches. Called once the
    /// subscription is gone.
    fn forget(&self, _uri: &str) {}
}
