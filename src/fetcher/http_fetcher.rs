use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH,
    LAST_MODIFIED,
};
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::app::{Result, TributaryError};
use crate::config::HttpConfig;
use crate::fetcher::{FetchResult, Fetcher};

/// Feeds first, but HTML is welcome too: a page may point at its feed.
const FEED_ACCEPT: &str = "application/rss+xml, application/atom+xml, application/rdf+xml;q=0.9, \
                           application/xml;q=0.9, text/xml;q=0.9, text/html;q=0.8, */*;q=0.5";

/// reqwest-backed [`Fetcher`]. Validators from the previous response are
/// sent back so unchanged feeds cost a 304.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .brotli(true)
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self { client })
    }
}

/// Request headers for a conditional GET. Validators that aren't valid
/// header values are left out rather than failing the request.
fn request_headers(etag: Option<&str>, last_modified: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(FEED_ACCEPT));

    let validators = [(IF_NONE_MATCH, etag), (IF_MODIFIED_SINCE, last_modified)];
    for (name, value) in validators {
        if let Some(value) = value.and_then(|v| HeaderValue::from_str(v).ok()) {
            headers.insert(name, value);
        }
    }
    headers
}

fn header_string(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<FetchResult> {
        let response = self
            .client
            .get(url)
            .headers(request_headers(etag, last_modified))
            .send()
            .await?;

        let status = response.status();
        debug!(url, status = status.as_u16(), "Fetched");
        if status == StatusCode::NOT_MODIFIED {
            return Ok(FetchResult::NotModified);
        }
        if !status.is_success() {
            return Err(TributaryError::Status(status.as_u16()));
        }

        let etag = header_string(response.headers(), ETAG);
        let last_modified = header_string(response.headers(), LAST_MODIFIED);
        let body = response.bytes().await?.to_vec();

        Ok(FetchResult::Content {
            body,
            etag,
            last_modified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconditional_request_only_asks_for_feeds() {
        let headers = request_headers(None, None);
        assert_eq!(headers.len(), 1);
        assert!(headers[ACCEPT].to_str().unwrap().starts_with("application/rss+xml"));
    }

    #[test]
    fn test_validators_are_sent_back() {
        let headers = request_headers(Some("\"abc\""), Some("Mon, 01 Jan 2024 00:00:00 GMT"));
        assert_eq!(headers[IF_NONE_MATCH], "\"abc\"");
        assert_eq!(headers[IF_MODIFIED_SINCE], "Mon, 01 Jan 2024 00:00:00 GMT");
    }

    #[test]
    fn test_invalid_validator_is_dropped() {
        let headers = request_headers(Some("bad\nvalue"), None);
        assert!(headers.get(IF_NONE_MATCH).is_none());
    }

    #[test]
    fn test_header_string() {
        let mut headers = HeaderMap::new();
        headers.insert(ETAG, HeaderValue::from_static("W/\"1\""));
        assert_eq!(header_string(&headers, ETAG).as_deref(), Some("W/\"1\""));
        assert_eq!(header_string(&headers, LAST_MODIFIED), None);
    }

    #[test]
    fn test_client_builds_from_config() {
        assert!(HttpFetcher::new(&HttpConfig::default()).is_ok());
    }
}
