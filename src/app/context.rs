use std::sync::Arc;
use std::time::Duration;

use crate::app::Result;
use crate::cache::CacheStore;
use crate::config::Config;
use crate::fetcher::http_fetcher::HttpFetcher;
use crate::fetcher::{FeedClient, Fetcher};
use crate::monitor::{Connectivity, RouteProbe};
use crate::store::{DebouncedSaver, JsonTreeStore, TreeStore};
use crate::subscriber::Subscriber;

pub struct AppContext {
    pub config: Config,
    pub client: Arc<FeedClient>,
    pub tree_store: Arc<JsonTreeStore>,
    pub connectivity: Arc<dyn Connectivity>,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        let fetcher: Arc<dyn Fetcher + Send + Sync> = Arc::new(HttpFetcher::new(&config.http)?);
        let client = Arc::new(FeedClient::new(fetcher, config.http.max_redirects));
        let tree_store = Arc::new(JsonTreeStore::new(config.subscriptions_path()?));

        Ok(Self {
            config,
            client,
            tree_store,
            connectivity: Arc::new(RouteProbe::default()),
        })
    }

    /// Builds a subscriber over the saved tree, with tree changes persisted
    /// through a debounced saver.
    pub fn subscriber(&self) -> Result<Subscriber> {
        let cache = CacheStore::new(
            self.config.cache_dir()?,
            self.config.cache.capacity,
            self.config.cache.read_only,
        )?;
        let saver = DebouncedSaver::spawn(
            self.tree_store.clone(),
            Duration::from_millis(self.config.subscriptions.save_debounce_ms),
        );

        let mut subscriber = Subscriber::new(
            &self.config.polling,
            cache,
            self.client.clone(),
            self.connectivity.clone(),
        )
        .with_saver(saver);
        subscriber.load(&self.tree_store.load()?);
        Ok(subscriber)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CategoryRecord, EntryRecord};
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.cache.directory = Some(dir.path().join("feeds"));
        config.subscriptions.path = Some(dir.path().join("subs.json"));
        config
    }

    #[tokio::test]
    async fn test_subscriber_loads_saved_tree() {
        let dir = TempDir::new().unwrap();
        let ctx = AppContext::new(config_in(&dir)).unwrap();
        ctx.tree_store
            .save(&[CategoryRecord {
                title: "News".into(),
                entries: vec![EntryRecord {
                    uri: "https://a.example/feed".into(),
                    count: 5,
                    ..Default::default()
                }],
                ..Default::default()
            }])
            .unwrap();

        let subscriber = ctx.subscriber().unwrap();

        assert_eq!(subscriber.tree().total_unread(), 5);
        assert!(subscriber.cache().contains("https://a.example/feed"));
        assert!(subscriber.registered_tier("https://a.example/feed").is_some());
    }

    #[tokio::test]
    async fn test_fresh_install_is_empty() {
        let dir = TempDir::new().unwrap();
        let ctx = AppContext::new(config_in(&dir)).unwrap();
        let subscriber = ctx.subscriber().unwrap();
        assert!(subscriber.tree().is_empty());
        assert!(dir.path().join("feeds").exists());
    }
}
