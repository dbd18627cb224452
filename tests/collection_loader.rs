// tests/collection_loader.rs
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use feedboard::cache::TtlCache;
use feedboard::collection::{cache_key, CollectionLoader, CollectionRecord, CollectionSource, RawItem};
use feedboard::store::MemoryStore;
use feedboard::DashboardError;
use serde_json::json;

struct StubSource {
    items: Vec<RawItem>,
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl StubSource {
    fn new(items: Vec<RawItem>) -> Self {
        Self {
            items,
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CollectionSource for StubSource {
    async fn fetch_collection_items(&self, _collection_id: &str) -> anyhow::Result<Vec<RawItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("502 bad gateway"));
        }
        Ok(self.items.clone())
    }
}

fn item(id: &str, title: &str, props: serde_json::Value) -> RawItem {
    RawItem {
        id: id.into(),
        title: Some(title.into()),
        properties: props.as_object().cloned().unwrap_or_default(),
    }
}

fn two_items() -> Vec<RawItem> {
    vec![
        item(
            "1",
            "A",
            json!({"URL": "https://a.com/feed", "Category": "Tech", "Tags": ["rust", "#async"]}),
        ),
        item("2", "B", json!({"URL": "https://b.com/feed"})),
    ]
}

fn setup(minutes: u64, items: Vec<RawItem>) -> (Arc<StubSource>, Arc<TtlCache>, CollectionLoader) {
    let source = Arc::new(StubSource::new(items));
    let cache = Arc::new(TtlCache::with_expiry_minutes(
        Arc::new(MemoryStore::new()),
        minutes,
    ));
    let loader = CollectionLoader::new(source.clone(), cache.clone());
    (source, cache, loader)
}

#[tokio::test]
async fn invalid_items_are_dropped_and_valid_ones_cached() {
    let (source, cache, loader) = setup(60, two_items());

    let records = loader.load("c1", false).await.expect("load ok");
    assert_eq!(
        records,
        vec![CollectionRecord {
            id: "1".into(),
            title: "A".into(),
            url: "https://a.com/feed".into(),
            category: "Tech".into(),
            tags: vec!["rust".into(), "async".into()],
        }]
    );
    assert_eq!(source.calls(), 1);

    let cached: Vec<CollectionRecord> = cache.get(&cache_key("c1")).expect("written through");
    assert_eq!(cached, records);
}

#[tokio::test]
async fn cache_hit_skips_the_network() {
    let (source, _cache, loader) = setup(60, two_items());

    let first = loader.load("c1", false).await.unwrap();
    let second = loader.load("c1", false).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn forced_load_bypasses_cache() {
    let (source, _cache, loader) = setup(60, two_items());

    loader.load("c1", false).await.unwrap();
    loader.load("c1", true).await.unwrap();
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn failed_forced_refresh_leaves_cache_empty() {
    let (source, cache, loader) = setup(60, two_items());
    loader.load("c1", false).await.unwrap();

    source.fail.store(true, Ordering::SeqCst);
    let err = loader.load("c1", true).await.unwrap_err();
    assert!(matches!(err, DashboardError::FetchFailure { ref source_id, .. } if source_id == "c1"));
    assert_eq!(cache.get::<Vec<CollectionRecord>>(&cache_key("c1")), None);

    // With the entry gone, an unforced load also goes to the network.
    assert!(loader.load("c1", false).await.is_err());
    assert_eq!(source.calls(), 3);
}

#[tokio::test]
async fn zero_ttl_always_fetches() {
    let (source, _cache, loader) = setup(0, two_items());

    for _ in 0..3 {
        loader.load("c1", false).await.unwrap();
    }
    assert_eq!(source.calls(), 3);
}

#[tokio::test]
async fn blank_collection_id_is_a_configuration_error() {
    let (source, _cache, loader) = setup(60, two_items());

    let err = loader.load("  ", false).await.unwrap_err();
    assert!(matches!(err, DashboardError::ConfigurationMissing(_)));
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn collections_are_cached_independently() {
    let (source, _cache, loader) = setup(60, two_items());

    loader.load("c1", false).await.unwrap();
    loader.load("c2", false).await.unwrap();
    loader.load("c1", false).await.unwrap();
    assert_eq!(source.calls(), 2);
}
