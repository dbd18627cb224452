// src/lib.rs
// Public library surface for integration tests (and the binary).

pub mod analytics;
pub mod api;
pub mod cache;
pub mod client;
pub mod collection;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod feeds;
pub mod metrics;
pub mod store;
pub mod tags;

// ---- Re-exports for stable public API ----
pub use crate::api::create_router;
pub use crate::dashboard::{Dashboard, DashboardConfig, DashboardDeps, DashboardSnapshot};
pub use crate::error::DashboardError;

use std::sync::Arc;

use tracing::info;

use crate::analytics::DocumentSearch;
use crate::cache::TtlCache;
use crate::client::HttpDocumentApi;
use crate::config::{Preferences, Settings};
use crate::feeds::rss::HttpFeedFetcher;
use crate::store::{FileStore, KvStore};

/// Wire a dashboard from settings with the HTTP adapters and a file-backed
/// store. A missing base URL does not fail here; it surfaces as the
/// dashboard's persistent error instead.
pub fn build_dashboard(settings: &Settings) -> anyhow::Result<Arc<Dashboard>> {
    let store: Arc<dyn KvStore> = Arc::new(FileStore::new(&settings.cache.dir));
    let prefs = Preferences::new(store.clone());
    let cache = Arc::new(TtlCache::with_expiry_minutes(
        store,
        prefs.expiry_minutes(),
    ));

    // Without a base URL the adapter points nowhere; refresh never reaches it.
    let base = settings.require_base_url().unwrap_or_default();
    let api = Arc::new(HttpDocumentApi::new(base, settings.token().map(str::to_string))?);
    let fetcher = Arc::new(HttpFeedFetcher::new()?);

    info!(
        target: "dashboard",
        cache_dir = %settings.cache.dir.display(),
        ttl_minutes = prefs.expiry_minutes(),
        "dashboard wired"
    );

    let deps = DashboardDeps {
        collections: api.clone(),
        fetcher,
        search: Some(api as Arc<dyn DocumentSearch>),
        cache,
        preferences: Some(prefs),
    };
    Ok(Arc::new(Dashboard::new(
        DashboardConfig::from_settings(settings),
        deps,
    )))
}
