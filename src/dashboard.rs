// src/dashboard.rs
//! The state surface the presentation layer depends on.
//!
//! Owned state lives behind a mutex; every change republishes a
//! [`DashboardSnapshot`] through a `watch` channel. Derived views
//! (`visible_records`, `chart`, `tag_lines`) are recomputed on each call.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::analytics::{self, ChartBar, DocumentSearch, Granularity, LogEntry, TagLogLoader};
use crate::cache::TtlCache;
use crate::collection::{CollectionLoader, CollectionRecord, CollectionSource};
use crate::config::{DisplayMode, Preferences, Settings};
use crate::error::{DashboardError, Result};
use crate::feeds::aggregator::{FeedAggregator, RefreshReport};
use crate::feeds::{FeedFetcher, FeedResult};
use crate::tags::{self, in_scope, normalize_tag, Segment};

/// What the dashboard needs to know from configuration.
#[derive(Debug, Clone, Default)]
pub struct DashboardConfig {
    pub feeds_collection: Option<String>,
    pub bookmarks_collection: Option<String>,
    pub tag_scope: Option<String>,
    pub allowed_tags: Vec<String>,
    /// Set when configuration is unusable (e.g. no API base URL); every
    /// refresh reports it instead of touching the network.
    pub config_error: Option<DashboardError>,
}

impl DashboardConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            feeds_collection: settings.require_feeds_collection().ok().map(str::to_string),
            bookmarks_collection: settings.bookmarks_collection().map(str::to_string),
            tag_scope: settings.tags.scope.clone(),
            allowed_tags: settings.tags.allowed.clone(),
            config_error: settings.require_base_url().err(),
        }
    }
}

/// External collaborators.
pub struct DashboardDeps {
    pub collections: Arc<dyn CollectionSource>,
    pub fetcher: Arc<dyn FeedFetcher>,
    pub search: Option<Arc<dyn DocumentSearch>>,
    pub cache: Arc<TtlCache>,
    pub preferences: Option<Preferences>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DashboardSnapshot {
    pub records: Vec<CollectionRecord>,
    pub bookmarks: Vec<CollectionRecord>,
    pub feed_results: BTreeMap<String, FeedResult>,
    pub loading_ids: BTreeSet<String>,
    pub failed_ids: BTreeSet<String>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub selected_tags: BTreeSet<String>,
    pub display_mode: DisplayMode,
    pub expiry_minutes: u64,
    pub log_entries: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TagLines {
    pub document_id: String,
    pub document_title: String,
    pub text: String,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Default)]
struct ViewState {
    records: Vec<CollectionRecord>,
    bookmarks: Vec<CollectionRecord>,
    is_loading: bool,
    error: Option<DashboardError>,
    selected: BTreeSet<String>,
    logs: Vec<LogEntry>,
}

pub struct Dashboard {
    config: DashboardConfig,
    loader: CollectionLoader,
    feeds: FeedAggregator,
    logs: Option<TagLogLoader>,
    cache: Arc<TtlCache>,
    prefs: Option<Preferences>,
    state: Mutex<ViewState>,
    tx: watch::Sender<DashboardSnapshot>,
}

impl Dashboard {
    pub fn new(config: DashboardConfig, deps: DashboardDeps) -> Self {
        let feeds_key = config.feeds_collection.clone().unwrap_or_default();
        let logs = deps.search.map(|search| {
            TagLogLoader::new(
                search,
                deps.cache.clone(),
                config.tag_scope.clone(),
                config.allowed_tags.clone(),
            )
        });
        let (tx, _rx) = watch::channel(DashboardSnapshot::default());
        Self {
            loader: CollectionLoader::new(deps.collections, deps.cache.clone()),
            feeds: FeedAggregator::new(deps.fetcher, deps.cache.clone(), &feeds_key),
            cache: deps.cache,
            logs,
            prefs: deps.preferences,
            state: Mutex::new(ViewState::default()),
            tx,
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ViewState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }

    fn update(&self, f: impl FnOnce(&mut ViewState)) {
        f(&mut self.lock());
        self.publish();
    }

    fn publish(&self) {
        self.tx.send_replace(self.snapshot());
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardSnapshot> {
        self.tx.subscribe()
    }

    pub fn feeds(&self) -> &FeedAggregator {
        &self.feeds
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        let feeds = self.feeds.snapshot();
        let st = self.lock();
        DashboardSnapshot {
            records: st.records.clone(),
            bookmarks: st.bookmarks.clone(),
            feed_results: feeds.results,
            loading_ids: feeds.loading,
            failed_ids: feeds.failed,
            is_loading: st.is_loading,
            error: st.error.as_ref().map(DashboardError::user_message),
            selected_tags: st.selected.clone(),
            display_mode: self
                .prefs
                .as_ref()
                .map(Preferences::display_mode)
                .unwrap_or_default(),
            expiry_minutes: self.cache.ttl().as_secs() / 60,
            log_entries: st.logs.len(),
        }
    }

    pub fn error(&self) -> Option<DashboardError> {
        self.lock().error.clone()
    }

    /// Paint from cache, then revalidate in the background.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        if let Some(records) = self.feeds.hydrate() {
            self.update(|s| s.records = records);
        }
        self.spawn_forwarder();

        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.refresh_with(false, true).await {
                warn!(target: "dashboard", error = %e, "initial refresh failed");
            }
        })
    }

    // Republish whenever the aggregator's loading set or results change.
    fn spawn_forwarder(self: &Arc<Self>) {
        let mut rx = self.feeds.subscribe();
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                match weak.upgrade() {
                    Some(d) => d.publish(),
                    None => break,
                }
            }
        });
    }

    /// Fire-and-forget refresh.
    pub fn spawn_refresh(self: &Arc<Self>, force: bool) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.refresh(force).await {
                warn!(target: "dashboard", error = %e, "refresh failed");
            }
        })
    }

    pub async fn refresh(&self, force: bool) -> Result<RefreshReport> {
        self.refresh_with(force, force).await
    }

    /// Reload the parent collections, every feed and the tag logs.
    ///
    /// Only parent collection failures set `error`; individual feed
    /// failures are reported in the returned [`RefreshReport`] and tag log
    /// failures are only logged.
    pub async fn refresh_with(&self, force_collection: bool, force_feeds: bool) -> Result<RefreshReport> {
        if let Some(e) = self.config.config_error.clone() {
            self.update(|s| s.error = Some(e.clone()));
            return Err(e);
        }
        let Some(feeds_id) = self.config.feeds_collection.clone() else {
            let e = DashboardError::ConfigurationMissing("feeds collection id".into());
            self.update(|s| s.error = Some(e.clone()));
            return Err(e);
        };

        self.update(|s| {
            s.is_loading = true;
            s.error = None;
        });

        if let Some(bookmarks_id) = self.config.bookmarks_collection.as_deref() {
            match self.loader.load(bookmarks_id, force_collection).await {
                Ok(bookmarks) => self.update(|s| s.bookmarks = bookmarks),
                Err(e) => self.update(|s| s.error = Some(e)),
            }
        }

        let records = match self.loader.load(&feeds_id, force_collection).await {
            Ok(r) => r,
            Err(e) => {
                self.update(|s| {
                    s.is_loading = false;
                    s.error = Some(e.clone());
                });
                self.reload_logs(force_collection).await;
                return Err(e);
            }
        };
        self.update(|s| {
            s.records = records.clone();
            s.is_loading = false;
        });

        let (report, ()) = tokio::join!(
            self.feeds.refresh_all(&records, force_feeds),
            self.reload_logs(force_collection)
        );
        info!(
            target: "dashboard",
            records = records.len(),
            feeds_loaded = report.loaded.len(),
            feeds_failed = report.failed.len(),
            "dashboard refreshed"
        );
        self.publish();
        Ok(report)
    }

    /// Load tagged log entries. A no-op returning 0 when no search
    /// capability is configured.
    pub async fn refresh_logs(&self, force: bool) -> Result<usize> {
        let Some(loader) = self.logs.as_ref() else {
            return Ok(0);
        };
        let entries = loader.load(force).await?;
        let n = entries.len();
        self.update(|s| s.logs = entries);
        Ok(n)
    }

    async fn reload_logs(&self, force: bool) {
        if let Err(e) = self.refresh_logs(force).await {
            warn!(target: "dashboard", error = %e, "tag log load failed");
        }
    }

    /// Toggle a tag in the active filter. Returns whether it is now selected.
    pub fn toggle_filter(&self, tag: &str) -> bool {
        let tag = normalize_tag(tag);
        if tag.is_empty() {
            return false;
        }
        let mut selected = false;
        self.update(|s| {
            if !s.selected.remove(&tag) {
                s.selected.insert(tag);
                selected = true;
            }
        });
        selected
    }

    pub fn clear_filters(&self) {
        self.update(|s| s.selected.clear());
    }

    pub fn set_display_mode(&self, mode: DisplayMode) {
        if let Some(p) = &self.prefs {
            p.set_display_mode(mode);
        }
        self.publish();
    }

    /// Persist a new cache expiry and apply it to every subsequent read.
    /// `0` disables serving from cache.
    pub fn set_expiry_minutes(&self, minutes: u64) {
        if let Some(p) = &self.prefs {
            p.set_expiry_minutes(minutes);
        }
        self.cache
            .set_ttl(Duration::from_secs(minutes.saturating_mul(60)));
        info!(target: "dashboard", minutes, "cache expiry changed");
        self.publish();
    }

    /// Feed records matching the active filter (all when none selected).
    pub fn visible_records(&self) -> Vec<CollectionRecord> {
        let st = self.lock();
        st.records
            .iter()
            .filter(|r| record_matches(r, &st.selected))
            .cloned()
            .collect()
    }

    pub fn log_entries(&self) -> Vec<LogEntry> {
        self.lock().logs.clone()
    }

    pub fn chart(&self, granularity: Granularity, now: DateTime<Utc>) -> Vec<ChartBar> {
        let st = self.lock();
        analytics::chart(&st.logs, granularity, &st.selected, now)
    }

    pub fn tag_totals(&self) -> Vec<(String, u32)> {
        analytics::tag_totals(&self.lock().logs)
    }

    /// Per-document lines mentioning `tag` (or any allowed tag when `None`),
    /// segmented for rendering.
    pub fn tag_lines(&self, tag: Option<&str>) -> Vec<TagLines> {
        let allowed: Vec<String> = match tag {
            Some(t) => vec![normalize_tag(t)],
            None => self.config.allowed_tags.clone(),
        };
        let st = self.lock();
        st.logs
            .iter()
            .filter_map(|e| {
                let text = tags::filter_allowed_lines(&e.markdown, &allowed, "\n");
                if text.is_empty() {
                    return None;
                }
                Some(TagLines {
                    document_id: e.document_id.clone(),
                    document_title: e.document_title.clone(),
                    segments: tags::segment(&text, &allowed),
                    text,
                })
            })
            .collect()
    }
}

fn record_matches(record: &CollectionRecord, selected: &BTreeSet<String>) -> bool {
    if selected.is_empty() {
        return true;
    }
    let category = record.category.to_lowercase();
    selected
        .iter()
        .any(|s| *s == category || record.tags.iter().any(|t| in_scope(t, s)))
}
