// src/feeds/aggregator.rs
//! # Feed Aggregator
//! One fetch per collection record, all in flight at once, joined with a
//! wait-for-all that never lets one failure abort its siblings.
//!
//! - A source id sits in the loading set from fetch start to settle and is
//!   removed exactly once (drop guard).
//! - Every success rewrites the cached `{records, feeds}` bundle with the
//!   whole current map, so the cache accumulates all sources fetched so far.
//! - Re-entry for an id that is loading (or already loaded, unless forced)
//!   is a no-op.
//! - State is behind a `std::sync::Mutex` that is never held across `.await`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::join_all;
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::TtlCache;
use crate::collection::CollectionRecord;
use crate::error::DashboardError;
use crate::feeds::{FeedFetcher, FeedResult};

/// What the cache stores for the feeds view.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeedBundle {
    pub records: Vec<CollectionRecord>,
    pub feeds: BTreeMap<String, FeedResult>,
}

/// Observable state: loaded results, in-flight ids, and ids whose last
/// attempt failed.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct FeedSnapshot {
    pub results: BTreeMap<String, FeedResult>,
    pub loading: BTreeSet<String>,
    pub failed: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Loaded { items: usize },
    /// Fetched, but nothing parseable came back.
    Unparseable,
    Failed(DashboardError),
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub loaded: Vec<String>,
    pub unparseable: Vec<String>,
    pub failed: Vec<(String, DashboardError)>,
    pub skipped: Vec<String>,
}

impl RefreshReport {
    pub fn settled(&self) -> usize {
        self.loaded.len() + self.unparseable.len() + self.failed.len()
    }
}

#[derive(Debug, Default)]
struct State {
    records: Vec<CollectionRecord>,
    results: BTreeMap<String, FeedResult>,
    loading: BTreeSet<String>,
    failed: BTreeSet<String>,
}

impl State {
    fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            results: self.results.clone(),
            loading: self.loading.clone(),
            failed: self.failed.clone(),
        }
    }

    fn bundle(&self) -> FeedBundle {
        FeedBundle {
            records: self.records.clone(),
            feeds: self.results.clone(),
        }
    }
}

pub fn cache_key(collection_id: &str) -> String {
    format!("feeds:{collection_id}")
}

pub struct FeedAggregator {
    fetcher: Arc<dyn FeedFetcher>,
    cache: Arc<TtlCache>,
    cache_key: String,
    state: Mutex<State>,
    tx: watch::Sender<FeedSnapshot>,
}

impl FeedAggregator {
    pub fn new(fetcher: Arc<dyn FeedFetcher>, cache: Arc<TtlCache>, collection_id: &str) -> Self {
        let (tx, _rx) = watch::channel(FeedSnapshot::default());
        Self {
            fetcher,
            cache,
            cache_key: cache_key(collection_id),
            state: Mutex::new(State::default()),
            tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }

    fn publish(&self) {
        let snap = {
            let st = self.lock();
            gauge!("feeds_loading").set(st.loading.len() as f64);
            st.snapshot()
        };
        self.tx.send_replace(snap);
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        self.lock().snapshot()
    }

    pub fn results(&self) -> BTreeMap<String, FeedResult> {
        self.lock().results.clone()
    }

    pub fn loading_ids(&self) -> BTreeSet<String> {
        self.lock().loading.clone()
    }

    /// Populate from the cached bundle, if present and unexpired. Returns the
    /// cached records so the caller can paint before revalidating.
    pub fn hydrate(&self) -> Option<Vec<CollectionRecord>> {
        let bundle: FeedBundle = self.cache.get(&self.cache_key)?;
        let records = bundle.records.clone();
        {
            let mut st = self.lock();
            st.records = bundle.records;
            for (id, feed) in bundle.feeds {
                st.results.entry(id).or_insert(feed);
            }
        }
        debug!(target: "feeds", n = records.len(), "hydrated from cache");
        self.publish();
        Some(records)
    }

    /// Refresh every record concurrently and wait until all have settled.
    pub async fn refresh_all(&self, records: &[CollectionRecord], force: bool) -> RefreshReport {
        self.lock().records = records.to_vec();

        let outcomes = join_all(records.iter().map(|r| async move {
            (r.id.clone(), self.refresh_one(r, force).await)
        }))
        .await;

        let mut report = RefreshReport::default();
        for (id, outcome) in outcomes {
            match outcome {
                RefreshOutcome::Loaded { .. } => report.loaded.push(id),
                RefreshOutcome::Unparseable => report.unparseable.push(id),
                RefreshOutcome::Failed(e) => report.failed.push((id, e)),
                RefreshOutcome::Skipped => report.skipped.push(id),
            }
        }
        info!(
            target: "feeds",
            loaded = report.loaded.len(),
            unparseable = report.unparseable.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "feed refresh settled"
        );
        report
    }

    pub async fn refresh_one(&self, record: &CollectionRecord, force: bool) -> RefreshOutcome {
        let id = record.id.clone();
        {
            let mut st = self.lock();
            if st.loading.contains(&id) || (!force && st.results.contains_key(&id)) {
                return RefreshOutcome::Skipped;
            }
            st.loading.insert(id.clone());
        }
        let _guard = LoadingGuard {
            owner: self,
            id: id.clone(),
        };
        self.publish();
        counter!("feed_fetch_total").increment(1);

        match self.fetcher.fetch_feed(record).await {
            Ok(Some(mut feed)) => {
                feed.source_id = id.clone();
                let items = feed.items.len();
                let bundle = {
                    let mut st = self.lock();
                    st.failed.remove(&id);
                    st.results.insert(id.clone(), feed);
                    st.bundle()
                };
                self.cache.set(&self.cache_key, &bundle);
                debug!(target: "feeds", source_id = %id, items, "feed loaded");
                RefreshOutcome::Loaded { items }
            }
            Ok(None) => {
                warn!(target: "feeds", source_id = %id, url = %record.url, "feed empty or unparseable");
                self.lock().failed.insert(id);
                RefreshOutcome::Unparseable
            }
            Err(e) => {
                match &e {
                    DashboardError::ParseFailure { message, .. } => {
                        warn!(target: "feeds", source_id = %id, url = %record.url, error = %message, "feed parse failed")
                    }
                    other => {
                        warn!(target: "feeds", source_id = %id, url = %record.url, error = %other, "feed fetch failed")
                    }
                }
                counter!("feed_fetch_errors_total").increment(1);
                self.lock().failed.insert(id);
                RefreshOutcome::Failed(e)
            }
        }
    }
}

/// Removes the id from the loading set when the fetch settles, however it
/// settles.
struct LoadingGuard<'a> {
    owner: &'a FeedAggregator,
    id: String,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.owner.lock().loading.remove(&self.id);
        self.owner.publish();
    }
}
