// src/feeds/mod.rs
pub mod aggregator;
pub mod rss;

use serde::{Deserialize, Serialize};

use crate::collection::CollectionRecord;
use crate::error::DashboardError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
}

/// Parsed content of one feed, keyed by the owning record's id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedResult {
    pub source_id: String,
    pub title: String,
    pub items: Vec<FeedItem>,
}

/// Feed-fetch capability.
///
/// `Ok(None)` means the feed was fetched but had nothing usable; errors are
/// `FetchFailure` or `ParseFailure`.
#[async_trait::async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch_feed(
        &self,
        record: &CollectionRecord,
    ) -> Result<Option<FeedResult>, DashboardError>;
}
