// src/analytics/logs.rs
//! Log entries derived from document search results.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::TtlCache;
use crate::error::DashboardError;
use crate::tags::{extract, is_allowed, search_pattern, tag_set_key};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    #[serde(default, deserialize_with = "lenient_date")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_date")]
    pub last_modified_at: Option<DateTime<Utc>>,
}

/// One hit from the document-search capability. Dates may arrive at the top
/// level or under `metadata` when metadata was requested.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawSearchItem {
    #[serde(default)]
    pub document_id: String,
    #[serde(default)]
    pub document_title: Option<String>,
    #[serde(default)]
    pub markdown: String,
    #[serde(default, deserialize_with = "lenient_date")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_date")]
    pub last_modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Option<DocumentMetadata>,
}

/// RFC 3339 or a bare `YYYY-MM-DD`; anything else (or a non-string) reads
/// as `None` so one bad hit cannot fail the whole response.
fn lenient_date<'de, D>(de: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(de)?;
    Ok(raw.as_ref().and_then(Value::as_str).and_then(parse_date))
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchResponse {
    #[serde(default)]
    pub items: Vec<RawSearchItem>,
}

#[async_trait::async_trait]
pub trait DocumentSearch: Send + Sync {
    async fn search(&self, regex_pattern: &str, fetch_metadata: bool) -> Result<SearchResponse>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub document_id: String,
    pub document_title: String,
    pub markdown: String,
    pub created_at: Option<DateTime<Utc>>,
    pub last_modified_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
}

impl LogEntry {
    /// Build from a search hit, keeping only tags in `scope` and, when the
    /// allow-list is non-empty, tags it covers. `None` if no tag survives.
    pub fn from_search_item(
        item: &RawSearchItem,
        scope: Option<&str>,
        allowed: &[String],
    ) -> Option<Self> {
        let tags: Vec<String> = extract(&item.markdown, scope)
            .into_iter()
            .filter(|t| allowed.is_empty() || is_allowed(t, allowed))
            .collect();
        if tags.is_empty() {
            return None;
        }

        let meta = item.metadata.clone().unwrap_or_default();
        Some(Self {
            document_id: item.document_id.clone(),
            document_title: item.document_title.clone().unwrap_or_default(),
            markdown: item.markdown.clone(),
            created_at: item.created_at.or(meta.created_at),
            last_modified_at: item.last_modified_at.or(meta.last_modified_at),
            tags,
        })
    }

    /// Date used for bucketing.
    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.created_at.or(self.last_modified_at)
    }
}

pub struct TagLogLoader {
    search: Arc<dyn DocumentSearch>,
    cache: Arc<TtlCache>,
    scope: Option<String>,
    allowed: Vec<String>,
}

impl TagLogLoader {
    pub fn new(
        search: Arc<dyn DocumentSearch>,
        cache: Arc<TtlCache>,
        scope: Option<String>,
        allowed: Vec<String>,
    ) -> Self {
        Self {
            search,
            cache,
            scope,
            allowed,
        }
    }

    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }

    pub fn cache_key(&self) -> String {
        let mut key_tags = self.allowed.clone();
        if let Some(scope) = &self.scope {
            key_tags.push(format!("scope:{scope}"));
        }
        format!("tag-logs:{}", tag_set_key(&key_tags))
    }

    /// Cache-first search for tagged documents.
    pub async fn load(&self, force_refresh: bool) -> crate::error::Result<Vec<LogEntry>> {
        let key = self.cache_key();
        if force_refresh {
            self.cache.clear(&key);
        } else if let Some(hit) = self.cache.get::<Vec<LogEntry>>(&key) {
            debug!(target: "analytics", n = hit.len(), "log cache hit");
            return Ok(hit);
        }

        let mut pattern_tags = self.allowed.clone();
        if pattern_tags.is_empty() {
            pattern_tags.extend(self.scope.iter().cloned());
        }
        let pattern = search_pattern(&pattern_tags);

        let resp = self.search.search(&pattern, true).await.map_err(|e| {
            warn!(target: "analytics", error = ?e, "document search failed");
            DashboardError::fetch("document-search", &e)
        })?;

        let entries: Vec<LogEntry> = resp
            .items
            .iter()
            .filter_map(|it| LogEntry::from_search_item(it, self.scope.as_deref(), &self.allowed))
            .collect();
        info!(
            target: "analytics",
            hits = resp.items.len(),
            kept = entries.len(),
            "tag logs loaded"
        );
        self.cache.set(&key, &entries);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(md: &str) -> RawSearchItem {
        RawSearchItem {
            document_id: "d1".into(),
            document_title: Some("Daily".into()),
            markdown: md.into(),
            ..Default::default()
        }
    }

    #[test]
    fn entry_without_tags_is_dropped() {
        assert!(LogEntry::from_search_item(&item("plain note"), None, &[]).is_none());
    }

    #[test]
    fn allow_list_limits_tags() {
        let allowed = vec!["work".to_string()];
        let e = LogEntry::from_search_item(&item("#work/a #home #work"), None, &allowed).unwrap();
        assert_eq!(e.tags, vec!["work/a", "work"]);

        assert!(LogEntry::from_search_item(&item("#home only"), None, &allowed).is_none());
    }

    #[test]
    fn metadata_dates_are_used() {
        let raw = r##"{"documentId":"d","markdown":"#x","metadata":{"createdAt":"2026-03-01T00:00:00Z"}}"##;
        let it: RawSearchItem = serde_json::from_str(raw).unwrap();
        let e = LogEntry::from_search_item(&it, None, &[]).unwrap();
        assert_eq!(e.date().unwrap().to_rfc3339(), "2026-03-01T00:00:00+00:00");
    }

    #[test]
    fn malformed_date_does_not_fail_the_response() {
        let raw = r##"{"items":[
            {"documentId":"a","markdown":"#x","createdAt":"2026-10-01T00:00:00Z"},
            {"documentId":"b","markdown":"#y","createdAt":"yesterday","lastModifiedAt":42},
            {"documentId":"c","markdown":"#z","metadata":{"createdAt":"2026-09-30"}}
        ]}"##;
        let resp: SearchResponse = serde_json::from_str(raw).expect("lenient dates");
        assert_eq!(resp.items.len(), 3);

        let entries: Vec<LogEntry> = resp
            .items
            .iter()
            .filter_map(|it| LogEntry::from_search_item(it, None, &[]))
            .collect();
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries[0].date().map(|d| d.to_rfc3339()).as_deref(),
            Some("2026-10-01T00:00:00+00:00")
        );
        assert_eq!(entries[1].date(), None);
        assert_eq!(
            entries[2].date().map(|d| d.to_rfc3339()).as_deref(),
            Some("2026-09-30T00:00:00+00:00")
        );
    }
}
