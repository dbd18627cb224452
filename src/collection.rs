// src/collection.rs
//! Collection loading: raw items from the document API are validated into
//! [`CollectionRecord`]s and written through the TTL cache.

use std::sync::Arc;

use anyhow::Result;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::cache::TtlCache;
use crate::error::DashboardError;
use crate::tags::normalize_tag;

/// Item as returned by the collection-fetch capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectionRecord {
    pub id: String,
    pub title: String,
    pub url: String,
    pub category: String,
    pub tags: Vec<String>,
}

#[async_trait::async_trait]
pub trait CollectionSource: Send + Sync {
    async fn fetch_collection_items(&self, collection_id: &str) -> Result<Vec<RawItem>>;
}

// Accepted spellings, tried in order before a case-insensitive scan.
const URL_KEYS: &[&str] = &["URL", "url", "Url", "link", "Link"];
const CATEGORY_KEYS: &[&str] = &["Category", "category"];
const TAGS_KEYS: &[&str] = &["Tags", "tags"];

// First spelling whose value converts to something non-empty wins; an empty
// `URL` must not shadow a usable `url`.
fn lookup<T>(
    props: &Map<String, Value>,
    keys: &[&str],
    convert: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    keys.iter()
        .filter_map(|k| props.get(*k))
        .find_map(&convert)
        .or_else(|| {
            props
                .iter()
                .filter(|(k, _)| keys.iter().any(|want| k.eq_ignore_ascii_case(want)))
                .find_map(|(_, v)| convert(v))
        })
}

fn value_to_string(v: &Value) -> Option<String> {
    let s = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        // Select-style properties arrive as `["Tech"]`.
        Value::Array(items) => items.iter().find_map(value_to_string)?,
        Value::Object(o) => o
            .get("name")
            .or_else(|| o.get("value"))
            .and_then(value_to_string)?,
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

fn value_to_tags(v: &Value) -> Vec<String> {
    let raw: Vec<String> = match v {
        Value::String(s) => s.split([',', ' ']).map(str::to_string).collect(),
        Value::Array(items) => items.iter().filter_map(value_to_string).collect(),
        _ => Vec::new(),
    };
    let mut out: Vec<String> = Vec::new();
    for t in raw {
        let t = normalize_tag(&t);
        if !t.is_empty() && !out.contains(&t) {
            out.push(t);
        }
    }
    out
}

fn normalize_title(title: Option<&str>) -> String {
    let t = title.unwrap_or_default().trim();
    if t.eq_ignore_ascii_case("untitled") {
        String::new()
    } else {
        t.to_string()
    }
}

/// Validate a raw item. `None` means the item is silently dropped.
pub fn normalize_record(item: &RawItem) -> Option<CollectionRecord> {
    let url = lookup(&item.properties, URL_KEYS, value_to_string)?;
    let category = lookup(&item.properties, CATEGORY_KEYS, value_to_string)?;
    let tags = lookup(&item.properties, TAGS_KEYS, |v| {
        Some(value_to_tags(v)).filter(|t| !t.is_empty())
    })
    .unwrap_or_default();

    Some(CollectionRecord {
        id: item.id.clone(),
        title: normalize_title(item.title.as_deref()),
        url,
        category,
        tags,
    })
}

pub fn normalize_records(items: &[RawItem]) -> Vec<CollectionRecord> {
    items.iter().filter_map(normalize_record).collect()
}

pub fn cache_key(collection_id: &str) -> String {
    format!("collection:{collection_id}")
}

pub struct CollectionLoader {
    source: Arc<dyn CollectionSource>,
    cache: Arc<TtlCache>,
}

impl CollectionLoader {
    pub fn new(source: Arc<dyn CollectionSource>, cache: Arc<TtlCache>) -> Self {
        Self { source, cache }
    }

    /// Cache-first load. `force_refresh` clears the cached entry first, so a
    /// failed forced refresh leaves nothing stale behind.
    pub async fn load(
        &self,
        collection_id: &str,
        force_refresh: bool,
    ) -> crate::error::Result<Vec<CollectionRecord>> {
        if collection_id.trim().is_empty() {
            return Err(DashboardError::ConfigurationMissing(
                "collection id".to_string(),
            ));
        }

        let key = cache_key(collection_id);
        if force_refresh {
            self.cache.clear(&key);
        } else if let Some(hit) = self.cache.get::<Vec<CollectionRecord>>(&key) {
            debug!(target: "collection", collection_id, n = hit.len(), "cache hit");
            return Ok(hit);
        }

        let raw = match self.source.fetch_collection_items(collection_id).await {
            Ok(v) => v,
            Err(e) => {
                warn!(target: "collection", collection_id, error = ?e, "collection fetch failed");
                counter!("collection_fetch_errors_total").increment(1);
                return Err(DashboardError::fetch(collection_id, &e));
            }
        };

        let records = normalize_records(&raw);
        info!(
            target: "collection",
            collection_id,
            raw = raw.len(),
            kept = records.len(),
            "collection loaded"
        );
        self.cache.set(&key, &records);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(id: &str, title: &str, props: Value) -> RawItem {
        RawItem {
            id: id.into(),
            title: Some(title.into()),
            properties: props.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn empty_category_is_dropped() {
        let it = raw("1", "X", json!({"url": "https://x.com", "category": ""}));
        assert_eq!(normalize_record(&it), None);
    }

    #[test]
    fn untitled_becomes_empty() {
        let it = raw(
            "1",
            "Untitled",
            json!({"url": "https://x.com", "category": "Tech"}),
        );
        let r = normalize_record(&it).unwrap();
        assert_eq!(r.title, "");
        assert_eq!(r.category, "Tech");
    }

    #[test]
    fn upper_case_keys_take_precedence() {
        let it = raw(
            "1",
            "Blog",
            json!({"URL": "https://a", "url": "https://b", "Category": "News"}),
        );
        assert_eq!(normalize_record(&it).unwrap().url, "https://a");
    }

    #[test]
    fn odd_casing_resolves_case_insensitively() {
        let it = raw("1", "Blog", json!({"uRl": " https://a ", "CATEGORY": "News"}));
        let r = normalize_record(&it).unwrap();
        assert_eq!(r.url, "https://a");
        assert_eq!(r.category, "News");
    }

    #[test]
    fn null_upper_key_falls_through() {
        let it = raw("1", "Blog", json!({"URL": null, "url": "https://b", "category": "News"}));
        assert_eq!(normalize_record(&it).unwrap().url, "https://b");
    }

    #[test]
    fn empty_upper_key_falls_through_to_next_spelling() {
        let it = raw(
            "1",
            "Blog",
            json!({"URL": "", "url": "https://x.com", "Category": "Tech"}),
        );
        let r = normalize_record(&it).unwrap();
        assert_eq!(r.url, "https://x.com");
        assert_eq!(r.category, "Tech");

        let blank_tags = raw(
            "2",
            "Blog",
            json!({"url": "u", "category": "c", "Tags": [], "tags": "Rust"}),
        );
        assert_eq!(normalize_record(&blank_tags).unwrap().tags, vec!["rust"]);
    }

    #[test]
    fn tags_from_string_and_array() {
        let a = raw(
            "1",
            "A",
            json!({"url": "u", "category": "c", "Tags": "#Rust, async  rust"}),
        );
        assert_eq!(normalize_record(&a).unwrap().tags, vec!["rust", "async"]);

        let b = raw(
            "2",
            "B",
            json!({"url": "u", "category": ["Tech"], "tags": ["Go", {"name": "Web"}]}),
        );
        let r = normalize_record(&b).unwrap();
        assert_eq!(r.category, "Tech");
        assert_eq!(r.tags, vec!["go", "web"]);
    }

    #[test]
    fn one_of_two_items_survives() {
        let items = vec![
            raw("a", "A", json!({"url": "http://a", "category": "News"})),
            raw("b", "B", json!({"url": "", "category": "News"})),
        ];
        let out = normalize_records(&items);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "a");
    }
}
