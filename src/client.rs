// src/client.rs
//! `reqwest` adapter for the external document API.
//!
//! - `GET {base}/collections/{id}/items` → `{"items": [...]}` (a bare array
//!   is accepted too)
//! - `GET {base}/documents/search?regexps=..&fetchMetadata=..` →
//!   `{"items": [...]}`

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::analytics::{DocumentSearch, SearchResponse};
use crate::collection::{CollectionSource, RawItem};
use crate::config::Settings;
use crate::error::DashboardError;

pub struct HttpDocumentApi {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ItemsBody {
    Wrapped { items: Vec<RawItem> },
    Bare(Vec<RawItem>),
}

impl HttpDocumentApi {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("feedboard/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(20))
            .build()
            .context("building document api client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Fails with `ConfigurationMissing` when no base URL is configured.
    pub fn from_settings(settings: &Settings) -> std::result::Result<Self, DashboardError> {
        let base = settings.require_base_url()?;
        Self::new(base, settings.token().map(str::to_string))
            .map_err(|e| DashboardError::fetch("document-api", &e))
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let req = self.http.get(format!("{}{}", self.base_url, path));
        match &self.token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }
}

#[async_trait]
impl CollectionSource for HttpDocumentApi {
    async fn fetch_collection_items(&self, collection_id: &str) -> Result<Vec<RawItem>> {
        let resp = self
            .get(&format!("/collections/{collection_id}/items"))
            .send()
            .await
            .context("collection http get()")?
            .error_for_status()
            .context("collection http status")?;
        let body: ItemsBody = resp.json().await.context("collection json")?;
        Ok(match body {
            ItemsBody::Wrapped { items } => items,
            ItemsBody::Bare(items) => items,
        })
    }
}

#[async_trait]
impl DocumentSearch for HttpDocumentApi {
    async fn search(&self, regex_pattern: &str, fetch_metadata: bool) -> Result<SearchResponse> {
        let resp = self
            .get("/documents/search")
            .query(&[
                ("regexps", regex_pattern),
                ("fetchMetadata", if fetch_metadata { "true" } else { "false" }),
            ])
            .send()
            .await
            .context("search http get()")?
            .error_for_status()
            .context("search http status")?;
        resp.json().await.context("search json")
    }
}
