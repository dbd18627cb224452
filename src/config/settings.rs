// src/config/settings.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::DashboardError;

pub const ENV_CONFIG_PATH: &str = "FEEDBOARD_CONFIG_PATH";
pub const ENV_BASE_URL: &str = "FEEDBOARD_BASE_URL";
pub const ENV_API_TOKEN: &str = "FEEDBOARD_API_TOKEN";
pub const ENV_BIND: &str = "FEEDBOARD_BIND";
pub const DEFAULT_CONFIG_PATH: &str = "config/feedboard.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub collections: CollectionSettings,
    pub tags: TagSettings,
    pub cache: CacheSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: Option<String>,
    /// Bearer credential passed through to the document API.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CollectionSettings {
    pub feeds: Option<String>,
    pub bookmarks: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TagSettings {
    /// Only tags under this root are extracted (`work` keeps `work/x`).
    pub scope: Option<String>,
    pub allowed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheSettings {
    pub dir: PathBuf,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("cache/feedboard"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

fn non_blank(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl Settings {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Resolve settings:
    /// 1) $FEEDBOARD_CONFIG_PATH
    /// 2) config/feedboard.toml
    /// 3) defaults
    ///
    /// then apply env overrides.
    pub fn load_default() -> Result<Self> {
        let mut settings = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let p = PathBuf::from(DEFAULT_CONFIG_PATH);
            if p.exists() {
                Self::load_from(&p)?
            } else {
                Self::default()
            }
        };
        settings.apply_env_overrides();
        Ok(settings)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var(ENV_BASE_URL) {
            self.api.base_url = Some(v);
        }
        if let Ok(v) = std::env::var(ENV_API_TOKEN) {
            self.api.token = Some(v);
        }
        if let Ok(v) = std::env::var(ENV_BIND) {
            self.server.bind = v;
        }
    }

    pub fn require_base_url(&self) -> Result<&str, DashboardError> {
        non_blank(&self.api.base_url)
            .map(|s| s.trim_end_matches('/'))
            .ok_or_else(|| DashboardError::ConfigurationMissing("API base URL".into()))
    }

    pub fn require_feeds_collection(&self) -> Result<&str, DashboardError> {
        non_blank(&self.collections.feeds)
            .ok_or_else(|| DashboardError::ConfigurationMissing("feeds collection id".into()))
    }

    pub fn bookmarks_collection(&self) -> Option<&str> {
        non_blank(&self.collections.bookmarks)
    }

    pub fn token(&self) -> Option<&str> {
        non_blank(&self.api.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_toml_with_defaults() {
        let s: Settings = toml::from_str(
            r#"
[api]
base_url = "https://docs.example/api/"

[collections]
feeds = "col-feeds"

[tags]
allowed = ["work", "reading"]
"#,
        )
        .unwrap();
        assert_eq!(s.require_base_url().unwrap(), "https://docs.example/api");
        assert_eq!(s.require_feeds_collection().unwrap(), "col-feeds");
        assert_eq!(s.bookmarks_collection(), None);
        assert_eq!(s.tags.allowed, vec!["work", "reading"]);
        assert_eq!(s.server.bind, "127.0.0.1:8080");
        assert_eq!(s.cache.dir, PathBuf::from("cache/feedboard"));
    }

    #[test]
    fn blank_values_are_missing() {
        let mut s = Settings::default();
        s.api.base_url = Some("   ".into());
        assert_eq!(
            s.require_base_url(),
            Err(DashboardError::ConfigurationMissing("API base URL".into()))
        );
        assert!(matches!(
            s.require_feeds_collection(),
            Err(DashboardError::ConfigurationMissing(_))
        ));
    }
}
