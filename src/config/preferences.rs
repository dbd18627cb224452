// src/config/preferences.rs
//! Small scalar preferences kept in the KV store. Reads never fail: missing
//! or corrupt values fall back to defaults.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::KvStore;

pub const EXPIRY_MINUTES_KEY: &str = "pref:expiry_minutes";
pub const DISPLAY_MODE_KEY: &str = "pref:display_mode";
pub const DEFAULT_EXPIRY_MINUTES: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Grid,
    List,
}

impl DisplayMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().trim_matches('"').to_ascii_lowercase().as_str() {
            "grid" | "cards" => Some(DisplayMode::Grid),
            "list" => Some(DisplayMode::List),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DisplayMode::Grid => "grid",
            DisplayMode::List => "list",
        }
    }
}

#[derive(Clone)]
pub struct Preferences {
    store: Arc<dyn KvStore>,
}

impl Preferences {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Cache expiry in minutes; `0` disables serving from cache.
    pub fn expiry_minutes(&self) -> u64 {
        self.store
            .get(EXPIRY_MINUTES_KEY)
            .and_then(|s| s.trim().trim_matches('"').parse::<u64>().ok())
            .unwrap_or(DEFAULT_EXPIRY_MINUTES)
    }

    pub fn set_expiry_minutes(&self, minutes: u64) {
        if let Err(e) = self.store.set(EXPIRY_MINUTES_KEY, &minutes.to_string()) {
            warn!(target: "config", error = ?e, "could not persist expiry");
        }
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.store
            .get(DISPLAY_MODE_KEY)
            .and_then(|s| DisplayMode::parse(&s))
            .unwrap_or_default()
    }

    pub fn set_display_mode(&self, mode: DisplayMode) {
        if let Err(e) = self.store.set(DISPLAY_MODE_KEY, mode.as_str()) {
            warn!(target: "config", error = ?e, "could not persist display mode");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn prefs() -> (Arc<MemoryStore>, Preferences) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), Preferences::new(store))
    }

    #[test]
    fn defaults_when_missing() {
        let (_s, p) = prefs();
        assert_eq!(p.expiry_minutes(), 60);
        assert_eq!(p.display_mode(), DisplayMode::Grid);
    }

    #[test]
    fn corrupt_values_degrade_to_defaults() {
        let (s, p) = prefs();
        s.set(EXPIRY_MINUTES_KEY, "soon").unwrap();
        s.set(DISPLAY_MODE_KEY, "{]").unwrap();
        assert_eq!(p.expiry_minutes(), 60);
        assert_eq!(p.display_mode(), DisplayMode::Grid);
    }

    #[test]
    fn values_round_trip() {
        let (_s, p) = prefs();
        p.set_expiry_minutes(0);
        p.set_display_mode(DisplayMode::List);
        assert_eq!(p.expiry_minutes(), 0);
        assert_eq!(p.display_mode(), DisplayMode::List);
    }

    #[test]
    fn json_quoted_values_accepted() {
        let (s, p) = prefs();
        s.set(EXPIRY_MINUTES_KEY, "\"15\"").unwrap();
        s.set(DISPLAY_MODE_KEY, "\"list\"").unwrap();
        assert_eq!(p.expiry_minutes(), 15);
        assert_eq!(p.display_mode(), DisplayMode::List);
    }
}
