// src/error.rs
//! Error taxonomy for the dashboard core.
//!
//! Collaborators (HTTP adapters, stores) report `anyhow::Error`; components
//! map those into [`DashboardError`] at their boundary so callers can tell a
//! missing configuration apart from a recoverable network failure.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DashboardError {
    /// No base URL / collection id configured. Fatal for the view.
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),

    /// Network or HTTP failure. Retried only on explicit refresh.
    #[error("fetch failed for {source_id}: {message}")]
    FetchFailure { source_id: String, message: String },

    /// Malformed feed content.
    #[error("parse failed for {source_id}: {message}")]
    ParseFailure { source_id: String, message: String },
}

impl DashboardError {
    pub fn fetch(source_id: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::FetchFailure {
            source_id: source_id.into(),
            message: format!("{err:#}"),
        }
    }

    pub fn parse(source_id: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::ParseFailure {
            source_id: source_id.into(),
            message: format!("{err:#}"),
        }
    }

    /// Short, user-facing message for the presentation layer.
    pub fn user_message(&self) -> String {
        match self {
            Self::ConfigurationMissing(what) => {
                format!("Dashboard is not configured: {what} is missing.")
            }
            Self::FetchFailure { .. } | Self::ParseFailure { .. } => {
                "Could not load data. Try refreshing.".to_string()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, DashboardError>;
