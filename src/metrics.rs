use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("cache_hits_total", "TTL cache reads served from the store.");
        describe_counter!(
            "cache_misses_total",
            "TTL cache reads that were missing, expired, corrupt or disabled."
        );
        describe_counter!(
            "cache_evictions_total",
            "Expired or corrupt cache entries removed on read."
        );
        describe_counter!(
            "collection_fetch_errors_total",
            "Parent collection fetch failures."
        );
        describe_counter!("feed_fetch_total", "Feed fetch attempts.");
        describe_counter!("feed_fetch_errors_total", "Feed fetch/parse failures.");
        describe_histogram!("feed_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!("feeds_loading", "Feeds currently in flight.");
        describe_gauge!("cache_ttl_ms", "Configured cache TTL in milliseconds.");
    });
}

impl Metrics {
    /// Install the Prometheus recorder.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
