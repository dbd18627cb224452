//! feedboard binary entrypoint.
//! Loads settings, wires the dashboard, paints from cache, revalidates in the
//! background and serves the JSON surface plus `/metrics`.

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use feedboard::api::{create_router, AppState};
use feedboard::config::Settings;
use feedboard::metrics::Metrics;

fn init_tracing() {
    // Components log under their own targets rather than the crate path.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            "feedboard=info,dashboard=info,collection=info,feeds=info,analytics=info,api=info,config=info,warn",
        )
    });

    // FEEDBOARD_LOG_FORMAT=json for log shippers; compact otherwise.
    let json = std::env::var("FEEDBOARD_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let settings = Settings::load_default()?;
    if let Err(e) = settings.require_base_url() {
        warn!(error = %e, "dashboard will report a configuration error");
    }

    let dashboard = feedboard::build_dashboard(&settings)?;
    let _initial = dashboard.start();

    let metrics = Metrics::init()?;
    let router = create_router(AppState { dashboard }).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&settings.server.bind)
        .await
        .with_context(|| format!("binding {}", settings.server.bind))?;
    info!(bind = %settings.server.bind, "feedboard listening");
    axum::serve(listener, router).await?;
    Ok(())
}
