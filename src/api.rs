// src/api.rs
//! JSON surface over the [`Dashboard`] for a presentation client.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use crate::analytics::{ChartBar, Granularity};
use crate::collection::CollectionRecord;
use crate::config::DisplayMode;
use crate::dashboard::{Dashboard, DashboardSnapshot, TagLines};

#[derive(Clone)]
pub struct AppState {
    pub dashboard: Arc<Dashboard>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/state", get(get_state))
        .route("/records", get(get_records))
        .route("/refresh", post(post_refresh))
        .route("/filters/toggle", post(post_toggle_filter))
        .route("/preferences", post(post_preferences))
        .route("/analytics", get(get_analytics))
        .route("/tags/lines", get(get_tag_lines))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn get_state(State(state): State<AppState>) -> Json<DashboardSnapshot> {
    Json(state.dashboard.snapshot())
}

async fn get_records(State(state): State<AppState>) -> Json<Vec<CollectionRecord>> {
    Json(state.dashboard.visible_records())
}

#[derive(serde::Deserialize)]
struct RefreshQuery {
    #[serde(default)]
    force: bool,
}

// Fire-and-forget: progress is observed via /state.
async fn post_refresh(
    State(state): State<AppState>,
    Query(q): Query<RefreshQuery>,
) -> StatusCode {
    info!(target: "api", force = q.force, "refresh requested");
    state.dashboard.spawn_refresh(q.force);
    StatusCode::ACCEPTED
}

#[derive(serde::Deserialize)]
struct TagQuery {
    #[serde(default)]
    tag: Option<String>,
}

#[derive(serde::Serialize)]
struct ToggleOut {
    tag: String,
    selected: bool,
}

async fn post_toggle_filter(
    State(state): State<AppState>,
    Query(q): Query<TagQuery>,
) -> Result<Json<ToggleOut>, StatusCode> {
    let tag = q.tag.unwrap_or_default();
    if tag.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let selected = state.dashboard.toggle_filter(&tag);
    debug!(target: "api", tag = %tag, selected, "filter toggled");
    Ok(Json(ToggleOut {
        tag: crate::tags::normalize_tag(&tag),
        selected,
    }))
}

#[derive(serde::Deserialize)]
struct PreferencesQuery {
    #[serde(default)]
    expiry_minutes: Option<u64>,
    #[serde(default)]
    display_mode: Option<String>,
}

// Validate everything before applying anything.
async fn post_preferences(
    State(state): State<AppState>,
    Query(q): Query<PreferencesQuery>,
) -> Result<Json<DashboardSnapshot>, StatusCode> {
    let mode = match q.display_mode.as_deref() {
        None => None,
        Some(s) => Some(DisplayMode::parse(s).ok_or(StatusCode::BAD_REQUEST)?),
    };
    if let Some(minutes) = q.expiry_minutes {
        state.dashboard.set_expiry_minutes(minutes);
    }
    if let Some(mode) = mode {
        state.dashboard.set_display_mode(mode);
    }
    Ok(Json(state.dashboard.snapshot()))
}

#[derive(serde::Deserialize)]
struct AnalyticsQuery {
    #[serde(default)]
    granularity: Option<String>,
}

#[derive(serde::Serialize)]
struct AnalyticsOut {
    granularity: Granularity,
    bars: Vec<ChartBar>,
    totals: Vec<(String, u32)>,
}

async fn get_analytics(
    State(state): State<AppState>,
    Query(q): Query<AnalyticsQuery>,
) -> Result<Json<AnalyticsOut>, StatusCode> {
    let granularity = match q.granularity.as_deref() {
        None => Granularity::default(),
        Some(s) => Granularity::parse(s).ok_or_else(|| {
            debug!(target: "api", granularity = s, "unknown granularity");
            StatusCode::BAD_REQUEST
        })?,
    };
    Ok(Json(AnalyticsOut {
        granularity,
        bars: state.dashboard.chart(granularity, Utc::now()),
        totals: state.dashboard.tag_totals(),
    }))
}

async fn get_tag_lines(
    State(state): State<AppState>,
    Query(q): Query<TagQuery>,
) -> Json<Vec<TagLines>> {
    Json(state.dashboard.tag_lines(q.tag.as_deref()))
}
