use axum::{
    Json,
    extract::{Path as AxumPath, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use pkg_types::event::Event;
use pkg_types::quota::{QuotaLimits, ResourceQuota};
use pkg_types::stats::ResourceUsage;
use serde::Deserialize;
use tracing::info;

use crate::AppState;
use crate::error::HttpResult;

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub namespace: Option<String>,
}

/// GET /healthz
pub async fn healthz() -> &'static str {
    "ok"
}

/// GET /metrics (Prometheus text exposition)
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.engine.metrics(),
    )
}

/// GET /api/v1/usage
pub async fn resource_usage(State(state): State<AppState>) -> Json<ResourceUsage> {
    Json(state.engine.resource_usage().await)
}

/// GET /api/v1/events?namespace=
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Json<Vec<Event>> {
    Json(state.engine.list_events(query.namespace.as_deref()).await)
}

/// GET /api/v1/namespaces/{ns}/quota
pub async fn get_quota(
    State(state): State<AppState>,
    AxumPath(ns): AxumPath<String>,
) -> Json<ResourceQuota> {
    Json(state.engine.get_quota(&ns).await)
}

/// PUT /api/v1/namespaces/{ns}/quota
pub async fn put_quota(
    State(state): State<AppState>,
    AxumPath(ns): AxumPath<String>,
    Json(limits): Json<QuotaLimits>,
) -> HttpResult<Json<ResourceQuota>> {
    Ok(Json(state.engine.set_quota(&ns, limits).await?))
}

/// POST /api/v1/cleanup
pub async fn cleanup(State(state): State<AppState>) -> StatusCode {
    info!("API: cleanup requested");
    state.engine.cleanup().await;
    StatusCode::NO_CONTENT
}
