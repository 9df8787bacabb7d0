use axum::{response::IntoResponse, Json};
use http::StatusCode;
use serde_json::json;

use crate::utils::config::{SERVICE_NAME, SERVICE_VERSION};

pub async fn root() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "service": SERVICE_NAME,
            "version": SERVICE_VERSION,
            "endpoints": {
                "health": "/health",
                "sync_drivers": "/api/sync/drivers",
                "sync_teams": "/api/sync/teams",
                "sync_lineups": "/api/sync/lineups",
                "sync_standings": "/api/sync/standings",
                "info": "/api/sync/info",
            },
        })),
    )
        .into_response()
}

pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({"status": "healthy", "service": SERVICE_NAME, "version": SERVICE_VERSION})),
    )
        .into_response()
}

pub async fn service_info() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({"service": SERVICE_NAME, "version": SERVICE_VERSION, "status": "operational"})),
    )
        .into_response()
}
