// handlers/health.rs - GET /health handler

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;
use std::sync::Arc;

use crate::services::TenantService;

pub async fn health<C: Clone + Send + Sync + 'static>(
    State(service): State<Arc<TenantService<C>>>,
) -> impl IntoResponse {
    let now = chrono::Utc::now();
    let cached = service.cache().len().await;

    match service.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "registry": "ok",
                    "cached_connections": cached
                }
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "registry unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                        "cached_connections": cached
                    }
                })),
            )
        }
    }
}
