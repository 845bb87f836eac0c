// handlers/root/tenant/delete.rs - DELETE /api/root/tenant/:database handler

use axum::extract::{Path, State};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::middleware::{ApiResponse, ApiResult};
use crate::services::TenantService;

/// DELETE /api/root/tenant/:database - Drop a store database and retire its registry row
pub async fn tenant_delete<C: Clone + Send + Sync + 'static>(
    State(service): State<Arc<TenantService<C>>>,
    Path(database_name): Path<String>,
) -> ApiResult<Value> {
    service.teardown_tenant(&database_name).await?;

    Ok(ApiResponse::success(json!({
        "database_name": database_name,
        "deleted": true
    })))
}
