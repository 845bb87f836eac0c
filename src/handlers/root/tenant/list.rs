// handlers/root/tenant/list.rs - GET /api/root/tenant handler

use axum::extract::State;
use std::sync::Arc;

use crate::database::TenantRecord;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::TenantService;

pub async fn tenant_list<C: Clone + Send + Sync + 'static>(
    State(service): State<Arc<TenantService<C>>>,
) -> ApiResult<Vec<TenantRecord>> {
    let tenants = service.list_tenants().await?;
    Ok(ApiResponse::success(tenants))
}
