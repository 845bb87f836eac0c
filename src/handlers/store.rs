// handlers/store.rs - Store-scoped handlers, mounted behind tenant resolution

use axum::extract::Extension;

use crate::database::TenantDescriptor;
use crate::middleware::{ApiResponse, ApiResult, TenantContext};

/// GET /api/store - The store this request was routed to
pub async fn store_show<C: Clone + Send + Sync + 'static>(
    Extension(context): Extension<TenantContext<C>>,
) -> ApiResult<TenantDescriptor> {
    Ok(ApiResponse::success(context.tenant))
}
