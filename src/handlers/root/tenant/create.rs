// handlers/root/tenant/create.rs - POST /api/root/tenant handler

use axum::extract::{Json, State};
use std::sync::Arc;

use crate::database::TenantDescriptor;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::{ProvisionRequest, TenantService};

/// POST /api/root/tenant - Create a store with its own database
///
/// ```json
/// {
///   "display_name": "My Cool Shop",
///   "owner_id": "7f6c...",
///   "slug": "cool-shop",          // optional, derived from display_name
///   "domain": "shop.example.com"  // optional
/// }
/// ```
///
/// Answers 201 with the routable tenant once the database exists, carries the
/// current schema and the registry row is committed.
pub async fn tenant_create<C: Clone + Send + Sync + 'static>(
    State(service): State<Arc<TenantService<C>>>,
    Json(request): Json<ProvisionRequest>,
) -> ApiResult<TenantDescriptor> {
    tracing::info!("Provisioning store '{}' for owner {}", request.display_name, request.owner_id);

    let tenant = service.provision_tenant(&request).await?;
    Ok(ApiResponse::created(tenant))
}
