use axum::{
    middleware,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{health, root, store};
use crate::middleware::resolve_tenant_middleware;
use crate::services::TenantService;

type AppState<C> = Arc<TenantService<C>>;

/// The HTTP surface over one tenancy service.
pub fn app<C: Clone + Send + Sync + 'static>(service: Arc<TenantService<C>>) -> Router {
    Router::new()
        // Public
        .route("/", get(index))
        .route("/health", get(health::health::<C>))
        // Tenant lifecycle
        .merge(root_routes::<C>())
        // Store-scoped API
        .merge(store_routes(service.clone()))
        // Global middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

fn root_routes<C: Clone + Send + Sync + 'static>() -> Router<AppState<C>> {
    Router::new()
        .route(
            "/api/root/tenant",
            post(root::tenant::tenant_create::<C>).get(root::tenant::tenant_list::<C>),
        )
        .route("/api/root/tenant/:database", delete(root::tenant::tenant_delete::<C>))
}

fn store_routes<C: Clone + Send + Sync + 'static>(service: AppState<C>) -> Router<AppState<C>> {
    Router::new()
        .route("/api/store", get(store::store_show::<C>))
        .route_layer(middleware::from_fn_with_state(
            service,
            resolve_tenant_middleware::<C>,
        ))
}

async fn index() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "Storefront tenancy",
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": {
                "health": "/health",
                "tenants": "/api/root/tenant, /api/root/tenant/:database",
                "store": "/api/store (x-store-id, x-store-slug or Host)"
            }
        }
    }))
}
