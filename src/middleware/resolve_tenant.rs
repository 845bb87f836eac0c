use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use uuid::Uuid;

use crate::database::{TenantDescriptor, TenantLookupInput};
use crate::error::ApiError;
use crate::services::TenantService;

pub const STORE_ID_HEADER: &str = "x-store-id";
pub const STORE_SLUG_HEADER: &str = "x-store-slug";

/// Resolved tenant and its cached database client, injected by middleware
#[derive(Clone, Debug)]
pub struct TenantContext<C> {
    pub tenant: TenantDescriptor,
    pub client: C,
}

/// Build the lookup input from request headers: explicit store headers first,
/// then the Host header as a custom domain.
pub fn lookup_from_headers(headers: &HeaderMap) -> Result<TenantLookupInput, ApiError> {
    let text = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let id = match text(STORE_ID_HEADER) {
        Some(raw) => Some(
            Uuid::parse_str(&raw)
                .map_err(|_| ApiError::bad_request(format!("Invalid {} header", STORE_ID_HEADER)))?,
        ),
        None => None,
    };

    Ok(TenantLookupInput {
        id,
        slug: text(STORE_SLUG_HEADER),
        domain: text(header::HOST.as_str()),
    })
}

/// Middleware that routes a request to its store: resolves the tenant from
/// the registry and attaches the cached client for its database.
///
/// Unknown and inactive stores both answer 404.
pub async fn resolve_tenant_middleware<C: Clone + Send + Sync + 'static>(
    State(service): State<Arc<TenantService<C>>>,
    mut request: Request,
    next: Next,
) -> Response {
    let input = match lookup_from_headers(request.headers()) {
        Ok(input) => input,
        Err(e) => return e.into_response(),
    };

    let (tenant, client) = match service.route(&input).await {
        Ok(routed) => routed,
        Err(e) => return ApiError::from(e).into_response(),
    };

    tracing::debug!("Request routed to store {} ({})", tenant.slug, tenant.database_name);

    request.extensions_mut().insert(TenantContext { tenant, client });
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn explicit_headers_and_host_are_collected() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(STORE_ID_HEADER, HeaderValue::from_str(&id.to_string()).unwrap());
        headers.insert(STORE_SLUG_HEADER, HeaderValue::from_static("shop"));
        headers.insert(header::HOST, HeaderValue::from_static("Shop.Example.com:8080"));

        let input = lookup_from_headers(&headers).unwrap();
        assert_eq!(input.id, Some(id));
        assert_eq!(input.slug.as_deref(), Some("shop"));
        assert_eq!(input.domain.as_deref(), Some("Shop.Example.com:8080"));
    }

    #[test]
    fn malformed_store_id_is_a_bad_request() {
        let mut headers = HeaderMap::new();
        headers.insert(STORE_ID_HEADER, HeaderValue::from_static("not-a-uuid"));

        let err = lookup_from_headers(&headers).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn blank_headers_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(STORE_SLUG_HEADER, HeaderValue::from_static("  "));

        let input = lookup_from_headers(&headers).unwrap();
        assert!(input.primary().is_none());
    }
}
