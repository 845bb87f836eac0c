pub mod resolve_tenant;
pub mod response;

pub use resolve_tenant::{lookup_from_headers, resolve_tenant_middleware, TenantContext};
pub use response::{ApiResponse, ApiResult};
