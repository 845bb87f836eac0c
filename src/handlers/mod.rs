// handlers/mod.rs - HTTP handlers
//
// Root handlers (/api/root/*) manage the tenant lifecycle and talk to the
// tenancy service directly. Store handlers (/api/store*) run behind the
// tenant resolution middleware and see a `TenantContext`.

pub mod health;
pub mod root;
pub mod store;
