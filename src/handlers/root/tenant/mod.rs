// handlers/root/tenant/mod.rs - Tenant lifecycle handlers

pub mod create; // POST /api/root/tenant
pub mod delete; // DELETE /api/root/tenant/:database
pub mod list; // GET /api/root/tenant

pub use create::tenant_create;
pub use delete::tenant_delete;
pub use list::tenant_list;
