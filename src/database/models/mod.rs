pub mod tenant;

pub use tenant::{NewTenant, TenantDescriptor, TenantLookup, TenantLookupInput, TenantRecord};
