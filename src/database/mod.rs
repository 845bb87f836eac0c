pub mod backend;
pub mod cache;
pub mod error;
pub mod manager;
pub mod memory;
pub mod migrate;
pub mod models;
pub mod naming;
pub mod registry;

pub use backend::{ClientFactory, DatabaseAdmin, SchemaMigrator};
pub use cache::ConnectionCache;
pub use error::{DatabaseError, UniqueField};
pub use manager::{ConnectionTemplate, DatabaseManager, PgClientFactory, PoolSettings};
pub use migrate::PgSchemaMigrator;
pub use models::{NewTenant, TenantDescriptor, TenantLookup, TenantLookupInput, TenantRecord};
pub use registry::{PgTenantRegistry, TenantRegistry};
