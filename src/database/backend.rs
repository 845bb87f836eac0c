use async_trait::async_trait;

use super::error::DatabaseError;

/// Builds and closes client handles bound to one database.
///
/// The handle type is whatever the data layer uses to talk to a tenant
/// store (`PgPool` in production); the cache only needs to clone and close it.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    type Client: Clone + Send + Sync + 'static;

    async fn connect(&self, database_name: &str) -> Result<Self::Client, DatabaseError>;

    async fn close(&self, client: &Self::Client);
}

/// Server-level store management: CREATE/DROP DATABASE and backend control.
#[async_trait]
pub trait DatabaseAdmin: Send + Sync {
    /// Fails with `DatabaseError::AlreadyExists` when the store is already there.
    async fn create_database(&self, database_name: &str) -> Result<(), DatabaseError>;

    /// Returns the number of backends that were terminated.
    async fn terminate_connections(&self, database_name: &str) -> Result<u64, DatabaseError>;

    /// Fails with `DatabaseError::Missing` or `DatabaseError::InUse`.
    async fn drop_database(&self, database_name: &str) -> Result<(), DatabaseError>;

    async fn database_exists(&self, database_name: &str) -> Result<bool, DatabaseError>;
}

/// Applies the full tenant schema to a freshly created store.
#[async_trait]
pub trait SchemaMigrator<C>: Send + Sync {
    async fn apply(&self, database_name: &str, client: &C) -> Result<(), DatabaseError>;
}
