use async_trait::async_trait;
use sqlx::migrate::Migrator;
use sqlx::PgPool;
use tracing::info;

use super::backend::SchemaMigrator;
use super::error::DatabaseError;

/// Schema every tenant database carries (catalog, carts, orders, reviews)
static TENANT_MIGRATIONS: Migrator = sqlx::migrate!("./migrations/tenant");

/// Registry schema of the platform database
static PLATFORM_MIGRATIONS: Migrator = sqlx::migrate!("./migrations/platform");

/// Highest migration version in the embedded tenant set.
pub fn tenant_schema_version() -> Option<i64> {
    TENANT_MIGRATIONS.iter().map(|m| m.version).max()
}

/// Applies the embedded tenant migrations to a freshly created database
#[derive(Debug, Default, Clone, Copy)]
pub struct PgSchemaMigrator;

#[async_trait]
impl SchemaMigrator<PgPool> for PgSchemaMigrator {
    async fn apply(&self, database_name: &str, client: &PgPool) -> Result<(), DatabaseError> {
        TENANT_MIGRATIONS
            .run(client)
            .await
            .map_err(|e| DatabaseError::Migration(format!("{}: {}", database_name, e)))?;

        info!(
            "Applied tenant schema version {:?} to {}",
            tenant_schema_version(),
            database_name
        );
        Ok(())
    }
}

/// Bring the platform registry schema up to date.
pub async fn migrate_platform(pool: &PgPool) -> Result<(), DatabaseError> {
    PLATFORM_MIGRATIONS
        .run(pool)
        .await
        .map_err(|e| DatabaseError::Migration(format!("platform: {}", e)))?;
    info!("Platform registry schema is current");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeds_tenant_migrations() {
        assert_eq!(tenant_schema_version(), Some(20240101000000));
    }
}
