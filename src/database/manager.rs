use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, Executor, PgPool};
use std::time::Duration;
use tracing::{info, warn};

use super::backend::{ClientFactory, DatabaseAdmin};
use super::error::{database_error_details, sqlstate, DatabaseError};
use super::naming;
use crate::config::{DatabaseConfig, TenancyConfig};

/// Builds per-database connection strings by swapping the path of a base URL
#[derive(Debug, Clone)]
pub struct ConnectionTemplate {
    base: url::Url,
}

impl ConnectionTemplate {
    pub fn parse(base: &str) -> Result<Self, DatabaseError> {
        let base = url::Url::parse(base).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        Ok(Self { base })
    }

    pub fn from_config(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let base = config
            .url
            .as_deref()
            .ok_or(DatabaseError::ConfigMissing("DATABASE_URL"))?;
        Self::parse(base)
    }

    pub fn connection_string(&self, database_name: &str) -> String {
        let mut url = self.base.clone();
        // Replace the path to the database name (ensure leading slash)
        url.set_path(&format!("/{}", database_name));
        url.into()
    }
}

/// Pool settings shared by every tenant pool
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl From<&DatabaseConfig> for PoolSettings {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            acquire_timeout: Duration::from_secs(config.connection_timeout),
        }
    }
}

/// Opens one `PgPool` per tenant database
pub struct PgClientFactory {
    template: ConnectionTemplate,
    settings: PoolSettings,
}

impl PgClientFactory {
    pub fn new(template: ConnectionTemplate, settings: PoolSettings) -> Self {
        Self { template, settings }
    }

    pub async fn open_pool(&self, database_name: &str) -> Result<PgPool, DatabaseError> {
        let connection_string = self.template.connection_string(database_name);
        let pool = PgPoolOptions::new()
            .max_connections(self.settings.max_connections)
            .acquire_timeout(self.settings.acquire_timeout)
            .connect(&connection_string)
            .await
            .map_err(|err| match database_error_details(&err) {
                Some((code, _)) if code == sqlstate::INVALID_CATALOG_NAME => {
                    DatabaseError::Missing(database_name.to_string())
                }
                _ => DatabaseError::Sqlx(err),
            })?;
        Ok(pool)
    }
}

#[async_trait]
impl ClientFactory for PgClientFactory {
    type Client = PgPool;

    async fn connect(&self, database_name: &str) -> Result<PgPool, DatabaseError> {
        self.open_pool(database_name).await
    }

    async fn close(&self, client: &PgPool) {
        client.close().await;
    }
}

/// Server-level administration of tenant databases through the maintenance
/// database (`postgres` by default)
pub struct DatabaseManager {
    admin_pool: PgPool,
    prefix: String,
}

impl DatabaseManager {
    pub fn new(admin_pool: PgPool, tenancy: &TenancyConfig) -> Self {
        Self {
            admin_pool,
            prefix: tenancy.database_prefix.clone(),
        }
    }

    /// Connect the administrative pool (connects to the maintenance database)
    pub async fn connect(
        factory: &PgClientFactory,
        tenancy: &TenancyConfig,
    ) -> Result<Self, DatabaseError> {
        let admin_pool = factory.open_pool(&tenancy.admin_database).await?;
        Ok(Self::new(admin_pool, tenancy))
    }

    /// Pings the admin pool to ensure connectivity
    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.admin_pool).await?;
        Ok(())
    }

    fn checked(&self, database_name: &str) -> Result<String, DatabaseError> {
        naming::validate_database_name(&self.prefix, database_name)
            .map_err(|e| DatabaseError::InvalidTenantName(e.to_string()))?;
        Ok(Self::quote_identifier(database_name))
    }

    /// Quote SQL identifier to prevent injection
    fn quote_identifier(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn map_ddl_error(database_name: &str, err: sqlx::Error) -> DatabaseError {
        match database_error_details(&err) {
            Some((code, _)) if code == sqlstate::DUPLICATE_DATABASE => {
                DatabaseError::AlreadyExists(database_name.to_string())
            }
            Some((code, _)) if code == sqlstate::INVALID_CATALOG_NAME => {
                DatabaseError::Missing(database_name.to_string())
            }
            Some((code, _)) if code == sqlstate::OBJECT_IN_USE => {
                DatabaseError::InUse(database_name.to_string())
            }
            _ => DatabaseError::Sqlx(err),
        }
    }
}

#[async_trait]
impl DatabaseAdmin for DatabaseManager {
    async fn create_database(&self, database_name: &str) -> Result<(), DatabaseError> {
        let quoted = self.checked(database_name)?;

        // CREATE DATABASE cannot run inside a transaction block; a plain &str
        // goes over the simple query protocol
        let statement = format!("CREATE DATABASE {}", quoted);
        self.admin_pool
            .execute(statement.as_str())
            .await
            .map_err(|e| Self::map_ddl_error(database_name, e))?;

        info!("Created database: {}", database_name);
        Ok(())
    }

    async fn terminate_connections(&self, database_name: &str) -> Result<u64, DatabaseError> {
        self.checked(database_name)?;

        let rows = sqlx::query(
            r#"
            SELECT pg_terminate_backend(pid)
            FROM pg_stat_activity
            WHERE datname = $1 AND pid <> pg_backend_pid()
            "#,
        )
        .bind(database_name)
        .fetch_all(&self.admin_pool)
        .await?;

        let terminated = rows.len() as u64;
        if terminated > 0 {
            warn!("Terminated {} backend(s) connected to {}", terminated, database_name);
        }
        Ok(terminated)
    }

    async fn drop_database(&self, database_name: &str) -> Result<(), DatabaseError> {
        let quoted = self.checked(database_name)?;

        let statement = format!("DROP DATABASE {}", quoted);
        self.admin_pool
            .execute(statement.as_str())
            .await
            .map_err(|e| Self::map_ddl_error(database_name, e))?;

        info!("Dropped database: {}", database_name);
        Ok(())
    }

    async fn database_exists(&self, database_name: &str) -> Result<bool, DatabaseError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pg_database WHERE datname = $1")
            .bind(database_name)
            .fetch_one(&self.admin_pool)
            .await?;
        Ok(count.0 > 0)
    }
}
