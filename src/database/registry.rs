use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::error::{database_error_details, sqlstate, DatabaseError, UniqueField};
use super::models::{NewTenant, TenantLookup, TenantRecord};

/// The platform-side source of truth mapping public tenant identifiers to
/// tenant databases.
///
/// Rows move through three states: *pending* (reserved, `provisioned_at`
/// NULL), *live* (committed) and *retired* (`deleted_at` set). Only live rows
/// are returned by `find`. Database names stay unique across all three, so a
/// retired name is never handed out again.
#[async_trait]
pub trait TenantRegistry: Send + Sync {
    /// Live row matching the lookup key, active or not.
    async fn find(&self, lookup: &TenantLookup) -> Result<Option<TenantRecord>, DatabaseError>;

    /// Pending or live row owning `database_name`.
    async fn find_by_database(
        &self,
        database_name: &str,
    ) -> Result<Option<TenantRecord>, DatabaseError>;

    /// Whether any row, retired ones included, ever claimed this name.
    async fn database_name_in_use(&self, database_name: &str) -> Result<bool, DatabaseError>;

    /// Insert a pending row. Uniqueness violations surface as
    /// `DatabaseError::Conflict` naming the field.
    async fn reserve(&self, tenant: &NewTenant) -> Result<TenantRecord, DatabaseError>;

    /// Make a pending row visible to resolution.
    async fn commit(&self, id: Uuid) -> Result<TenantRecord, DatabaseError>;

    /// Delete a pending row after a failed provisioning attempt.
    async fn release(&self, id: Uuid) -> Result<(), DatabaseError>;

    async fn set_active(&self, id: Uuid, active: bool) -> Result<(), DatabaseError>;

    /// Soft-delete a row once its store has been dropped.
    async fn retire(&self, id: Uuid) -> Result<(), DatabaseError>;

    /// Live rows, newest first.
    async fn list(&self) -> Result<Vec<TenantRecord>, DatabaseError>;

    async fn health_check(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

const TENANT_COLUMNS: &str = r#"
    id, display_name, slug, domain, database_name, active, owner_id,
    created_at, updated_at, provisioned_at, deleted_at
"#;

/// `TenantRegistry` over the platform database's `tenants` table
pub struct PgTenantRegistry {
    pool: PgPool,
}

impl PgTenantRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn conflict_field(constraint: Option<&str>) -> Option<UniqueField> {
        match constraint? {
            "tenants_database_name_key" => Some(UniqueField::DatabaseName),
            "tenants_slug_live_idx" => Some(UniqueField::Slug),
            "tenants_domain_live_idx" => Some(UniqueField::Domain),
            _ => None,
        }
    }

    fn map_insert_error(err: sqlx::Error) -> DatabaseError {
        match database_error_details(&err) {
            Some((code, constraint)) if code == sqlstate::UNIQUE_VIOLATION => {
                match Self::conflict_field(constraint.as_deref()) {
                    Some(field) => DatabaseError::Conflict(field),
                    None => DatabaseError::Sqlx(err),
                }
            }
            _ => DatabaseError::Sqlx(err),
        }
    }
}

#[async_trait]
impl TenantRegistry for PgTenantRegistry {
    async fn find(&self, lookup: &TenantLookup) -> Result<Option<TenantRecord>, DatabaseError> {
        let live = "provisioned_at IS NOT NULL AND deleted_at IS NULL";

        let row = match lookup {
            TenantLookup::Id(id) => {
                let query = format!("SELECT {} FROM tenants WHERE id = $1 AND {}", TENANT_COLUMNS, live);
                sqlx::query_as::<_, TenantRecord>(&query)
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            TenantLookup::Slug(slug) => {
                let query = format!("SELECT {} FROM tenants WHERE slug = $1 AND {}", TENANT_COLUMNS, live);
                sqlx::query_as::<_, TenantRecord>(&query)
                    .bind(slug)
                    .fetch_optional(&self.pool)
                    .await?
            }
            TenantLookup::Domain(domain) => {
                let query = format!(
                    "SELECT {} FROM tenants WHERE lower(domain) = lower($1) AND {}",
                    TENANT_COLUMNS, live
                );
                sqlx::query_as::<_, TenantRecord>(&query)
                    .bind(domain)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };

        Ok(row)
    }

    async fn find_by_database(
        &self,
        database_name: &str,
    ) -> Result<Option<TenantRecord>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM tenants WHERE database_name = $1 AND deleted_at IS NULL",
            TENANT_COLUMNS
        );
        let row = sqlx::query_as::<_, TenantRecord>(&query)
            .bind(database_name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn database_name_in_use(&self, database_name: &str) -> Result<bool, DatabaseError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tenants WHERE database_name = $1")
            .bind(database_name)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0 > 0)
    }

    async fn reserve(&self, tenant: &NewTenant) -> Result<TenantRecord, DatabaseError> {
        let query = format!(
            r#"
            INSERT INTO tenants (display_name, slug, domain, database_name, active, owner_id)
            VALUES ($1, $2, $3, $4, true, $5)
            RETURNING {}
            "#,
            TENANT_COLUMNS
        );
        sqlx::query_as::<_, TenantRecord>(&query)
            .bind(&tenant.display_name)
            .bind(&tenant.slug)
            .bind(&tenant.domain)
            .bind(&tenant.database_name)
            .bind(tenant.owner_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Self::map_insert_error)
    }

    async fn commit(&self, id: Uuid) -> Result<TenantRecord, DatabaseError> {
        let query = format!(
            r#"
            UPDATE tenants SET provisioned_at = now(), updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {}
            "#,
            TENANT_COLUMNS
        );
        sqlx::query_as::<_, TenantRecord>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(id.to_string()))
    }

    async fn release(&self, id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "DELETE FROM tenants WHERE id = $1 AND provisioned_at IS NULL AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE tenants SET active = $2, updated_at = now() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(active)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn retire(&self, id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE tenants SET active = false, deleted_at = now(), updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<TenantRecord>, DatabaseError> {
        let query = format!(
            r#"
            SELECT {} FROM tenants
            WHERE provisioned_at IS NOT NULL AND deleted_at IS NULL
            ORDER BY created_at DESC
            "#,
            TENANT_COLUMNS
        );
        let rows = sqlx::query_as::<_, TenantRecord>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
