use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::error::{ProvisionStage, TenantError};
use super::retry::RetryPolicy;
use crate::database::naming;
use crate::database::{
    ConnectionCache, DatabaseAdmin, DatabaseError, NewTenant, SchemaMigrator, TenantDescriptor,
    TenantRecord, TenantRegistry, UniqueField,
};

/// Upper bound on the `_N` disambiguator tried for one display name
pub const MAX_DISAMBIGUATOR: u32 = 1000;

/// Input of the store-creation flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub display_name: String,
    pub owner_id: Uuid,
    /// Derived from the display name when absent
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
}

impl ProvisionRequest {
    pub fn new(display_name: impl Into<String>, owner_id: Uuid) -> Self {
        Self {
            display_name: display_name.into(),
            owner_id,
            slug: None,
            domain: None,
        }
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }
}

enum SlugPlan {
    /// Derived from the display name, with its own `-N` disambiguator
    Derived(String),
    /// Supplied by the caller; a collision is a conflict
    Explicit(String),
}

impl SlugPlan {
    fn candidate(&self, n: u32) -> String {
        match self {
            SlugPlan::Derived(base) => naming::slug_with_disambiguator(base, n),
            SlugPlan::Explicit(slug) => slug.clone(),
        }
    }
}

/// Creates tenant databases: reserve a unique name in the registry, create the
/// physical store, apply the tenant schema, then commit the registry row.
///
/// The registry row is inserted as *pending* first so the uniqueness
/// constraint arbitrates concurrent attempts; it only becomes resolvable on
/// commit. Any failure drops the partial store and deletes the pending row.
pub struct TenantProvisioner<C> {
    registry: Arc<dyn TenantRegistry>,
    admin: Arc<dyn DatabaseAdmin>,
    migrator: Arc<dyn SchemaMigrator<C>>,
    cache: Arc<ConnectionCache<C>>,
    prefix: String,
    retry: RetryPolicy,
    timeout: Duration,
}

impl<C: Clone + Send + Sync + 'static> TenantProvisioner<C> {
    pub fn new(
        registry: Arc<dyn TenantRegistry>,
        admin: Arc<dyn DatabaseAdmin>,
        migrator: Arc<dyn SchemaMigrator<C>>,
        cache: Arc<ConnectionCache<C>>,
        prefix: impl Into<String>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            admin,
            migrator,
            cache,
            prefix: prefix.into(),
            retry,
            timeout,
        }
    }

    pub async fn provision(&self, request: &ProvisionRequest) -> Result<TenantDescriptor, TenantError> {
        self.provision_within(request, self.timeout).await
    }

    /// Provision with a caller-supplied deadline. Cleanup of a timed-out
    /// attempt runs after the deadline has passed.
    pub async fn provision_within(
        &self,
        request: &ProvisionRequest,
        timeout: Duration,
    ) -> Result<TenantDescriptor, TenantError> {
        let base_name = naming::derive_database_name(&self.prefix, &request.display_name)?;
        let slug = match request.slug.as_deref() {
            Some(slug) => {
                if naming::slugify(slug)? != slug {
                    return Err(TenantError::InvalidTenantName(format!(
                        "slug '{}' must be lowercase letters, digits and single hyphens",
                        slug
                    )));
                }
                SlugPlan::Explicit(slug.to_string())
            }
            None => SlugPlan::Derived(naming::slugify(&request.display_name)?),
        };
        let domain = request
            .domain
            .as_deref()
            .map(naming::normalize_domain)
            .filter(|d| !d.is_empty());

        let deadline = Instant::now() + timeout;

        let mut inserting = None;
        let reserved = tokio::time::timeout_at(
            deadline,
            self.reserve(request, &base_name, &slug, domain, &mut inserting),
        )
        .await;
        let record = match reserved {
            Ok(result) => result?,
            Err(_) => {
                // The abandoned insert may still have landed
                if let Some(candidate) = inserting {
                    self.release_abandoned(&candidate, request).await;
                }
                return Err(Self::timed_out(&base_name, ProvisionStage::NameReservation, timeout));
            }
        };
        let database_name = record
            .database_name
            .clone()
            .unwrap_or_else(|| base_name.clone());

        info!("Reserved database name {} for '{}'", database_name, request.display_name);

        let mut stage = ProvisionStage::PhysicalCreate;
        let built = tokio::time::timeout_at(deadline, self.build_store(&database_name, &mut stage)).await;
        let built = match built {
            Ok(result) => result,
            Err(_) => Err(Self::timed_out(&database_name, stage, timeout)),
        };
        if let Err(err) = built {
            error!("Provisioning of {} failed: {}", database_name, err);
            self.rollback(&record, &database_name).await;
            return Err(err);
        }

        let committed = match self.commit(&record, &database_name).await {
            Ok(committed) => committed,
            Err(err) => {
                error!("Provisioning of {} failed: {}", database_name, err);
                self.rollback(&record, &database_name).await;
                return Err(err);
            }
        };

        info!("Provisioned tenant {} ({})", committed.slug, database_name);

        Ok(TenantDescriptor {
            id: committed.id,
            display_name: committed.display_name,
            slug: committed.slug,
            domain: committed.domain,
            database_name,
            active: committed.active,
            owner_id: committed.owner_id,
        })
    }

    fn timed_out(database_name: &str, stage: ProvisionStage, timeout: Duration) -> TenantError {
        TenantError::ProvisioningFailed {
            database_name: database_name.to_string(),
            stage,
            source: DatabaseError::Connection(format!("timed out after {:?}", timeout)),
        }
    }

    /// Find the smallest free database-name disambiguator and insert a
    /// pending row for it. A derived slug carries its own disambiguator,
    /// bumped only when the slug itself collides.
    ///
    /// `inserting` names the candidate whose insert is in flight, so a caller
    /// that abandons this future knows which row may have landed.
    async fn reserve(
        &self,
        request: &ProvisionRequest,
        base_name: &str,
        slug: &SlugPlan,
        domain: Option<String>,
        inserting: &mut Option<String>,
    ) -> Result<TenantRecord, TenantError> {
        let reservation_failed = |database_name: &str, source: DatabaseError| {
            TenantError::ProvisioningFailed {
                database_name: database_name.to_string(),
                stage: ProvisionStage::NameReservation,
                source,
            }
        };

        let mut n = 0;
        let mut m = 0;
        while n <= MAX_DISAMBIGUATOR && m <= MAX_DISAMBIGUATOR {
            let candidate = naming::with_disambiguator(base_name, n);
            naming::validate_database_name(&self.prefix, &candidate)?;

            // Pre-check keeps the common path free of constraint violations;
            // the insert below is what actually decides
            let name = candidate.as_str();
            let taken = self
                .retry
                .run("database name lookup", move || self.registry.database_name_in_use(name))
                .await;
            match taken {
                Ok(true) => {
                    n += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => return Err(reservation_failed(&candidate, e)),
            }

            let tenant = NewTenant {
                display_name: request.display_name.clone(),
                slug: slug.candidate(m),
                domain: domain.clone(),
                database_name: candidate.clone(),
                owner_id: request.owner_id,
            };

            *inserting = Some(candidate.clone());
            let inserted = self.registry.reserve(&tenant).await;
            *inserting = None;

            match inserted {
                Ok(record) => return Ok(record),
                Err(DatabaseError::Conflict(UniqueField::DatabaseName)) => {
                    warn!("Database name {} was claimed concurrently, trying next", candidate);
                    n += 1;
                }
                Err(DatabaseError::Conflict(UniqueField::Slug)) if matches!(slug, SlugPlan::Derived(_)) => {
                    warn!("Slug {} is taken, trying next disambiguator", tenant.slug);
                    m += 1;
                }
                Err(DatabaseError::Conflict(field)) => return Err(TenantError::Conflict(field)),
                Err(e) => return Err(reservation_failed(&candidate, e)),
            }
        }

        let field = if n > MAX_DISAMBIGUATOR {
            UniqueField::DatabaseName
        } else {
            UniqueField::Slug
        };
        Err(reservation_failed(base_name, DatabaseError::Conflict(field)))
    }

    /// Release a pending row this attempt inserted but never saw confirmed.
    async fn release_abandoned(&self, database_name: &str, request: &ProvisionRequest) {
        match self.registry.find_by_database(database_name).await {
            Ok(Some(row)) if row.is_pending() && row.owner_id == request.owner_id => {
                warn!("Releasing reservation {} left by a timed-out attempt", database_name);
                self.rollback(&row, database_name).await;
            }
            Ok(_) => {}
            Err(e) => warn!("Could not check for an abandoned reservation of {}: {}", database_name, e),
        }
    }

    async fn build_store(&self, database_name: &str, stage: &mut ProvisionStage) -> Result<(), TenantError> {
        let failed = |at: ProvisionStage, source: DatabaseError| TenantError::ProvisioningFailed {
            database_name: database_name.to_string(),
            stage: at,
            source,
        };

        *stage = ProvisionStage::PhysicalCreate;
        match self
            .retry
            .run("create database", move || self.admin.create_database(database_name))
            .await
        {
            Ok(()) => {}
            Err(DatabaseError::AlreadyExists(_)) => {
                warn!("Database {} already exists, continuing with schema apply", database_name);
            }
            Err(e) => return Err(failed(ProvisionStage::PhysicalCreate, e)),
        }

        *stage = ProvisionStage::SchemaApply;
        let client = self
            .retry
            .run("connect to new database", move || self.cache.get_client(database_name))
            .await
            .map_err(|e| failed(ProvisionStage::SchemaApply, e))?;

        let client = &client;
        self.retry
            .run("apply tenant schema", move || self.migrator.apply(database_name, client))
            .await
            .map_err(|e| failed(ProvisionStage::SchemaApply, e))?;

        Ok(())
    }

    async fn commit(&self, record: &TenantRecord, database_name: &str) -> Result<TenantRecord, TenantError> {
        let id = record.id;
        match self.retry.run("commit tenant", move || self.registry.commit(id)).await {
            Ok(committed) => Ok(committed),
            Err(err) => {
                // The commit may have landed even though the reply was lost
                if let Ok(Some(row)) = self.registry.find_by_database(database_name).await {
                    if row.id == id && row.provisioned_at.is_some() {
                        return Ok(row);
                    }
                }
                Err(TenantError::ProvisioningFailed {
                    database_name: database_name.to_string(),
                    stage: ProvisionStage::Commit,
                    source: err,
                })
            }
        }
    }

    /// Best-effort removal of everything a failed attempt left behind.
    async fn rollback(&self, record: &TenantRecord, database_name: &str) {
        self.cache.invalidate(database_name).await;

        // Unknown existence is treated as present
        let exists = self.admin.database_exists(database_name).await.unwrap_or(true);
        if exists {
            if let Err(e) = self
                .retry
                .run("terminate connections", move || self.admin.terminate_connections(database_name))
                .await
            {
                warn!("Rollback could not terminate connections to {}: {}", database_name, e);
            }

            match self
                .retry
                .run("drop database", move || self.admin.drop_database(database_name))
                .await
            {
                Ok(()) => info!("Rolled back database {}", database_name),
                Err(DatabaseError::Missing(_)) => {}
                Err(e) => warn!("Rollback left database {} behind: {}", database_name, e),
            }
        }

        let id = record.id;
        if let Err(e) = self.retry.run("release reservation", move || self.registry.release(id)).await {
            error!("Rollback could not release registry row {} ({}): {}", id, database_name, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::{MemoryClient, MemoryRegistry, MemoryServer};
    use crate::database::TenantLookup;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Registry whose replies can go missing after the write has landed
    #[derive(Default)]
    struct Unreliable {
        inner: MemoryRegistry,
        /// Commit the row, then report a dropped connection once
        lose_next_commit: AtomicBool,
        /// Insert the row, then never answer
        hang_after_reserve: AtomicBool,
    }

    #[async_trait]
    impl TenantRegistry for Unreliable {
        async fn find(&self, lookup: &TenantLookup) -> Result<Option<TenantRecord>, DatabaseError> {
            self.inner.find(lookup).await
        }

        async fn find_by_database(&self, name: &str) -> Result<Option<TenantRecord>, DatabaseError> {
            self.inner.find_by_database(name).await
        }

        async fn database_name_in_use(&self, name: &str) -> Result<bool, DatabaseError> {
            self.inner.database_name_in_use(name).await
        }

        async fn reserve(&self, tenant: &NewTenant) -> Result<TenantRecord, DatabaseError> {
            let record = self.inner.reserve(tenant).await?;
            if self.hang_after_reserve.load(Ordering::SeqCst) {
                futures::future::pending::<()>().await;
            }
            Ok(record)
        }

        async fn commit(&self, id: Uuid) -> Result<TenantRecord, DatabaseError> {
            let committed = self.inner.commit(id).await?;
            if self.lose_next_commit.swap(false, Ordering::SeqCst) {
                // Not transient from the caller's point of view, so no retry
                return Err(DatabaseError::Backend("connection reset after commit".into()));
            }
            Ok(committed)
        }

        async fn release(&self, id: Uuid) -> Result<(), DatabaseError> {
            self.inner.release(id).await
        }

        async fn set_active(&self, id: Uuid, active: bool) -> Result<(), DatabaseError> {
            self.inner.set_active(id, active).await
        }

        async fn retire(&self, id: Uuid) -> Result<(), DatabaseError> {
            self.inner.retire(id).await
        }

        async fn list(&self) -> Result<Vec<TenantRecord>, DatabaseError> {
            self.inner.list().await
        }
    }

    fn provisioner(
        registry: Arc<dyn TenantRegistry>,
        server: Arc<MemoryServer>,
    ) -> TenantProvisioner<MemoryClient> {
        TenantProvisioner::new(
            registry,
            server.clone(),
            server.clone(),
            Arc::new(ConnectionCache::new(server)),
            "store_",
            RetryPolicy::new(2, Duration::from_millis(1)),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn request_fields_are_optional_in_json() {
        let request: ProvisionRequest = serde_json::from_value(serde_json::json!({
            "display_name": "Shop",
            "owner_id": Uuid::new_v4()
        }))
        .unwrap();
        assert!(request.slug.is_none());
        assert!(request.domain.is_none());
    }

    #[tokio::test]
    async fn commit_that_landed_is_not_rolled_back() {
        let server = Arc::new(MemoryServer::new());
        let registry = Arc::new(Unreliable {
            lose_next_commit: AtomicBool::new(true),
            ..Unreliable::default()
        });

        let tenant = provisioner(registry.clone(), server.clone())
            .provision(&ProvisionRequest::new("Lucky", Uuid::new_v4()))
            .await
            .unwrap();

        assert_eq!(tenant.database_name, "store_lucky");
        assert!(server.has_database("store_lucky"));
        let row = registry.inner.find_by_database("store_lucky").await.unwrap().unwrap();
        assert!(row.is_live());
    }

    #[tokio::test]
    async fn leftover_store_from_an_earlier_attempt_is_reused() {
        let server = Arc::new(MemoryServer::new());
        server.create_database_now("store_again");

        let tenant = provisioner(Arc::new(MemoryRegistry::new()), server.clone())
            .provision(&ProvisionRequest::new("Again", Uuid::new_v4()))
            .await
            .unwrap();

        assert_eq!(tenant.database_name, "store_again");
        assert!(server.schema_version("store_again").is_some());
    }

    #[tokio::test]
    async fn reservation_that_landed_before_the_deadline_is_released() {
        let server = Arc::new(MemoryServer::new());
        let registry = Arc::new(Unreliable {
            hang_after_reserve: AtomicBool::new(true),
            ..Unreliable::default()
        });

        let err = provisioner(registry.clone(), server.clone())
            .provision_within(&ProvisionRequest::new("Stuck", Uuid::new_v4()), Duration::from_millis(50))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TenantError::ProvisioningFailed { stage: ProvisionStage::NameReservation, .. }
        ));
        assert!(registry.inner.all_rows().is_empty());
        assert!(!server.has_database("store_stuck"));
    }

    #[tokio::test]
    async fn slug_taken_by_another_store_keeps_the_plain_database_name() {
        let server = Arc::new(MemoryServer::new());
        let provisioner = provisioner(Arc::new(MemoryRegistry::new()), server);

        provisioner
            .provision(&ProvisionRequest::new("Other", Uuid::new_v4()).with_slug("my-cool-shop"))
            .await
            .unwrap();
        let tenant = provisioner
            .provision(&ProvisionRequest::new("My Cool Shop", Uuid::new_v4()))
            .await
            .unwrap();

        assert_eq!(tenant.database_name, "store_my_cool_shop");
        assert_eq!(tenant.slug, "my-cool-shop-1");
    }
}
