use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::error::TenantError;
use super::provisioner::{ProvisionRequest, TenantProvisioner};
use super::resolver::TenantResolver;
use super::retry::RetryPolicy;
use super::teardown::TenantTeardown;
use crate::config::{AppConfig, TenancyConfig};
use crate::database::memory::{MemoryClient, MemoryRegistry, MemoryServer};
use crate::database::naming;
use crate::database::{
    migrate, ClientFactory, ConnectionCache, ConnectionTemplate, DatabaseAdmin, DatabaseError,
    DatabaseManager, PgClientFactory, PgSchemaMigrator, PgTenantRegistry, PoolSettings,
    SchemaMigrator, TenantDescriptor, TenantLookupInput, TenantRecord, TenantRegistry,
};

/// Entry point of the tenancy core, generic over the client handle type.
///
/// One instance owns one connection cache; construct it once per process and
/// share it behind an `Arc`.
pub struct TenantService<C> {
    registry: Arc<dyn TenantRegistry>,
    cache: Arc<ConnectionCache<C>>,
    resolver: TenantResolver,
    provisioner: TenantProvisioner<C>,
    teardown: TenantTeardown<C>,
    prefix: String,
}

impl<C: Clone + Send + Sync + 'static> TenantService<C> {
    pub fn new(
        registry: Arc<dyn TenantRegistry>,
        factory: Arc<dyn ClientFactory<Client = C>>,
        admin: Arc<dyn DatabaseAdmin>,
        migrator: Arc<dyn SchemaMigrator<C>>,
        config: &TenancyConfig,
    ) -> Self {
        let cache = Arc::new(ConnectionCache::new(factory));
        let retry = RetryPolicy::from_config(config);
        let prefix = config.database_prefix.clone();

        Self {
            resolver: TenantResolver::new(registry.clone(), prefix.clone(), config.registry_timeout()),
            provisioner: TenantProvisioner::new(
                registry.clone(),
                admin.clone(),
                migrator,
                cache.clone(),
                prefix.clone(),
                retry.clone(),
                config.provision_timeout(),
            ),
            teardown: TenantTeardown::new(registry.clone(), admin, cache.clone(), prefix.clone(), retry),
            registry,
            cache,
            prefix,
        }
    }

    /// Resolve request input to a routable tenant.
    pub async fn resolve_tenant(&self, input: &TenantLookupInput) -> Result<TenantDescriptor, TenantError> {
        self.resolver.resolve(input).await
    }

    /// Cached client for a tenant database, constructed on first use.
    pub async fn get_tenant_client(&self, database_name: &str) -> Result<C, TenantError> {
        naming::validate_database_name(&self.prefix, database_name)?;
        self.cache
            .get_client(database_name)
            .await
            .map_err(|source| TenantError::Connection {
                database_name: database_name.to_string(),
                source,
            })
    }

    /// Resolve and fetch the client in one step, the way request middleware does.
    pub async fn route(&self, input: &TenantLookupInput) -> Result<(TenantDescriptor, C), TenantError> {
        let tenant = self.resolve_tenant(input).await?;
        let client = self.get_tenant_client(&tenant.database_name).await?;
        Ok((tenant, client))
    }

    pub async fn provision_tenant(&self, request: &ProvisionRequest) -> Result<TenantDescriptor, TenantError> {
        self.provisioner.provision(request).await
    }

    pub async fn provision_tenant_within(
        &self,
        request: &ProvisionRequest,
        timeout: Duration,
    ) -> Result<TenantDescriptor, TenantError> {
        self.provisioner.provision_within(request, timeout).await
    }

    pub async fn teardown_tenant(&self, database_name: &str) -> Result<(), TenantError> {
        self.teardown.teardown(database_name).await
    }

    /// Live tenants, newest first
    pub async fn list_tenants(&self) -> Result<Vec<TenantRecord>, TenantError> {
        self.registry.list().await.map_err(TenantError::Registry)
    }

    /// Registry reachability, for health endpoints
    pub async fn health_check(&self) -> Result<(), TenantError> {
        self.registry.health_check().await.map_err(TenantError::Registry)
    }

    pub fn cache(&self) -> &ConnectionCache<C> {
        &self.cache
    }

    /// Close every cached client
    pub async fn shutdown(&self) {
        self.cache.shutdown_all().await;
    }
}

impl TenantService<PgPool> {
    /// Wire the Postgres backends from configuration. The platform registry
    /// schema is brought up to date on the way.
    pub async fn connect(config: &AppConfig) -> Result<Self, DatabaseError> {
        let template = ConnectionTemplate::from_config(&config.database)?;
        let factory = Arc::new(PgClientFactory::new(template, PoolSettings::from(&config.database)));

        let platform_pool = factory.open_pool(&config.tenancy.platform_database).await?;
        migrate::migrate_platform(&platform_pool).await?;

        let admin = Arc::new(DatabaseManager::connect(&factory, &config.tenancy).await?);
        admin.health_check().await?;

        info!(
            "Tenancy core connected (platform: {}, admin: {})",
            config.tenancy.platform_database, config.tenancy.admin_database
        );

        Ok(Self::new(
            Arc::new(PgTenantRegistry::new(platform_pool)),
            factory,
            admin,
            Arc::new(PgSchemaMigrator),
            &config.tenancy,
        ))
    }
}

impl TenantService<MemoryClient> {
    /// Fully in-process wiring; the server and registry are returned for
    /// inspection and fault injection.
    pub fn in_memory(config: &TenancyConfig) -> (Self, Arc<MemoryServer>, Arc<MemoryRegistry>) {
        let server = Arc::new(MemoryServer::new());
        let registry = Arc::new(MemoryRegistry::new());
        let service = Self::new(
            registry.clone(),
            server.clone(),
            server.clone(),
            server.clone(),
            config,
        );
        (service, server, registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::{Fault, FaultPoint};
    use crate::services::error::{ProvisionStage, TeardownStage};
    use uuid::Uuid;

    fn config() -> TenancyConfig {
        TenancyConfig {
            retry_backoff_ms: 1,
            ..TenancyConfig::default()
        }
    }

    #[tokio::test]
    async fn provisions_and_routes() {
        let (service, server, _) = TenantService::in_memory(&config());

        let tenant = service
            .provision_tenant(&ProvisionRequest::new("My Cool Shop", Uuid::new_v4()))
            .await
            .unwrap();
        assert_eq!(tenant.database_name, "store_my_cool_shop");
        assert_eq!(tenant.slug, "my-cool-shop");
        assert!(server.schema_version("store_my_cool_shop").is_some());

        let (resolved, client) = service
            .route(&TenantLookupInput::by_slug("my-cool-shop"))
            .await
            .unwrap();
        assert_eq!(resolved, tenant);
        assert!(client.ping().is_ok());
    }

    #[tokio::test]
    async fn transient_create_failure_is_retried() {
        let (service, server, _) = TenantService::in_memory(&config());
        server.inject(FaultPoint::Create, Fault::Transient);

        let tenant = service
            .provision_tenant(&ProvisionRequest::new("Flaky", Uuid::new_v4()))
            .await
            .unwrap();
        assert!(server.has_database(&tenant.database_name));
    }

    #[tokio::test]
    async fn permanent_create_failure_rolls_back() {
        let (service, server, registry) = TenantService::in_memory(&config());
        server.inject(FaultPoint::Create, Fault::Permanent);

        let err = service
            .provision_tenant(&ProvisionRequest::new("Doomed", Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TenantError::ProvisioningFailed { stage: ProvisionStage::PhysicalCreate, .. }
        ));
        assert!(registry.all_rows().is_empty());
        assert!(!server.has_database("store_doomed"));
    }

    #[tokio::test]
    async fn failed_commit_rolls_back() {
        let (service, server, registry) = TenantService::in_memory(&config());
        registry.fail_next_commits(1);

        let err = service
            .provision_tenant(&ProvisionRequest::new("Late", Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TenantError::ProvisioningFailed { stage: ProvisionStage::Commit, .. }
        ));
        assert!(registry.all_rows().is_empty());
        assert!(!server.has_database("store_late"));
        assert!(!service.cache().contains("store_late").await);
    }

    #[tokio::test]
    async fn failed_drop_keeps_tenant_routable() {
        let (service, server, _) = TenantService::in_memory(&config());
        let tenant = service
            .provision_tenant(&ProvisionRequest::new("Sticky", Uuid::new_v4()))
            .await
            .unwrap();
        server.inject(FaultPoint::Drop, Fault::Permanent);

        let err = service.teardown_tenant(&tenant.database_name).await.unwrap_err();
        assert!(matches!(
            err,
            TenantError::TeardownFailed { stage: TeardownStage::Drop, .. }
        ));

        // Row is still there and active again
        let again = service
            .resolve_tenant(&TenantLookupInput::by_id(tenant.id))
            .await
            .unwrap();
        assert!(again.active);

        // A retry goes through
        service.teardown_tenant(&tenant.database_name).await.unwrap();
        assert!(!server.has_database(&tenant.database_name));
    }

    #[tokio::test]
    async fn rejects_invalid_names_before_any_io() {
        let (service, server, _) = TenantService::in_memory(&config());

        let err = service.teardown_tenant("postgres").await.unwrap_err();
        assert!(matches!(err, TenantError::InvalidTenantName(_)));
        let err = service.get_tenant_client("store_x; DROP").await.unwrap_err();
        assert!(matches!(err, TenantError::InvalidTenantName(_)));
        assert_eq!(server.connect_count("store_x; DROP"), 0);
    }
}
