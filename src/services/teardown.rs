use std::sync::Arc;
use tracing::{info, warn};

use super::error::{TeardownStage, TenantError};
use super::retry::RetryPolicy;
use crate::database::naming;
use crate::database::{ConnectionCache, DatabaseAdmin, DatabaseError, TenantRegistry};

/// Drops tenant databases.
///
/// Order: suspend the registry row, close the cached handle, terminate every
/// backend on the store, drop it, and only then retire the registry row. A
/// failure before the drop completes restores the row's active flag and
/// leaves it in place so teardown can be retried.
///
/// Operations that obtained a handle before the cache entry was closed may
/// still be running when the backends are terminated; they fail with a
/// connection error rather than being waited for.
pub struct TenantTeardown<C> {
    registry: Arc<dyn TenantRegistry>,
    admin: Arc<dyn DatabaseAdmin>,
    cache: Arc<ConnectionCache<C>>,
    prefix: String,
    retry: RetryPolicy,
}

impl<C: Clone + Send + Sync + 'static> TenantTeardown<C> {
    pub fn new(
        registry: Arc<dyn TenantRegistry>,
        admin: Arc<dyn DatabaseAdmin>,
        cache: Arc<ConnectionCache<C>>,
        prefix: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            admin,
            cache,
            prefix: prefix.into(),
            retry,
        }
    }

    pub async fn teardown(&self, database_name: &str) -> Result<(), TenantError> {
        naming::validate_database_name(&self.prefix, database_name)?;

        let failed = |stage: TeardownStage, source: DatabaseError| TenantError::TeardownFailed {
            database_name: database_name.to_string(),
            stage,
            source,
        };

        let record = self
            .retry
            .run("tenant lookup", move || self.registry.find_by_database(database_name))
            .await
            .map_err(|e| failed(TeardownStage::Lookup, e))?;

        if record.is_none() {
            warn!("No registry row for {}, dropping the store only", database_name);
        }

        let suspended = match &record {
            Some(row) if row.active => {
                let id = row.id;
                self.retry
                    .run("suspend tenant", move || self.registry.set_active(id, false))
                    .await
                    .map_err(|e| failed(TeardownStage::Suspend, e))?;
                Some(id)
            }
            _ => None,
        };

        if let Err(err) = self.destroy_store(database_name).await {
            if let Some(id) = suspended {
                if let Err(e) = self.registry.set_active(id, true).await {
                    warn!("Could not reactivate {} after failed teardown: {}", database_name, e);
                }
            }
            return Err(err);
        }

        if let Some(row) = &record {
            let id = row.id;
            self.retry
                .run("retire tenant", move || self.registry.retire(id))
                .await
                .map_err(|e| failed(TeardownStage::Deregister, e))?;
        }

        info!("Tore down tenant database {}", database_name);
        Ok(())
    }

    async fn destroy_store(&self, database_name: &str) -> Result<(), TenantError> {
        let failed = |stage: TeardownStage, source: DatabaseError| TenantError::TeardownFailed {
            database_name: database_name.to_string(),
            stage,
            source,
        };

        self.cache.invalidate(database_name).await;

        let mut attempt = 1;
        loop {
            self.retry
                .run("terminate connections", move || {
                    self.admin.terminate_connections(database_name)
                })
                .await
                .map_err(|e| failed(TeardownStage::TerminateConnections, e))?;

            match self
                .retry
                .run("drop database", move || self.admin.drop_database(database_name))
                .await
            {
                Ok(()) => return Ok(()),
                // Someone reconnected between terminate and drop
                Err(DatabaseError::InUse(_)) if attempt < self.retry.max_attempts => {
                    warn!("{} still in use (attempt {}), terminating again", database_name, attempt);
                    tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(failed(TeardownStage::Drop, e)),
            }
        }
    }
}
