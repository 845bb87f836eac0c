use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use super::error::TenantError;
use crate::database::naming;
use crate::database::{TenantDescriptor, TenantLookup, TenantLookupInput, TenantRegistry};

/// Turns tenant-identifying request input into a validated descriptor.
///
/// Fails closed: anything other than a live, active row with a well-formed
/// database name is an error. Reads the registry once and never touches the
/// connection cache.
pub struct TenantResolver {
    registry: Arc<dyn TenantRegistry>,
    prefix: String,
    timeout: Duration,
}

impl TenantResolver {
    pub fn new(registry: Arc<dyn TenantRegistry>, prefix: impl Into<String>, timeout: Duration) -> Self {
        Self {
            registry,
            prefix: prefix.into(),
            timeout,
        }
    }

    pub async fn resolve(&self, input: &TenantLookupInput) -> Result<TenantDescriptor, TenantError> {
        let lookup = input.primary().ok_or(TenantError::MissingIdentifier)?;
        self.resolve_lookup(&lookup).await
    }

    pub async fn resolve_lookup(&self, lookup: &TenantLookup) -> Result<TenantDescriptor, TenantError> {
        let started = Instant::now();
        let record = match tokio::time::timeout(self.timeout, self.registry.find(lookup)).await {
            Err(_) => {
                warn!("Tenant lookup {} timed out", lookup);
                return Err(TenantError::Timeout {
                    operation: "registry lookup",
                    elapsed: started.elapsed(),
                });
            }
            Ok(Err(e)) => {
                error!("Database error resolving tenant {}: {}", lookup, e);
                return Err(TenantError::Registry(e));
            }
            Ok(Ok(None)) => {
                warn!("Tenant resolution failed: {} not found", lookup);
                return Err(TenantError::NotFound(lookup.to_string()));
            }
            Ok(Ok(Some(record))) => record,
        };

        if !record.active {
            warn!("Tenant resolution failed: {} is inactive", lookup);
            return Err(TenantError::Inactive(lookup.to_string()));
        }

        let database_name = match record.database_name {
            Some(name) => name,
            None => {
                error!("Tenant {} has no database name", record.id);
                return Err(TenantError::Misconfigured {
                    id: record.id.to_string(),
                    reason: "registry row has no database name".to_string(),
                });
            }
        };

        if let Err(e) = naming::validate_database_name(&self.prefix, &database_name) {
            error!("Tenant {} has an unroutable database name: {}", record.id, e);
            return Err(TenantError::Misconfigured {
                id: record.id.to_string(),
                reason: e.to_string(),
            });
        }

        debug!("Tenant resolved: {} -> {}", lookup, database_name);

        Ok(TenantDescriptor {
            id: record.id,
            display_name: record.display_name,
            slug: record.slug,
            domain: record.domain,
            database_name,
            active: record.active,
            owner_id: record.owner_id,
        })
    }
}
