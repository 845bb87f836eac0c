use std::time::Duration;
use thiserror::Error;

use crate::database::naming::NameError;
use crate::database::{DatabaseError, UniqueField};

/// Step of a provisioning attempt that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStage {
    NameReservation,
    PhysicalCreate,
    SchemaApply,
    Commit,
}

impl std::fmt::Display for ProvisionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProvisionStage::NameReservation => "name reservation",
            ProvisionStage::PhysicalCreate => "database creation",
            ProvisionStage::SchemaApply => "schema apply",
            ProvisionStage::Commit => "registry commit",
        };
        f.write_str(s)
    }
}

/// Step of a teardown that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStage {
    Lookup,
    Suspend,
    TerminateConnections,
    Drop,
    Deregister,
}

impl std::fmt::Display for TeardownStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TeardownStage::Lookup => "registry lookup",
            TeardownStage::Suspend => "tenant suspension",
            TeardownStage::TerminateConnections => "connection termination",
            TeardownStage::Drop => "database drop",
            TeardownStage::Deregister => "registry removal",
        };
        f.write_str(s)
    }
}

/// Errors surfaced by the tenancy core to its callers
#[derive(Debug, Error)]
pub enum TenantError {
    #[error("No tenant identifier supplied")]
    MissingIdentifier,

    #[error("Tenant not found: {0}")]
    NotFound(String),

    #[error("Tenant is inactive: {0}")]
    Inactive(String),

    #[error("Tenant {id} is misconfigured: {reason}")]
    Misconfigured { id: String, reason: String },

    #[error("Invalid tenant name: {0}")]
    InvalidTenantName(String),

    #[error("Tenant {0} is already taken")]
    Conflict(UniqueField),

    #[error("Provisioning of {database_name} failed during {stage}: {source}")]
    ProvisioningFailed {
        database_name: String,
        stage: ProvisionStage,
        #[source]
        source: DatabaseError,
    },

    #[error("Teardown of {database_name} failed during {stage}: {source}")]
    TeardownFailed {
        database_name: String,
        stage: TeardownStage,
        #[source]
        source: DatabaseError,
    },

    #[error("Tenant registry unavailable: {0}")]
    Registry(#[source] DatabaseError),

    #[error("Could not open connection to {database_name}: {source}")]
    Connection {
        database_name: String,
        #[source]
        source: DatabaseError,
    },

    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },
}

impl TenantError {
    /// Not found and inactive are the same outcome to anyone outside the core.
    pub fn is_not_found(&self) -> bool {
        matches!(self, TenantError::NotFound(_) | TenantError::Inactive(_))
    }

    /// Whether retrying the same operation later could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TenantError::ProvisioningFailed { source, .. }
            | TenantError::TeardownFailed { source, .. }
            | TenantError::Connection { source, .. }
            | TenantError::Registry(source) => {
                source.is_transient() || matches!(source, DatabaseError::InUse(_))
            }
            TenantError::Timeout { .. } => true,
            _ => false,
        }
    }
}

impl From<NameError> for TenantError {
    fn from(err: NameError) -> Self {
        TenantError::InvalidTenantName(err.to_string())
    }
}
