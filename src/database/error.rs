use thiserror::Error;

/// Registry columns guarded by a uniqueness constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    DatabaseName,
    Slug,
    Domain,
}

impl std::fmt::Display for UniqueField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UniqueField::DatabaseName => write!(f, "database_name"),
            UniqueField::Slug => write!(f, "slug"),
            UniqueField::Domain => write!(f, "domain"),
        }
    }
}

/// Errors from the registry, admin, client and migration backends
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Invalid tenant database name: {0}")]
    InvalidTenantName(String),

    #[error("Unique constraint violated on {0}")]
    Conflict(UniqueField),

    #[error("Database already exists: {0}")]
    AlreadyExists(String),

    #[error("Database does not exist: {0}")]
    Missing(String),

    #[error("Database is being accessed by other users: {0}")]
    InUse(String),

    #[error("Registry row not found: {0}")]
    NotFound(String),

    #[error("Connection to {0} was invalidated while it was being opened")]
    Invalidated(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Whether a bounded retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            DatabaseError::Connection(_) => true,
            DatabaseError::Sqlx(err) => matches!(
                err,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }
}

/// Postgres SQLSTATE codes the backends translate into structured errors
pub(crate) mod sqlstate {
    pub const UNIQUE_VIOLATION: &str = "23505";
    pub const DUPLICATE_DATABASE: &str = "42P04";
    pub const INVALID_CATALOG_NAME: &str = "3D000";
    pub const OBJECT_IN_USE: &str = "55006";
}

/// SQLSTATE and constraint name of a sqlx database error, if any.
pub(crate) fn database_error_details(err: &sqlx::Error) -> Option<(String, Option<String>)> {
    let db_err = err.as_database_error()?;
    let code = db_err.code()?.into_owned();
    Some((code, db_err.constraint().map(str::to_string)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transient_errors() {
        assert!(DatabaseError::Connection("reset".into()).is_transient());
        assert!(DatabaseError::Sqlx(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!DatabaseError::Missing("store_a".into()).is_transient());
        assert!(!DatabaseError::Conflict(UniqueField::Slug).is_transient());
    }
}
