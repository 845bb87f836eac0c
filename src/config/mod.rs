use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub tenancy: TenancyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Base connection URL; the path is swapped for each database name
    pub url: Option<String>,
    pub max_connections: u32,
    /// Seconds to wait when acquiring a pooled connection
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    /// Prefix every tenant database name carries (`store_my_cool_shop`)
    pub database_prefix: String,
    /// Database holding the tenant registry
    pub platform_database: String,
    /// Maintenance database used for CREATE/DROP DATABASE
    pub admin_database: String,
    pub registry_timeout_ms: u64,
    pub provision_timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl TenancyConfig {
    pub fn registry_timeout(&self) -> Duration {
        Duration::from_millis(self.registry_timeout_ms)
    }

    pub fn provision_timeout(&self) -> Duration {
        Duration::from_secs(self.provision_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for TenancyConfig {
    fn default() -> Self {
        AppConfig::development().tenancy
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // Tenancy overrides
        if let Ok(v) = env::var("TENANCY_DATABASE_PREFIX") {
            self.tenancy.database_prefix = v;
        }
        if let Ok(v) = env::var("TENANCY_PLATFORM_DATABASE") {
            self.tenancy.platform_database = v;
        }
        if let Ok(v) = env::var("TENANCY_ADMIN_DATABASE") {
            self.tenancy.admin_database = v;
        }
        if let Ok(v) = env::var("TENANCY_REGISTRY_TIMEOUT_MS") {
            self.tenancy.registry_timeout_ms = v.parse().unwrap_or(self.tenancy.registry_timeout_ms);
        }
        if let Ok(v) = env::var("TENANCY_PROVISION_TIMEOUT_SECS") {
            self.tenancy.provision_timeout_secs = v.parse().unwrap_or(self.tenancy.provision_timeout_secs);
        }
        if let Ok(v) = env::var("TENANCY_RETRY_ATTEMPTS") {
            self.tenancy.retry_attempts = v.parse().unwrap_or(self.tenancy.retry_attempts);
        }
        if let Ok(v) = env::var("TENANCY_RETRY_BACKOFF_MS") {
            self.tenancy.retry_backoff_ms = v.parse().unwrap_or(self.tenancy.retry_backoff_ms);
        }

        self
    }

    fn tenancy_defaults() -> TenancyConfig {
        TenancyConfig {
            database_prefix: "store_".to_string(),
            platform_database: "storefront_platform".to_string(),
            admin_database: "postgres".to_string(),
            registry_timeout_ms: 2_000,
            provision_timeout_secs: 120,
            retry_attempts: 3,
            retry_backoff_ms: 200,
        }
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                url: None,
                max_connections: 5,
                connection_timeout: 30,
            },
            tenancy: Self::tenancy_defaults(),
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 10,
            },
            tenancy: TenancyConfig {
                registry_timeout_ms: 1_000,
                ..Self::tenancy_defaults()
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                connection_timeout: 5,
            },
            tenancy: TenancyConfig {
                registry_timeout_ms: 500,
                provision_timeout_secs: 300,
                retry_attempts: 5,
                retry_backoff_ms: 500,
                ..Self::tenancy_defaults()
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
