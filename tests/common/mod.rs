#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use uuid::Uuid;

use storefront_tenancy::config::TenancyConfig;
use storefront_tenancy::database::memory::{MemoryClient, MemoryRegistry, MemoryServer};
use storefront_tenancy::database::TenantDescriptor;
use storefront_tenancy::services::{ProvisionRequest, TenantService};

/// Defaults with near-zero backoff so retry paths stay fast
pub fn test_config() -> TenancyConfig {
    TenancyConfig {
        retry_attempts: 3,
        retry_backoff_ms: 1,
        registry_timeout_ms: 500,
        provision_timeout_secs: 10,
        ..TenancyConfig::default()
    }
}

/// A tenancy service over the in-memory backends
pub struct Harness {
    pub service: Arc<TenantService<MemoryClient>>,
    pub server: Arc<MemoryServer>,
    pub registry: Arc<MemoryRegistry>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(&test_config())
    }

    pub fn with_config(config: &TenancyConfig) -> Self {
        let (service, server, registry) = TenantService::in_memory(config);
        Self {
            service: Arc::new(service),
            server,
            registry,
        }
    }

    pub async fn provision(&self, display_name: &str) -> Result<TenantDescriptor> {
        let tenant = self
            .service
            .provision_tenant(&ProvisionRequest::new(display_name, Uuid::new_v4()))
            .await?;
        Ok(tenant)
    }
}

/// The HTTP app served in-process on a free port
pub struct TestServer {
    pub base_url: String,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn spawn(service: Arc<TenantService<MemoryClient>>) -> Result<Self> {
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .with_context(|| format!("failed to bind port {}", port))?;

        let app = storefront_tenancy::app::app(service);
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            base_url: format!("http://127.0.0.1:{}", port),
            handle,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
