pub mod error;
pub mod provisioner;
pub mod resolver;
pub mod retry;
pub mod teardown;
pub mod tenant_service;

pub use error::{ProvisionStage, TeardownStage, TenantError};
pub use provisioner::{ProvisionRequest, TenantProvisioner};
pub use resolver::TenantResolver;
pub use retry::RetryPolicy;
pub use teardown::TenantTeardown;
pub use tenant_service::TenantService;
