use clap::Subcommand;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::config;
use crate::database::TenantLookupInput;
use crate::services::{ProvisionRequest, TenantService};

#[derive(Subcommand)]
pub enum TenantCommands {
    #[command(about = "List live stores")]
    List,

    #[command(about = "Create a store database and register it")]
    Provision {
        #[arg(help = "Store display name")]
        display_name: String,

        #[arg(long, help = "Owning user id")]
        owner: Uuid,

        #[arg(long, help = "Public slug (derived from the display name when omitted)")]
        slug: Option<String>,

        #[arg(long, help = "Custom domain")]
        domain: Option<String>,

        #[arg(long, help = "Give up after this many seconds")]
        timeout_secs: Option<u64>,
    },

    #[command(about = "Show which database a store routes to")]
    Resolve {
        #[arg(long, help = "Store id")]
        id: Option<Uuid>,

        #[arg(long, help = "Store slug")]
        slug: Option<String>,

        #[arg(long, help = "Store domain")]
        domain: Option<String>,
    },

    #[command(about = "Drop a store database and retire its registry row")]
    Teardown {
        #[arg(help = "Database name, e.g. store_my_shop")]
        database_name: String,
    },
}

pub async fn handle(cmd: TenantCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let service = TenantService::connect(config::config()).await?;
    let result = run(&service, cmd, &output_format).await;
    service.shutdown().await;
    result
}

async fn run(
    service: &TenantService<sqlx::PgPool>,
    cmd: TenantCommands,
    output_format: &OutputFormat,
) -> anyhow::Result<()> {
    match cmd {
        TenantCommands::List => {
            let tenants = service.list_tenants().await?;
            output_tenant_list(output_format, &tenants)
        }
        TenantCommands::Provision {
            display_name,
            owner,
            slug,
            domain,
            timeout_secs,
        } => {
            let request = ProvisionRequest {
                display_name,
                owner_id: owner,
                slug,
                domain,
            };

            let tenant = match timeout_secs {
                Some(secs) => {
                    service
                        .provision_tenant_within(&request, Duration::from_secs(secs))
                        .await?
                }
                None => service.provision_tenant(&request).await?,
            };

            output_success(
                output_format,
                &format!("Provisioned store '{}' in {}", tenant.slug, tenant.database_name),
                Some(json!(tenant)),
            )
        }
        TenantCommands::Resolve { id, slug, domain } => {
            let tenant = service
                .resolve_tenant(&TenantLookupInput { id, slug, domain })
                .await?;
            output_tenant(output_format, &tenant)
        }
        TenantCommands::Teardown { database_name } => {
            service.teardown_tenant(&database_name).await?;
            output_success(
                output_format,
                &format!("Dropped store database {}", database_name),
                Some(json!({ "database_name": database_name })),
            )
        }
    }
}
