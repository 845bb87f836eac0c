use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config;
use crate::database::{migrate, ConnectionTemplate, PgClientFactory, PoolSettings};

#[derive(Subcommand)]
pub enum PlatformCommands {
    #[command(about = "Create or upgrade the tenant registry schema in the platform database")]
    Migrate,
}

pub async fn handle(cmd: PlatformCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let config = config::config();

    match cmd {
        PlatformCommands::Migrate => {
            let template = ConnectionTemplate::from_config(&config.database)?;
            let factory = PgClientFactory::new(template, PoolSettings::from(&config.database));
            let pool = factory.open_pool(&config.tenancy.platform_database).await?;

            migrate::migrate_platform(&pool).await?;
            pool.close().await;

            output_success(
                &output_format,
                &format!("Platform database '{}' is up to date", config.tenancy.platform_database),
                Some(json!({
                    "platform_database": config.tenancy.platform_database,
                    "tenant_schema_version": migrate::tenant_schema_version()
                })),
            )
        }
    }
}
