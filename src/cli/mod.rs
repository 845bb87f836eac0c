pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "storefront")]
#[command(about = "Storefront CLI - provision, resolve and tear down store databases")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Platform database maintenance")]
    Platform {
        #[command(subcommand)]
        cmd: commands::platform::PlatformCommands,
    },

    #[command(about = "Store tenant lifecycle")]
    Tenant {
        #[command(subcommand)]
        cmd: commands::tenant::TenantCommands,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Platform { cmd } => commands::platform::handle(cmd, output_format).await,
        Commands::Tenant { cmd } => commands::tenant::handle(cmd, output_format).await,
    }
}
