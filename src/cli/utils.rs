use serde_json::{json, Value};

use crate::cli::OutputFormat;
use crate::database::{TenantDescriptor, TenantRecord};

/// Output a success message in the appropriate format
pub fn output_success(
    output_format: &OutputFormat,
    message: &str,
    data: Option<Value>,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let Some(data) = data {
                response["data"] = data;
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output an error message in the appropriate format
pub fn output_error(
    output_format: &OutputFormat,
    message: &str,
    error_code: Option<&str>,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": false,
                "error": message
            });

            if let Some(code) = error_code {
                response["error_code"] = json!(code);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            eprintln!("Error: {}", message);
        }
    }
    Ok(())
}

/// Output one tenant in the appropriate format
pub fn output_tenant(output_format: &OutputFormat, tenant: &TenantDescriptor) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(tenant)?);
        }
        OutputFormat::Text => {
            println!("Store:    {} ({})", tenant.display_name, tenant.id);
            println!("Slug:     {}", tenant.slug);
            println!("Domain:   {}", tenant.domain.as_deref().unwrap_or("-"));
            println!("Database: {}", tenant.database_name);
            println!("Active:   {}", tenant.active);
        }
    }
    Ok(())
}

/// Output the tenant table in the appropriate format
pub fn output_tenant_list(output_format: &OutputFormat, tenants: &[TenantRecord]) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({ "tenants": tenants }))?);
        }
        OutputFormat::Text => {
            if tenants.is_empty() {
                println!("No stores provisioned");
                return Ok(());
            }

            println!("{:<24} {:<24} {:<28} {:<8} {}", "SLUG", "DATABASE", "DOMAIN", "ACTIVE", "CREATED");
            println!("{}", "-".repeat(100));

            for tenant in tenants {
                println!(
                    "{:<24} {:<24} {:<28} {:<8} {}",
                    tenant.slug,
                    tenant.database_name.as_deref().unwrap_or("-"),
                    tenant.domain.as_deref().unwrap_or("-"),
                    tenant.active,
                    tenant.created_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
    }
    Ok(())
}
