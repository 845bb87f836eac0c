// Tenant database name and slug derivation.
//
// Database names are interpolated into CREATE/DROP DATABASE statements, so
// everything that reaches the admin layer must pass `validate_database_name`.

use thiserror::Error;

/// Postgres truncates identifiers past 63 bytes; refuse instead of colliding.
pub const MAX_IDENTIFIER_LEN: usize = 63;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("display name is empty")]
    Empty,

    #[error("database name '{0}' exceeds 63 characters")]
    TooLong(String),

    #[error("database name '{0}' must start with '{1}'")]
    MissingPrefix(String, String),

    #[error("database name '{0}' contains characters outside [a-z0-9_]")]
    InvalidCharacters(String),
}

/// Lowercase, then collapse every run of characters outside `[a-z0-9_]`
/// into a single underscore.
pub fn normalize(display_name: &str) -> String {
    let lowered = display_name.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut in_run = false;

    for c in lowered.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }

    out
}

/// Base database name for a display name, before any disambiguator.
pub fn derive_database_name(prefix: &str, display_name: &str) -> Result<String, NameError> {
    if display_name.trim().is_empty() {
        return Err(NameError::Empty);
    }
    let name = format!("{}{}", prefix, normalize(display_name));
    validate_database_name(prefix, &name)?;
    Ok(name)
}

/// Apply the collision disambiguator; `0` means the base name itself.
pub fn with_disambiguator(base: &str, n: u32) -> String {
    if n == 0 {
        base.to_string()
    } else {
        format!("{}_{}", base, n)
    }
}

/// Charset and prefix check applied before any name is used in DDL.
pub fn validate_database_name(prefix: &str, name: &str) -> Result<(), NameError> {
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(NameError::TooLong(name.to_string()));
    }
    if !name.starts_with(prefix) || name.len() == prefix.len() {
        return Err(NameError::MissingPrefix(name.to_string(), prefix.to_string()));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(NameError::InvalidCharacters(name.to_string()));
    }
    Ok(())
}

/// URL slug: lowercase ascii alphanumerics joined by single hyphens.
pub fn slugify(display_name: &str) -> Result<String, NameError> {
    let lowered = display_name.to_lowercase();
    let mut slug = String::with_capacity(lowered.len());

    for c in lowered.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        return Err(NameError::Empty);
    }
    Ok(slug)
}

pub fn slug_with_disambiguator(base: &str, n: u32) -> String {
    if n == 0 {
        base.to_string()
    } else {
        format!("{}-{}", base, n)
    }
}

/// Lowercase and strip any `:port` so `Shop.Example.com:443` matches the stored domain.
pub fn normalize_domain(domain: &str) -> String {
    let host = domain.trim();
    let host = match host.rsplit_once(':') {
        Some((h, port)) if port.chars().all(|c| c.is_ascii_digit()) => h,
        _ => host,
    };
    host.trim_end_matches('.').to_ascii_lowercase()
}
