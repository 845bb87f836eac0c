use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A row of the platform `tenants` table.
///
/// `database_name` is nullable at the storage level so that a damaged row can
/// be detected and reported instead of routed; `provisioned_at` stays NULL
/// while the physical store is still being created.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TenantRecord {
    pub id: Uuid,
    pub display_name: String,
    pub slug: String,
    pub domain: Option<String>,
    pub database_name: Option<String>,
    pub active: bool,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub provisioned_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TenantRecord {
    /// Committed and not retired; only these rows are visible to resolution.
    pub fn is_live(&self) -> bool {
        self.provisioned_at.is_some() && self.deleted_at.is_none()
    }

    pub fn is_pending(&self) -> bool {
        self.provisioned_at.is_none() && self.deleted_at.is_none()
    }
}

/// Values for a reservation row inserted at the start of provisioning
#[derive(Debug, Clone)]
pub struct NewTenant {
    pub display_name: String,
    pub slug: String,
    pub domain: Option<String>,
    pub database_name: String,
    pub owner_id: Uuid,
}

/// Validated, routable view of a tenant handed to request handlers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantDescriptor {
    pub id: Uuid,
    pub display_name: String,
    pub slug: String,
    pub domain: Option<String>,
    pub database_name: String,
    pub active: bool,
    pub owner_id: Uuid,
}

/// One primary lookup key for the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantLookup {
    Id(Uuid),
    Slug(String),
    Domain(String),
}

impl std::fmt::Display for TenantLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TenantLookup::Id(id) => write!(f, "id={}", id),
            TenantLookup::Slug(slug) => write!(f, "slug={}", slug),
            TenantLookup::Domain(domain) => write!(f, "domain={}", domain),
        }
    }
}

/// Tenant-identifying input as it arrives from a call site
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantLookupInput {
    pub id: Option<Uuid>,
    pub slug: Option<String>,
    pub domain: Option<String>,
}

impl TenantLookupInput {
    pub fn by_id(id: Uuid) -> Self {
        Self { id: Some(id), ..Default::default() }
    }

    pub fn by_slug(slug: impl Into<String>) -> Self {
        Self { slug: Some(slug.into()), ..Default::default() }
    }

    pub fn by_domain(domain: impl Into<String>) -> Self {
        Self { domain: Some(domain.into()), ..Default::default() }
    }

    /// `id` wins over `slug`, which wins over `domain`. Blank strings are ignored.
    pub fn primary(&self) -> Option<TenantLookup> {
        if let Some(id) = self.id {
            return Some(TenantLookup::Id(id));
        }
        if let Some(slug) = self.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            return Some(TenantLookup::Slug(slug.to_string()));
        }
        self.domain
            .as_deref()
            .map(crate::database::naming::normalize_domain)
            .filter(|d| !d.is_empty())
            .map(TenantLookup::Domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_takes_precedence_over_slug_and_domain() {
        let id = Uuid::new_v4();
        let input = TenantLookupInput {
            id: Some(id),
            slug: Some("shop".into()),
            domain: Some("shop.example.com".into()),
        };
        assert_eq!(input.primary(), Some(TenantLookup::Id(id)));

        let input = TenantLookupInput {
            id: None,
            slug: Some("shop".into()),
            domain: Some("shop.example.com".into()),
        };
        assert_eq!(input.primary(), Some(TenantLookup::Slug("shop".into())));
    }

    #[test]
    fn blank_keys_fall_through() {
        let input = TenantLookupInput {
            id: None,
            slug: Some("  ".into()),
            domain: Some("Shop.Example.com:443".into()),
        };
        assert_eq!(
            input.primary(),
            Some(TenantLookup::Domain("shop.example.com".into()))
        );
        assert_eq!(TenantLookupInput::default().primary(), None);
    }
}
