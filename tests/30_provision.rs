mod common;

use anyhow::Result;
use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

use storefront_tenancy::database::memory::{Fault, FaultPoint, MEMORY_SCHEMA_VERSION};
use storefront_tenancy::database::{TenantLookupInput, UniqueField};
use storefront_tenancy::services::{ProvisionRequest, ProvisionStage, TenantError};

#[tokio::test]
async fn provisioned_store_is_immediately_usable() -> Result<()> {
    let h = common::Harness::new();
    let tenant = h.provision("My Cool Shop").await?;

    assert_eq!(tenant.database_name, "store_my_cool_shop");
    assert_eq!(tenant.slug, "my-cool-shop");
    assert!(tenant.active);
    assert_eq!(h.server.schema_version("store_my_cool_shop"), Some(MEMORY_SCHEMA_VERSION));

    let (resolved, client) = h
        .service
        .route(&TenantLookupInput::by_slug("my-cool-shop"))
        .await?;
    assert_eq!(resolved.database_name, tenant.database_name);
    client.put("greeting", "hello")?;
    assert_eq!(client.get("greeting")?.as_deref(), Some("hello"));
    Ok(())
}

#[tokio::test]
async fn colliding_names_get_a_disambiguator() -> Result<()> {
    let h = common::Harness::new();
    let first = h.provision("My Cool Shop").await?;
    let second = h.provision("MY COOL SHOP").await?;
    let third = h.provision("my cool shop").await?;

    assert_eq!(first.database_name, "store_my_cool_shop");
    assert_eq!(second.database_name, "store_my_cool_shop_1");
    assert_eq!(second.slug, "my-cool-shop-1");
    assert_eq!(third.database_name, "store_my_cool_shop_2");
    assert_eq!(third.slug, "my-cool-shop-2");
    Ok(())
}

#[tokio::test]
async fn slug_collision_moves_to_the_next_disambiguator() -> Result<()> {
    let h = common::Harness::new();
    h.provision("Tea Co").await?;

    // Different database base name, same derived slug: only the slug moves
    let other = h.provision("Tea__Co").await?;
    assert_eq!(other.slug, "tea-co-1");
    assert_eq!(other.database_name, "store_tea__co");
    Ok(())
}

#[tokio::test]
async fn explicit_slug_does_not_push_the_database_name() -> Result<()> {
    let h = common::Harness::new();
    h.service
        .provision_tenant(&ProvisionRequest::new("Other", Uuid::new_v4()).with_slug("my-cool-shop"))
        .await?;

    let tenant = h.provision("My Cool Shop").await?;
    assert_eq!(tenant.database_name, "store_my_cool_shop");
    assert_eq!(tenant.slug, "my-cool-shop-1");
    Ok(())
}

#[tokio::test]
async fn concurrent_provisions_never_share_a_database() -> Result<()> {
    let h = common::Harness::new();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let service = h.service.clone();
        tasks.push(tokio::spawn(async move {
            service
                .provision_tenant(&ProvisionRequest::new("Popular Name", Uuid::new_v4()))
                .await
        }));
    }

    let mut names = HashSet::new();
    let mut slugs = HashSet::new();
    for task in tasks {
        let tenant = task.await??;
        names.insert(tenant.database_name);
        slugs.insert(tenant.slug);
    }

    assert_eq!(names.len(), 8);
    assert_eq!(slugs.len(), 8);
    assert!(names.contains("store_popular_name"));
    assert_eq!(h.server.database_names().len(), 8);
    Ok(())
}

#[tokio::test]
async fn schema_failure_leaves_nothing_behind() -> Result<()> {
    let h = common::Harness::new();
    h.server.inject(FaultPoint::Migrate, Fault::Permanent);

    let err = h.provision("Broken Schema").await.unwrap_err();
    let err = err.downcast::<TenantError>()?;
    assert!(matches!(
        err,
        TenantError::ProvisioningFailed { stage: ProvisionStage::SchemaApply, .. }
    ));

    assert!(h.registry.all_rows().is_empty());
    assert!(h.server.database_names().is_empty());
    assert!(h.service.cache().is_empty().await);

    let err = h
        .service
        .resolve_tenant(&TenantLookupInput::by_slug("broken-schema"))
        .await
        .unwrap_err();
    assert!(matches!(err, TenantError::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn transient_failures_are_retried() -> Result<()> {
    let h = common::Harness::new();
    h.server.inject(FaultPoint::Create, Fault::Transient);
    h.server.inject(FaultPoint::Connect, Fault::Transient);
    h.server.inject(FaultPoint::Migrate, Fault::Transient);

    let tenant = h.provision("Bumpy Road").await?;
    assert_eq!(h.server.schema_version(&tenant.database_name), Some(MEMORY_SCHEMA_VERSION));
    Ok(())
}

#[tokio::test]
async fn retries_are_bounded() -> Result<()> {
    let h = common::Harness::new();
    for _ in 0..3 {
        h.server.inject(FaultPoint::Create, Fault::Transient);
    }

    let err = h.provision("Dead End").await.unwrap_err();
    let err = err.downcast::<TenantError>()?;
    assert!(matches!(
        err,
        TenantError::ProvisioningFailed { stage: ProvisionStage::PhysicalCreate, .. }
    ));
    assert!(err.is_retryable());
    assert!(h.registry.all_rows().is_empty());
    Ok(())
}

#[tokio::test]
async fn explicit_slug_collision_is_a_conflict() -> Result<()> {
    let h = common::Harness::new();
    h.service
        .provision_tenant(&ProvisionRequest::new("Shop One", Uuid::new_v4()).with_slug("shop"))
        .await?;

    let err = h
        .service
        .provision_tenant(&ProvisionRequest::new("Shop Two", Uuid::new_v4()).with_slug("shop"))
        .await
        .unwrap_err();
    assert!(matches!(err, TenantError::Conflict(UniqueField::Slug)));
    assert_eq!(h.server.database_names(), vec!["store_shop_one".to_string()]);
    Ok(())
}

#[tokio::test]
async fn domain_collision_is_a_conflict() -> Result<()> {
    let h = common::Harness::new();
    h.service
        .provision_tenant(
            &ProvisionRequest::new("Shop One", Uuid::new_v4()).with_domain("shop.example.com"),
        )
        .await?;

    let err = h
        .service
        .provision_tenant(
            &ProvisionRequest::new("Shop Two", Uuid::new_v4()).with_domain("SHOP.example.com"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TenantError::Conflict(UniqueField::Domain)));
    assert_eq!(h.registry.all_rows().len(), 1);
    Ok(())
}

#[tokio::test]
async fn unusable_names_are_rejected() -> Result<()> {
    let h = common::Harness::new();

    for name in ["", "   ", "!!!"] {
        let err = h
            .service
            .provision_tenant(&ProvisionRequest::new(name, Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, TenantError::InvalidTenantName(_)), "{:?}", name);
    }

    let err = h
        .service
        .provision_tenant(&ProvisionRequest::new("x".repeat(80), Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, TenantError::InvalidTenantName(_)));

    let err = h
        .service
        .provision_tenant(&ProvisionRequest::new("Fine", Uuid::new_v4()).with_slug("Not A Slug"))
        .await
        .unwrap_err();
    assert!(matches!(err, TenantError::InvalidTenantName(_)));

    assert!(h.registry.all_rows().is_empty());
    assert!(h.server.database_names().is_empty());
    Ok(())
}

#[tokio::test]
async fn deadline_rolls_back_the_attempt() -> Result<()> {
    let h = common::Harness::new();
    h.server.set_connect_delay("store_slowpoke", Duration::from_secs(5));

    let err = h
        .service
        .provision_tenant_within(
            &ProvisionRequest::new("Slowpoke", Uuid::new_v4()),
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TenantError::ProvisioningFailed { stage: ProvisionStage::SchemaApply, .. }
    ));

    assert!(h.registry.all_rows().is_empty());
    assert!(!h.server.has_database("store_slowpoke"));
    Ok(())
}

#[tokio::test]
async fn deadline_covers_name_reservation() -> Result<()> {
    let h = common::Harness::new();
    h.registry.set_read_delay(Duration::from_secs(5));

    let started = std::time::Instant::now();
    let err = h
        .service
        .provision_tenant_within(
            &ProvisionRequest::new("Patient", Uuid::new_v4()),
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(matches!(
        err,
        TenantError::ProvisioningFailed { stage: ProvisionStage::NameReservation, .. }
    ));
    assert!(h.registry.all_rows().is_empty());
    assert!(h.server.database_names().is_empty());
    Ok(())
}

#[tokio::test]
async fn retired_names_are_never_reused() -> Result<()> {
    let h = common::Harness::new();
    let first = h.provision("Phoenix").await?;
    h.service.teardown_tenant(&first.database_name).await?;

    let second = h.provision("Phoenix").await?;
    assert_eq!(second.database_name, "store_phoenix_1");
    assert_ne!(second.id, first.id);
    Ok(())
}
