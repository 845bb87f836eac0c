mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

use storefront_tenancy::database::TenantRegistry;

#[tokio::test]
async fn health_endpoint_responds() -> Result<()> {
    let h = common::Harness::new();
    let server = common::TestServer::spawn(h.service.clone()).await?;

    let res = reqwest::get(server.url("/health")).await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body = res.json::<Value>().await?;
    assert_eq!(body["data"]["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn create_route_and_delete_a_store() -> Result<()> {
    let h = common::Harness::new();
    let server = common::TestServer::spawn(h.service.clone()).await?;
    let client = reqwest::Client::new();

    // Create
    let res = client
        .post(server.url("/api/root/tenant"))
        .json(&json!({
            "display_name": "Http Shop",
            "owner_id": Uuid::new_v4(),
            "domain": "http.example.com"
        }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::CREATED);
    let created = res.json::<Value>().await?;
    assert_eq!(created["success"], true);
    assert_eq!(created["data"]["database_name"], "store_http_shop");
    let id = created["data"]["id"].as_str().unwrap_or_default().to_string();

    // Route by slug and by id
    let res = client
        .get(server.url("/api/store"))
        .header("x-store-slug", "http-shop")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<Value>().await?;
    assert_eq!(body["data"]["id"], id.as_str());

    let res = client
        .get(server.url("/api/store"))
        .header("x-store-id", id.as_str())
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    // List
    let res = client.get(server.url("/api/root/tenant")).send().await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<Value>().await?;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));

    // Delete
    let res = client
        .delete(server.url("/api/root/tenant/store_http_shop"))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(server.url("/api/store"))
        .header("x-store-slug", "http-shop")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn unknown_and_suspended_stores_look_the_same() -> Result<()> {
    let h = common::Harness::new();
    let tenant = h.provision("Hidden Shop").await?;
    let server = common::TestServer::spawn(h.service.clone()).await?;
    let client = reqwest::Client::new();

    h.registry.set_active(tenant.id, false).await?;

    let suspended = client
        .get(server.url("/api/store"))
        .header("x-store-slug", "hidden-shop")
        .send()
        .await?;
    let unknown = client
        .get(server.url("/api/store"))
        .header("x-store-slug", "no-such-shop")
        .send()
        .await?;

    assert_eq!(suspended.status(), StatusCode::NOT_FOUND);
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    assert_eq!(suspended.json::<Value>().await?, unknown.json::<Value>().await?);
    Ok(())
}

#[tokio::test]
async fn request_errors_map_to_client_statuses() -> Result<()> {
    let h = common::Harness::new();
    let server = common::TestServer::spawn(h.service.clone()).await?;
    let client = reqwest::Client::new();

    let res = client
        .get(server.url("/api/store"))
        .header("x-store-id", "definitely-not-a-uuid")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // Host header alone names no registered domain
    let res = client.get(server.url("/api/store")).send().await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let owner = Uuid::new_v4();
    let body = json!({ "display_name": "Twin", "owner_id": owner, "slug": "twin" });
    let res = client.post(server.url("/api/root/tenant")).json(&body).send().await?;
    assert_eq!(res.status(), StatusCode::CREATED);

    let body = json!({ "display_name": "Twin Two", "owner_id": owner, "slug": "twin" });
    let res = client.post(server.url("/api/root/tenant")).json(&body).send().await?;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = client
        .delete(server.url("/api/root/tenant/postgres"))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    Ok(())
}
