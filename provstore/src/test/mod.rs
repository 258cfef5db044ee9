//! End-to-end scenarios through the full router on an in-memory database.

use crate::api::models::{
    api_keys::ApiKeyResponse,
    bundles::{BundleDetailResponse, BundleResponse},
    pagination::ListResponse,
    permissions::BundlePermissionsResponse,
};
use crate::crypto::generate_api_key;
use crate::test_utils::{api_key_header, create_bundle, create_test_app, create_test_app_with_config, create_test_config, create_test_user};
use crate::types::CapabilitySet;
use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::json;

async fn own_permissions(server: &TestServer, id: i64, authorization: Option<&str>) -> CapabilitySet {
    let mut request = server.get(&format!("/api/v0/bundle/{id}/permissions/"));
    if let Some(value) = authorization {
        request = request.add_header("authorization", value.to_string());
    }
    let response = request.await;
    response.assert_status_ok();
    response.json::<BundlePermissionsResponse>().permissions
}

/// Valid key is accepted on the collection; the same username with a random key is not.
#[test_log::test(tokio::test)]
async fn test_api_key_authentication() {
    let (server, pool) = create_test_app().await;
    let (_, key) = create_test_user(&pool, "alice", false).await;

    server
        .get("/api/v0/bundle/")
        .add_header("authorization", api_key_header("alice", &key))
        .await
        .assert_status_ok();

    server
        .get("/api/v0/bundle/")
        .add_header("authorization", api_key_header("alice", &generate_api_key()))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    server
        .get("/api/v0/bundle/")
        .add_header("authorization", format!("apikey alice:{key}"))
        .await
        .assert_status_ok();
}

#[test_log::test(tokio::test)]
async fn test_anonymous_can_list() {
    let (server, pool) = create_test_app().await;
    let (_, key) = create_test_user(&pool, "alice", false).await;
    create_bundle(&server, "alice", &key).await;

    let response = server.get("/api/v0/bundle/").await;
    response.assert_status_ok();
    let listing: ListResponse<BundleResponse> = response.json();
    // Nothing is public yet
    assert_eq!(listing.meta.total_count, 0);
    assert!(listing.objects.is_empty());
}

#[test_log::test(tokio::test)]
async fn test_anonymous_disabled_requires_key() {
    let mut config = create_test_config();
    config.auth.anonymous_read = false;
    let (server, pool) = create_test_app_with_config(config).await;
    let (_, key) = create_test_user(&pool, "alice", false).await;

    server.get("/api/v0/bundle/").await.assert_status(StatusCode::UNAUTHORIZED);
    server
        .get("/api/v0/bundle/")
        .add_header("authorization", api_key_header("alice", &key))
        .await
        .assert_status_ok();
}

/// The full lifecycle: create, isolation, publishing through the public group, unpublishing,
/// deletion.
#[test_log::test(tokio::test)]
async fn test_bundle_lifecycle_with_public_grant() {
    let (server, pool) = create_test_app().await;
    let (_, owner_key) = create_test_user(&pool, "owner", false).await;
    let (_, other_key) = create_test_user(&pool, "other", false).await;
    let owner = api_key_header("owner", &owner_key);
    let other = api_key_header("other", &other_key);

    // Create
    let response = server
        .post("/api/v0/bundle/")
        .add_header("authorization", owner.clone())
        .json(&json!({"rec_id": "#mockup", "content": {"entity": {"ex:e1": {}}}}))
        .await;
    response.assert_status(StatusCode::CREATED);
    let created: BundleResponse = response.json();
    let id = created.id;
    assert_eq!(response.header("location"), format!("/api/v0/bundle/{id}/").as_str());

    // The creator holds all five capabilities
    assert_eq!(own_permissions(&server, id, Some(&owner)).await, CapabilitySet::all());
    let detail: BundleDetailResponse = server
        .get(&format!("/api/v0/bundle/{id}/"))
        .add_header("authorization", owner.clone())
        .await
        .json();
    assert_eq!(detail.bundle.rec_id, "#mockup");
    assert_eq!(detail.permissions, CapabilitySet::all());

    // A second user holds none of them
    assert_eq!(own_permissions(&server, id, Some(&other)).await, CapabilitySet::none());
    server
        .get(&format!("/api/v0/bundle/{id}/"))
        .add_header("authorization", other.clone())
        .await
        .assert_status(StatusCode::FORBIDDEN);
    server
        .get(&format!("/api/v0/bundle/{id}/"))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    // Publishing flips only view
    server
        .put(&format!("/api/v0/bundle/{id}/permissions/groups/public/view"))
        .add_header("authorization", owner.clone())
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let published = own_permissions(&server, id, Some(&other)).await;
    assert!(published.view);
    assert!(!published.change && !published.delete && !published.admin && !published.ownership);
    server
        .get(&format!("/api/v0/bundle/{id}/"))
        .add_header("authorization", other.clone())
        .await
        .assert_status_ok();
    server.get(&format!("/api/v0/bundle/{id}/")).await.assert_status_ok();
    assert_eq!(own_permissions(&server, id, None).await, published);

    let listing: ListResponse<BundleResponse> = server.get("/api/v0/bundle/").await.json();
    assert_eq!(listing.meta.total_count, 1);

    // View does not imply change
    server
        .put(&format!("/api/v0/bundle/{id}/"))
        .add_header("authorization", other.clone())
        .json(&json!({"rec_id": "#mockup", "content": {}}))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    // Unpublishing restores the original state
    server
        .delete(&format!("/api/v0/bundle/{id}/permissions/groups/public/view"))
        .add_header("authorization", owner.clone())
        .await
        .assert_status(StatusCode::NO_CONTENT);
    assert_eq!(own_permissions(&server, id, Some(&other)).await, CapabilitySet::none());
    server
        .get(&format!("/api/v0/bundle/{id}/"))
        .add_header("authorization", other.clone())
        .await
        .assert_status(StatusCode::FORBIDDEN);

    // The owner deletes the bundle
    server
        .delete(&format!("/api/v0/bundle/{id}/"))
        .add_header("authorization", owner.clone())
        .await
        .assert_status(StatusCode::NO_CONTENT);
    server
        .get(&format!("/api/v0/bundle/{id}/"))
        .add_header("authorization", owner)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

/// An administrator bootstraps a user who then obtains their own key with a password.
#[test_log::test(tokio::test)]
async fn test_user_onboarding() {
    let (server, pool) = create_test_app().await;
    let (_, root_key) = create_test_user(&pool, "root", true).await;

    server
        .post("/api/v0/users")
        .add_header("authorization", api_key_header("root", &root_key))
        .json(&json!({"username": "carol", "password": "correct horse battery"}))
        .await
        .assert_status(StatusCode::CREATED);

    let response = server
        .post("/api/v0/authentication/api-key")
        .json(&json!({"username": "carol", "password": "correct horse battery"}))
        .await;
    response.assert_status(StatusCode::CREATED);
    let issued: ApiKeyResponse = response.json();

    let id = create_bundle(&server, "carol", &issued.key).await;

    // Administrators hold every capability on every bundle
    assert_eq!(
        own_permissions(&server, id, Some(&api_key_header("root", &root_key))).await,
        CapabilitySet::all()
    );
}
