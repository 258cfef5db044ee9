use crate::{
    AppState,
    api::models::{
        bundles::{BundleCreate, BundleDetailResponse, BundleResponse, BundleUpdate, ListBundlesQuery, bundle_uri},
        format::{FormatQuery, ensure_format},
        pagination::ListResponse,
        users::CurrentUser,
    },
    auth::permissions,
    db::{
        errors::DbError,
        handlers::{
            Bundles, ObjectPermissions, Repository,
            bundles::{BundleFilter, Visibility},
        },
        models::bundles::{BundleCreateDBRequest, BundleUpdateDBRequest},
    },
    errors::{Error, Result},
    types::{BundleId, Capability, Operation, Principal},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
};
use tracing::info;

pub(crate) fn bundle_not_found(id: BundleId) -> Error {
    Error::NotFound {
        resource: "Bundle".to_string(),
        id: id.to_string(),
    }
}

fn visibility(principal: &Principal) -> Visibility {
    match principal {
        Principal::Anonymous => Visibility::Public,
        Principal::User(user) if user.is_admin && user.is_active => Visibility::All,
        Principal::User(user) => Visibility::User(user.id),
    }
}

/// List the bundles the caller can view.
#[utoipa::path(
    get,
    path = "/bundle/",
    tag = "bundles",
    summary = "List bundles",
    description = "List the bundles the caller holds `view` on. Anonymous callers see bundles shared with the public group.",
    params(ListBundlesQuery),
    responses(
        (status = 200, description = "Paginated list of bundles", body = ListResponse<BundleResponse>),
        (status = 400, description = "Unsupported format"),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        (),
        ("ApiKeyAuth" = [])
    )
)]
#[tracing::instrument(skip_all, fields(principal = %principal))]
pub async fn list_bundles(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<ListBundlesQuery>,
) -> Result<Json<ListResponse<BundleResponse>>> {
    ensure_format(query.format.as_deref())?;

    let (offset, limit) = query.pagination.params();
    let filter = BundleFilter::new(offset, limit, visibility(&principal));

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Bundles::new(&mut conn);
    let total_count = repo.count(&filter).await?;
    let bundles = repo.list(&filter).await?;

    Ok(Json(ListResponse::new(
        bundles.into_iter().map(BundleResponse::from).collect(),
        total_count,
        offset,
        limit,
    )))
}

/// Store a new bundle. The creator receives every capability on it.
#[utoipa::path(
    post,
    path = "/bundle/",
    tag = "bundles",
    summary = "Create bundle",
    request_body = BundleCreate,
    params(FormatQuery),
    responses(
        (status = 201, description = "Bundle created", body = BundleResponse,
            headers(("Location" = String, description = "URI of the new bundle"))),
        (status = 400, description = "Invalid bundle or unsupported format"),
        (status = 401, description = "Authentication required"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("ApiKeyAuth" = [])
    )
)]
#[tracing::instrument(skip_all, fields(user = %current_user.username))]
pub async fn create_bundle(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(format): Query<FormatQuery>,
    Json(data): Json<BundleCreate>,
) -> Result<(StatusCode, [(header::HeaderName, String); 1], Json<BundleResponse>)> {
    format.ensure_supported()?;
    data.validate()?;

    let mut tx = state.db.begin().await.map_err(DbError::from)?;
    let bundle = Bundles::new(&mut tx)
        .create(&BundleCreateDBRequest {
            rec_id: data.rec_id,
            owner_id: current_user.id,
            content: data.content,
        })
        .await?;
    permissions::assign_owner(&mut tx, current_user.id, bundle.id).await?;
    tx.commit().await.map_err(DbError::from)?;

    info!(bundle_id = bundle.id, "Created bundle");

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, bundle_uri(bundle.id))],
        Json(BundleResponse::from(bundle)),
    ))
}

/// Fetch one bundle together with the caller's capability flags.
#[utoipa::path(
    get,
    path = "/bundle/{id}/",
    tag = "bundles",
    summary = "Get bundle",
    params(
        ("id" = i64, Path, description = "Bundle ID"),
        FormatQuery,
    ),
    responses(
        (status = 200, description = "Bundle details", body = BundleDetailResponse),
        (status = 400, description = "Unsupported format"),
        (status = 401, description = "Anonymous caller lacks view"),
        (status = 403, description = "Caller lacks view"),
        (status = 404, description = "Bundle not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        (),
        ("ApiKeyAuth" = [])
    )
)]
#[tracing::instrument(skip_all, fields(bundle_id = id, principal = %principal))]
pub async fn get_bundle(
    State(state): State<AppState>,
    Path(id): Path<BundleId>,
    principal: Principal,
    Query(format): Query<FormatQuery>,
) -> Result<Json<BundleDetailResponse>> {
    format.ensure_supported()?;

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let bundle = Bundles::new(&mut conn).get_by_id(id).await?.ok_or_else(|| bundle_not_found(id))?;

    let held = permissions::get_perms(&mut conn, &principal, id).await?;
    if !held.view {
        return Err(permissions::denied(&principal, id, Capability::View, Operation::Read));
    }

    Ok(Json(BundleDetailResponse {
        bundle: BundleResponse::from(bundle),
        permissions: held,
    }))
}

/// Replace a bundle's identifier and document.
#[utoipa::path(
    put,
    path = "/bundle/{id}/",
    tag = "bundles",
    summary = "Update bundle",
    request_body = BundleUpdate,
    params(
        ("id" = i64, Path, description = "Bundle ID"),
        FormatQuery,
    ),
    responses(
        (status = 202, description = "Bundle updated", body = BundleResponse),
        (status = 400, description = "Invalid bundle or unsupported format"),
        (status = 401, description = "Anonymous caller lacks change"),
        (status = 403, description = "Caller lacks change"),
        (status = 404, description = "Bundle not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        (),
        ("ApiKeyAuth" = [])
    )
)]
#[tracing::instrument(skip_all, fields(bundle_id = id, principal = %principal))]
pub async fn update_bundle(
    State(state): State<AppState>,
    Path(id): Path<BundleId>,
    principal: Principal,
    Query(format): Query<FormatQuery>,
    Json(data): Json<BundleUpdate>,
) -> Result<(StatusCode, Json<BundleResponse>)> {
    format.ensure_supported()?;
    data.validate()?;

    let mut tx = state.db.begin().await.map_err(DbError::from)?;
    if !Bundles::new(&mut tx).exists(id).await? {
        return Err(bundle_not_found(id));
    }
    permissions::require(&mut tx, &principal, id, Capability::Change, Operation::Update).await?;

    let bundle = Bundles::new(&mut tx)
        .update(
            id,
            &BundleUpdateDBRequest {
                rec_id: data.rec_id,
                content: data.content,
            },
        )
        .await?;
    tx.commit().await.map_err(DbError::from)?;

    Ok((StatusCode::ACCEPTED, Json(BundleResponse::from(bundle))))
}

/// Delete a bundle and every grant on it.
#[utoipa::path(
    delete,
    path = "/bundle/{id}/",
    tag = "bundles",
    summary = "Delete bundle",
    params(
        ("id" = i64, Path, description = "Bundle ID"),
        FormatQuery,
    ),
    responses(
        (status = 204, description = "Bundle deleted"),
        (status = 401, description = "Anonymous caller lacks delete"),
        (status = 403, description = "Caller lacks delete"),
        (status = 404, description = "Bundle not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        (),
        ("ApiKeyAuth" = [])
    )
)]
#[tracing::instrument(skip_all, fields(bundle_id = id, principal = %principal))]
pub async fn delete_bundle(
    State(state): State<AppState>,
    Path(id): Path<BundleId>,
    principal: Principal,
    Query(format): Query<FormatQuery>,
) -> Result<StatusCode> {
    format.ensure_supported()?;

    let mut tx = state.db.begin().await.map_err(DbError::from)?;
    if !Bundles::new(&mut tx).exists(id).await? {
        return Err(bundle_not_found(id));
    }
    permissions::require(&mut tx, &principal, id, Capability::Delete, Operation::Delete).await?;

    let grants = ObjectPermissions::new(&mut tx).clear(id).await?;
    if !Bundles::new(&mut tx).delete(id).await? {
        return Err(bundle_not_found(id));
    }
    tx.commit().await.map_err(DbError::from)?;

    info!(bundle_id = id, grants, "Deleted bundle");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::api::models::bundles::{BundleDetailResponse, BundleResponse};
    use crate::api::models::pagination::ListResponse;
    use crate::test_utils::{api_key_header, create_bundle, create_test_app, create_test_user};
    use axum::http::StatusCode;
    use serde_json::json;

    #[test_log::test(tokio::test)]
    async fn test_create_returns_location_and_grants_owner() {
        let (server, pool) = create_test_app().await;
        let (_, key) = create_test_user(&pool, "alice", false).await;

        let response = server
            .post("/api/v0/bundle/")
            .add_query_param("format", "json")
            .add_header("authorization", api_key_header("alice", &key))
            .json(&json!({"rec_id": "#mockup", "content": {"entity": {"ex:e1": {}}}}))
            .await;

        response.assert_status(StatusCode::CREATED);
        let bundle: BundleResponse = response.json();
        assert_eq!(bundle.owner, "alice");
        assert_eq!(response.header("location"), format!("/api/v0/bundle/{}/", bundle.id));

        let detail = server
            .get(&format!("/api/v0/bundle/{}/", bundle.id))
            .add_header("authorization", api_key_header("alice", &key))
            .await;
        detail.assert_status_ok();
        let detail: BundleDetailResponse = detail.json();
        assert!(detail.permissions.view && detail.permissions.ownership);
        assert_eq!(detail.bundle.content, json!({"entity": {"ex:e1": {}}}));
    }

    #[test_log::test(tokio::test)]
    async fn test_anonymous_cannot_create() {
        let (server, _pool) = create_test_app().await;

        let response = server
            .post("/api/v0/bundle/")
            .json(&json!({"rec_id": "#mockup", "content": {}}))
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[test_log::test(tokio::test)]
    async fn test_invalid_body_and_format_are_rejected() {
        let (server, pool) = create_test_app().await;
        let (_, key) = create_test_user(&pool, "alice", false).await;

        server
            .post("/api/v0/bundle/")
            .add_header("authorization", api_key_header("alice", &key))
            .json(&json!({"rec_id": "#mockup", "content": "not an object"}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        server
            .get("/api/v0/bundle/")
            .add_query_param("format", "xml")
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[test_log::test(tokio::test)]
    async fn test_update_requires_change() {
        let (server, pool) = create_test_app().await;
        let (_, owner_key) = create_test_user(&pool, "owner", false).await;
        let (_, other_key) = create_test_user(&pool, "other", false).await;
        let id = create_bundle(&server, "owner", &owner_key).await;

        let body = json!({"rec_id": "#revised", "content": {"agent": {}}});
        server
            .put(&format!("/api/v0/bundle/{id}/"))
            .add_header("authorization", api_key_header("other", &other_key))
            .json(&body)
            .await
            .assert_status(StatusCode::FORBIDDEN);
        server
            .put(&format!("/api/v0/bundle/{id}/"))
            .json(&body)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        let response = server
            .put(&format!("/api/v0/bundle/{id}"))
            .add_header("authorization", api_key_header("owner", &owner_key))
            .json(&body)
            .await;
        response.assert_status(StatusCode::ACCEPTED);
        let updated: BundleResponse = response.json();
        assert_eq!(updated.rec_id, "#revised");

        server
            .put("/api/v0/bundle/9999/")
            .add_header("authorization", api_key_header("owner", &owner_key))
            .json(&body)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[test_log::test(tokio::test)]
    async fn test_list_is_paginated_and_filtered() {
        let (server, pool) = create_test_app().await;
        let (_, alice_key) = create_test_user(&pool, "alice", false).await;
        let (_, bob_key) = create_test_user(&pool, "bob", false).await;
        for _ in 0..3 {
            create_bundle(&server, "alice", &alice_key).await;
        }
        create_bundle(&server, "bob", &bob_key).await;

        let response = server
            .get("/api/v0/bundle/")
            .add_query_param("limit", "2")
            .add_query_param("offset", "1")
            .add_header("authorization", api_key_header("alice", &alice_key))
            .await;
        response.assert_status_ok();
        let page: ListResponse<BundleResponse> = response.json();
        assert_eq!(page.meta.total_count, 3);
        assert_eq!(page.meta.limit, 2);
        assert_eq!(page.meta.offset, 1);
        assert_eq!(page.objects.len(), 2);
        assert!(page.objects.iter().all(|b| b.owner == "alice"));

        let anonymous: ListResponse<BundleResponse> = server.get("/api/v0/bundle").await.json();
        assert_eq!(anonymous.meta.total_count, 0);
        assert_eq!(anonymous.meta.limit, 20);
    }

    #[test_log::test(tokio::test)]
    async fn test_admin_sees_and_deletes_everything() {
        let (server, pool) = create_test_app().await;
        let (_, alice_key) = create_test_user(&pool, "alice", false).await;
        let (_, root_key) = create_test_user(&pool, "root", true).await;
        let id = create_bundle(&server, "alice", &alice_key).await;

        let listing: ListResponse<BundleResponse> = server
            .get("/api/v0/bundle/")
            .add_header("authorization", api_key_header("root", &root_key))
            .await
            .json();
        assert_eq!(listing.meta.total_count, 1);

        server
            .delete(&format!("/api/v0/bundle/{id}/"))
            .add_header("authorization", api_key_header("root", &root_key))
            .await
            .assert_status(StatusCode::NO_CONTENT);
    }

    #[test_log::test(tokio::test)]
    async fn test_delete_removes_user_and_group_grants() {
        let (server, pool) = create_test_app().await;
        let (_, key) = create_test_user(&pool, "alice", false).await;
        let owner = api_key_header("alice", &key);
        let id = create_bundle(&server, "alice", &key).await;

        server
            .put(&format!("/api/v0/bundle/{id}/permissions/groups/public/view"))
            .add_header("authorization", owner.clone())
            .await
            .assert_status(StatusCode::NO_CONTENT);

        server
            .delete(&format!("/api/v0/bundle/{id}/"))
            .add_header("authorization", owner)
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let mut conn = pool.acquire().await.unwrap();
        let (users, groups): (i64, i64) = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM bundle_user_permissions WHERE bundle_id = ?1), \
                    (SELECT COUNT(*) FROM bundle_group_permissions WHERE bundle_id = ?1)",
        )
        .bind(id)
        .fetch_one(&mut *conn)
        .await
        .unwrap();
        assert_eq!((users, groups), (0, 0));
    }
}
