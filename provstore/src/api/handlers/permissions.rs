use crate::{
    AppState,
    api::{
        handlers::bundles::bundle_not_found,
        models::{
            format::FormatQuery,
            permissions::{BundlePermissionsResponse, GroupGrantResponse},
            users::CurrentUser,
        },
    },
    auth::permissions,
    db::{
        errors::DbError,
        handlers::{Bundles, Groups, ObjectPermissions, Repository, Users},
    },
    errors::{Error, Result},
    types::{BundleId, Capability, Operation, Principal, Subject},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use sqlx::SqliteConnection;
use tracing::info;

fn parse_capability(raw: &str) -> Result<Capability> {
    raw.parse().map_err(|e: crate::types::UnknownCapability| Error::BadRequest { message: e.to_string() })
}

async fn ensure_bundle(conn: &mut SqliteConnection, id: BundleId) -> Result<()> {
    if Bundles::new(conn).exists(id).await? {
        Ok(())
    } else {
        Err(bundle_not_found(id))
    }
}

async fn user_subject(conn: &mut SqliteConnection, username: &str) -> Result<Subject> {
    let user = Users::new(conn)
        .get_user_by_username(username)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "User".to_string(),
            id: username.to_string(),
        })?;
    Ok(Subject::User(user.id))
}

async fn group_subject(conn: &mut SqliteConnection, name: &str) -> Result<Subject> {
    let group = Groups::new(conn).get_by_name(name).await?.ok_or_else(|| Error::NotFound {
        resource: "Group".to_string(),
        id: name.to_string(),
    })?;
    Ok(Subject::Group(group.id))
}

/// Grant or revoke one capability after checking the caller may manage it.
async fn change_grant(
    state: &AppState,
    principal: &Principal,
    bundle_id: BundleId,
    subject: SubjectRef<'_>,
    raw_capability: &str,
    action: Operation,
) -> Result<StatusCode> {
    let capability = parse_capability(raw_capability)?;

    let mut tx = state.db.begin().await.map_err(DbError::from)?;
    ensure_bundle(&mut tx, bundle_id).await?;
    permissions::require_manage(&mut tx, principal, bundle_id, capability, action).await?;

    let subject = match subject {
        SubjectRef::User(username) => user_subject(&mut tx, username).await?,
        SubjectRef::Group(name) => group_subject(&mut tx, name).await?,
    };

    match action {
        Operation::Revoke => {
            permissions::remove_perm(&mut tx, subject, bundle_id, capability).await?;
        }
        _ => permissions::assign_perm(&mut tx, subject, bundle_id, capability).await?,
    }
    tx.commit().await.map_err(DbError::from)?;

    info!(bundle_id, %subject, %capability, %action, "Changed bundle grant");
    Ok(StatusCode::NO_CONTENT)
}

enum SubjectRef<'a> {
    User(&'a str),
    Group(&'a str),
}

/// The caller's own capability flags on a bundle.
#[utoipa::path(
    get,
    path = "/bundle/{id}/permissions/",
    tag = "permissions",
    summary = "Get own permissions",
    params(
        ("id" = i64, Path, description = "Bundle ID"),
        FormatQuery,
    ),
    responses(
        (status = 200, description = "Capability flags of the caller", body = BundlePermissionsResponse),
        (status = 404, description = "Bundle not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        (),
        ("ApiKeyAuth" = [])
    )
)]
#[tracing::instrument(skip_all, fields(bundle_id = id, principal = %principal))]
pub async fn get_own_permissions(
    State(state): State<AppState>,
    Path(id): Path<BundleId>,
    principal: Principal,
    Query(format): Query<FormatQuery>,
) -> Result<Json<BundlePermissionsResponse>> {
    format.ensure_supported()?;

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    ensure_bundle(&mut conn, id).await?;
    let held = permissions::get_perms(&mut conn, &principal, id).await?;

    Ok(Json(BundlePermissionsResponse {
        bundle: id,
        subject: principal.to_string(),
        permissions: held,
    }))
}

/// Another user's effective capability flags on a bundle. Requires `admin` on the bundle.
#[utoipa::path(
    get,
    path = "/bundle/{id}/permissions/users/{username}/",
    tag = "permissions",
    summary = "Get user permissions",
    params(
        ("id" = i64, Path, description = "Bundle ID"),
        ("username" = String, Path, description = "Username"),
    ),
    responses(
        (status = 200, description = "Capability flags of the user", body = BundlePermissionsResponse),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Caller lacks admin on the bundle"),
        (status = 404, description = "Bundle or user not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("ApiKeyAuth" = [])
    )
)]
#[tracing::instrument(skip_all, fields(bundle_id = id, username = %username))]
pub async fn get_user_permissions(
    State(state): State<AppState>,
    Path((id, username)): Path<(BundleId, String)>,
    principal: Principal,
) -> Result<Json<BundlePermissionsResponse>> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    ensure_bundle(&mut conn, id).await?;
    permissions::require(&mut conn, &principal, id, Capability::Admin, Operation::Read).await?;

    let user: CurrentUser = Users::new(&mut conn)
        .get_user_by_username(&username)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "User".to_string(),
            id: username.clone(),
        })?
        .into();
    let held = permissions::get_user_perms(&mut conn, &user, id).await?;

    Ok(Json(BundlePermissionsResponse {
        bundle: id,
        subject: user.username,
        permissions: held,
    }))
}

/// Capabilities granted to groups on a bundle. Requires `admin` on the bundle.
#[utoipa::path(
    get,
    path = "/bundle/{id}/permissions/groups/",
    tag = "permissions",
    summary = "List group grants",
    params(("id" = i64, Path, description = "Bundle ID")),
    responses(
        (status = 200, description = "Group grants on the bundle", body = Vec<GroupGrantResponse>),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Caller lacks admin on the bundle"),
        (status = 404, description = "Bundle not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("ApiKeyAuth" = [])
    )
)]
#[tracing::instrument(skip_all, fields(bundle_id = id))]
pub async fn list_group_grants(
    State(state): State<AppState>,
    Path(id): Path<BundleId>,
    principal: Principal,
) -> Result<Json<Vec<GroupGrantResponse>>> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    ensure_bundle(&mut conn, id).await?;
    permissions::require(&mut conn, &principal, id, Capability::Admin, Operation::Read).await?;

    let grants = ObjectPermissions::new(&mut conn).group_grants(id).await?;
    let groups = Groups::new(&mut conn)
        .get_bulk(grants.iter().map(|(group_id, _)| *group_id).collect())
        .await?;

    let mut response: Vec<GroupGrantResponse> = grants
        .into_iter()
        .filter_map(|(group_id, capability)| {
            groups.get(&group_id).map(|g| GroupGrantResponse {
                group: g.name.clone(),
                capability,
            })
        })
        .collect();
    response.sort_by(|a, b| (a.group.as_str(), a.capability).cmp(&(b.group.as_str(), b.capability)));

    Ok(Json(response))
}

#[utoipa::path(
    put,
    path = "/bundle/{id}/permissions/users/{username}/{capability}",
    tag = "permissions",
    summary = "Grant capability to user",
    params(
        ("id" = i64, Path, description = "Bundle ID"),
        ("username" = String, Path, description = "Username"),
        ("capability" = String, Path, description = "Capability, e.g. `view` or `view_bundle`"),
    ),
    responses(
        (status = 204, description = "Capability granted"),
        (status = 400, description = "Unknown capability"),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Caller may not manage this capability"),
        (status = 404, description = "Bundle or user not found"),
    ),
    security(
        ("ApiKeyAuth" = [])
    )
)]
#[tracing::instrument(skip_all, fields(bundle_id = id, username = %username, capability = %capability))]
pub async fn grant_user_permission(
    State(state): State<AppState>,
    Path((id, username, capability)): Path<(BundleId, String, String)>,
    principal: Principal,
) -> Result<StatusCode> {
    change_grant(&state, &principal, id, SubjectRef::User(&username), &capability, Operation::Grant).await
}

#[utoipa::path(
    delete,
    path = "/bundle/{id}/permissions/users/{username}/{capability}",
    tag = "permissions",
    summary = "Revoke capability from user",
    params(
        ("id" = i64, Path, description = "Bundle ID"),
        ("username" = String, Path, description = "Username"),
        ("capability" = String, Path, description = "Capability, e.g. `view` or `view_bundle`"),
    ),
    responses(
        (status = 204, description = "Capability revoked"),
        (status = 400, description = "Unknown capability"),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Caller may not manage this capability"),
        (status = 404, description = "Bundle or user not found"),
    ),
    security(
        ("ApiKeyAuth" = [])
    )
)]
#[tracing::instrument(skip_all, fields(bundle_id = id, username = %username, capability = %capability))]
pub async fn revoke_user_permission(
    State(state): State<AppState>,
    Path((id, username, capability)): Path<(BundleId, String, String)>,
    principal: Principal,
) -> Result<StatusCode> {
    change_grant(&state, &principal, id, SubjectRef::User(&username), &capability, Operation::Revoke).await
}

#[utoipa::path(
    put,
    path = "/bundle/{id}/permissions/groups/{group}/{capability}",
    tag = "permissions",
    summary = "Grant capability to group",
    description = "Grant a capability to every member of a group. Use the `public` group to share with everyone, including anonymous callers.",
    params(
        ("id" = i64, Path, description = "Bundle ID"),
        ("group" = String, Path, description = "Group name"),
        ("capability" = String, Path, description = "Capability, e.g. `view` or `view_bundle`"),
    ),
    responses(
        (status = 204, description = "Capability granted"),
        (status = 400, description = "Unknown capability"),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Caller may not manage this capability"),
        (status = 404, description = "Bundle or group not found"),
    ),
    security(
        ("ApiKeyAuth" = [])
    )
)]
#[tracing::instrument(skip_all, fields(bundle_id = id, group = %group, capability = %capability))]
pub async fn grant_group_permission(
    State(state): State<AppState>,
    Path((id, group, capability)): Path<(BundleId, String, String)>,
    principal: Principal,
) -> Result<StatusCode> {
    change_grant(&state, &principal, id, SubjectRef::Group(&group), &capability, Operation::Grant).await
}

#[utoipa::path(
    delete,
    path = "/bundle/{id}/permissions/groups/{group}/{capability}",
    tag = "permissions",
    summary = "Revoke capability from group",
    params(
        ("id" = i64, Path, description = "Bundle ID"),
        ("group" = String, Path, description = "Group name"),
        ("capability" = String, Path, description = "Capability, e.g. `view` or `view_bundle`"),
    ),
    responses(
        (status = 204, description = "Capability revoked"),
        (status = 400, description = "Unknown capability"),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Caller may not manage this capability"),
        (status = 404, description = "Bundle or group not found"),
    ),
    security(
        ("ApiKeyAuth" = [])
    )
)]
#[tracing::instrument(skip_all, fields(bundle_id = id, group = %group, capability = %capability))]
pub async fn revoke_group_permission(
    State(state): State<AppState>,
    Path((id, group, capability)): Path<(BundleId, String, String)>,
    principal: Principal,
) -> Result<StatusCode> {
    change_grant(&state, &principal, id, SubjectRef::Group(&group), &capability, Operation::Revoke).await
}

#[cfg(test)]
mod tests {
    use crate::api::models::permissions::{BundlePermissionsResponse, GroupGrantResponse};
    use crate::test_utils::{api_key_header, create_bundle, create_test_app, create_test_user};
    use crate::types::Capability;
    use axum::http::StatusCode;

    #[test_log::test(tokio::test)]
    async fn test_own_permissions_for_owner_and_anonymous() {
        let (server, pool) = create_test_app().await;
        let (_, key) = create_test_user(&pool, "alice", false).await;
        let id = create_bundle(&server, "alice", &key).await;

        let mine: BundlePermissionsResponse = server
            .get(&format!("/api/v0/bundle/{id}/permissions/"))
            .add_header("authorization", api_key_header("alice", &key))
            .await
            .json();
        assert_eq!(mine.subject, "alice");
        assert!(mine.permissions.admin && mine.permissions.ownership);

        let anonymous: BundlePermissionsResponse = server.get(&format!("/api/v0/bundle/{id}/permissions")).await.json();
        assert_eq!(anonymous.subject, "anonymous");
        assert!(anonymous.permissions.is_empty());

        server
            .get("/api/v0/bundle/9999/permissions/")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[test_log::test(tokio::test)]
    async fn test_grant_user_capability() {
        let (server, pool) = create_test_app().await;
        let (_, owner_key) = create_test_user(&pool, "owner", false).await;
        let (_, other_key) = create_test_user(&pool, "other", false).await;
        let id = create_bundle(&server, "owner", &owner_key).await;

        // Non-admins cannot grant
        server
            .put(&format!("/api/v0/bundle/{id}/permissions/users/other/view"))
            .add_header("authorization", api_key_header("other", &other_key))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        server
            .put(&format!("/api/v0/bundle/{id}/permissions/users/other/change_bundle"))
            .add_header("authorization", api_key_header("owner", &owner_key))
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let theirs: BundlePermissionsResponse = server
            .get(&format!("/api/v0/bundle/{id}/permissions/users/other/"))
            .add_header("authorization", api_key_header("owner", &owner_key))
            .await
            .json();
        assert!(theirs.permissions.change);
        assert!(!theirs.permissions.view);

        server
            .get(&format!("/api/v0/bundle/{id}/permissions/users/other/"))
            .add_header("authorization", api_key_header("other", &other_key))
            .await
            .assert_status(StatusCode::FORBIDDEN);

        server
            .put(&format!("/api/v0/bundle/{id}/permissions/users/other/fly"))
            .add_header("authorization", api_key_header("owner", &owner_key))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
        server
            .put(&format!("/api/v0/bundle/{id}/permissions/users/nobody/view"))
            .add_header("authorization", api_key_header("owner", &owner_key))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[test_log::test(tokio::test)]
    async fn test_admin_delegate_cannot_hand_out_ownership() {
        let (server, pool) = create_test_app().await;
        let (_, owner_key) = create_test_user(&pool, "owner", false).await;
        let (_, delegate_key) = create_test_user(&pool, "delegate", false).await;
        create_test_user(&pool, "third", false).await;
        let id = create_bundle(&server, "owner", &owner_key).await;

        server
            .put(&format!("/api/v0/bundle/{id}/permissions/users/delegate/admin"))
            .add_header("authorization", api_key_header("owner", &owner_key))
            .await
            .assert_status(StatusCode::NO_CONTENT);

        server
            .put(&format!("/api/v0/bundle/{id}/permissions/users/third/view"))
            .add_header("authorization", api_key_header("delegate", &delegate_key))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .put(&format!("/api/v0/bundle/{id}/permissions/users/third/ownership"))
            .add_header("authorization", api_key_header("delegate", &delegate_key))
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }

    #[test_log::test(tokio::test)]
    async fn test_group_grants_listing() {
        let (server, pool) = create_test_app().await;
        let (_, key) = create_test_user(&pool, "owner", false).await;
        let id = create_bundle(&server, "owner", &key).await;

        server
            .put(&format!("/api/v0/bundle/{id}/permissions/groups/public/view"))
            .add_header("authorization", api_key_header("owner", &key))
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let grants: Vec<GroupGrantResponse> = server
            .get(&format!("/api/v0/bundle/{id}/permissions/groups/"))
            .add_header("authorization", api_key_header("owner", &key))
            .await
            .json();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].group, "public");
        assert_eq!(grants[0].capability, Capability::View);

        server
            .delete(&format!("/api/v0/bundle/{id}/permissions/groups/nosuchgroup/view"))
            .add_header("authorization", api_key_header("owner", &key))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
