use crate::{
    AppState,
    api::models::{
        groups::{GroupCreate, GroupResponse, ListGroupsQuery},
        pagination::ListResponse,
        users::CurrentUser,
    },
    auth::permissions::require_admin,
    db::{
        errors::DbError,
        handlers::{Groups, Repository, Users, groups::GroupFilter},
        models::groups::GroupCreateDBRequest,
    },
    errors::{Error, Result},
    types::{GroupId, Operation, UserId},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use sqlx::SqliteConnection;

async fn group_id_by_name(conn: &mut SqliteConnection, name: &str) -> Result<GroupId> {
    Groups::new(conn)
        .get_by_name(name)
        .await?
        .map(|g| g.id)
        .ok_or_else(|| Error::NotFound {
            resource: "Group".to_string(),
            id: name.to_string(),
        })
}

async fn user_id_by_name(conn: &mut SqliteConnection, username: &str) -> Result<UserId> {
    Users::new(conn)
        .get_user_by_username(username)
        .await?
        .map(|u| u.id)
        .ok_or_else(|| Error::NotFound {
            resource: "User".to_string(),
            id: username.to_string(),
        })
}

#[utoipa::path(
    get,
    path = "/groups",
    tag = "groups",
    summary = "List groups",
    params(ListGroupsQuery),
    responses(
        (status = 200, description = "Paginated list of groups", body = ListResponse<GroupResponse>),
        (status = 401, description = "Authentication required"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("ApiKeyAuth" = [])
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_groups(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(query): Query<ListGroupsQuery>,
) -> Result<Json<ListResponse<GroupResponse>>> {
    let (offset, limit) = query.pagination.params();

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Groups::new(&mut conn);
    let total_count = repo.count().await?;
    let groups = repo.list(&GroupFilter::new(offset, limit)).await?;

    Ok(Json(ListResponse::new(
        groups.into_iter().map(GroupResponse::from).collect(),
        total_count,
        offset,
        limit,
    )))
}

#[utoipa::path(
    post,
    path = "/groups",
    tag = "groups",
    summary = "Create group",
    request_body = GroupCreate,
    responses(
        (status = 201, description = "Group created", body = GroupResponse),
        (status = 400, description = "Invalid group name"),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Administrator privileges required"),
        (status = 409, description = "A group with this name already exists"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("ApiKeyAuth" = [])
    )
)]
#[tracing::instrument(skip_all, fields(name = %data.name))]
pub async fn create_group(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(data): Json<GroupCreate>,
) -> Result<(StatusCode, Json<GroupResponse>)> {
    require_admin(&current_user, Operation::Create, "groups")?;

    let name = data.name.trim();
    if name.is_empty() {
        return Err(Error::BadRequest {
            message: "Group name cannot be empty".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let group = Groups::new(&mut conn)
        .create(&GroupCreateDBRequest {
            name: name.to_string(),
            description: data.description,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(GroupResponse::from(group))))
}

#[utoipa::path(
    get,
    path = "/groups/{name}",
    tag = "groups",
    summary = "Get group",
    params(("name" = String, Path, description = "Group name")),
    responses(
        (status = 200, description = "Group with its members", body = GroupResponse),
        (status = 401, description = "Authentication required"),
        (status = 404, description = "Group not found"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("ApiKeyAuth" = [])
    )
)]
#[tracing::instrument(skip_all, fields(name = %name))]
pub async fn get_group(
    State(state): State<AppState>,
    Path(name): Path<String>,
    _current_user: CurrentUser,
) -> Result<Json<GroupResponse>> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Groups::new(&mut conn);
    let group = repo.get_by_name(&name).await?.ok_or_else(|| Error::NotFound {
        resource: "Group".to_string(),
        id: name.clone(),
    })?;
    let members = repo.get_group_users(group.id).await?;

    Ok(Json(GroupResponse::from(group).with_members(members)))
}

#[utoipa::path(
    delete,
    path = "/groups/{name}",
    tag = "groups",
    summary = "Delete group",
    params(("name" = String, Path, description = "Group name")),
    responses(
        (status = 204, description = "Group deleted"),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Administrator privileges required, or the group is protected"),
        (status = 404, description = "Group not found"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("ApiKeyAuth" = [])
    )
)]
#[tracing::instrument(skip_all, fields(name = %name))]
pub async fn delete_group(State(state): State<AppState>, Path(name): Path<String>, current_user: CurrentUser) -> Result<StatusCode> {
    require_admin(&current_user, Operation::Delete, &format!("group {name}"))?;

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let group_id = group_id_by_name(&mut conn, &name).await?;
    if !Groups::new(&mut conn).delete(group_id).await? {
        return Err(Error::NotFound {
            resource: "Group".to_string(),
            id: name,
        });
    }

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/groups/{name}/users/{username}",
    tag = "groups",
    summary = "Add user to group",
    params(
        ("name" = String, Path, description = "Group name"),
        ("username" = String, Path, description = "Username"),
    ),
    responses(
        (status = 204, description = "User is a member"),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Administrator privileges required"),
        (status = 404, description = "Group or user not found"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("ApiKeyAuth" = [])
    )
)]
#[tracing::instrument(skip_all, fields(name = %name, username = %username))]
pub async fn add_user_to_group(
    State(state): State<AppState>,
    Path((name, username)): Path<(String, String)>,
    current_user: CurrentUser,
) -> Result<StatusCode> {
    require_admin(&current_user, Operation::Update, &format!("group {name}"))?;

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let group_id = group_id_by_name(&mut conn, &name).await?;
    let user_id = user_id_by_name(&mut conn, &username).await?;
    Groups::new(&mut conn).add_user_to_group(user_id, group_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/groups/{name}/users/{username}",
    tag = "groups",
    summary = "Remove user from group",
    params(
        ("name" = String, Path, description = "Group name"),
        ("username" = String, Path, description = "Username"),
    ),
    responses(
        (status = 204, description = "User removed"),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Administrator privileges required, or the group is the public group"),
        (status = 404, description = "Group, user or membership not found"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("ApiKeyAuth" = [])
    )
)]
#[tracing::instrument(skip_all, fields(name = %name, username = %username))]
pub async fn remove_user_from_group(
    State(state): State<AppState>,
    Path((name, username)): Path<(String, String)>,
    current_user: CurrentUser,
) -> Result<StatusCode> {
    require_admin(&current_user, Operation::Update, &format!("group {name}"))?;

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let group_id = group_id_by_name(&mut conn, &name).await?;
    let user_id = user_id_by_name(&mut conn, &username).await?;
    Groups::new(&mut conn).remove_user_from_group(user_id, group_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
