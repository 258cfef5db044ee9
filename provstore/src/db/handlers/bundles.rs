//! Database repository for provenance bundles.

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::bundles::{BundleCreateDBRequest, BundleDBResponse, BundleUpdateDBRequest},
};
use crate::types::{BundleId, Capability, PUBLIC_GROUP_ID, UserId};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, types::Json};
use std::collections::HashMap;
use tracing::instrument;

/// Which bundles a listing may return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Every bundle (superusers)
    All,
    /// Bundles the public group can view (anonymous callers)
    Public,
    /// Bundles the user can view directly or through any of their groups
    User(UserId),
}

/// Filter for listing bundles
#[derive(Debug, Clone)]
pub struct BundleFilter {
    pub skip: i64,
    pub limit: i64,
    pub visibility: Visibility,
}

impl BundleFilter {
    pub fn new(skip: i64, limit: i64, visibility: Visibility) -> Self {
        Self { skip, limit, visibility }
    }
}

#[derive(Debug, Clone, FromRow)]
struct Bundle {
    pub id: BundleId,
    pub rec_id: String,
    pub owner_id: UserId,
    pub owner_username: String,
    pub content: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Bundle> for BundleDBResponse {
    fn from(bundle: Bundle) -> Self {
        Self {
            id: bundle.id,
            rec_id: bundle.rec_id,
            owner_id: bundle.owner_id,
            owner_username: bundle.owner_username,
            content: bundle.content.0,
            created_at: bundle.created_at,
            updated_at: bundle.updated_at,
        }
    }
}

const SELECT_BUNDLES: &str = r#"
    SELECT b.id, b.rec_id, b.owner_id, u.username AS owner_username, b.content, b.created_at, b.updated_at
    FROM bundles b
    INNER JOIN users u ON u.id = b.owner_id
"#;

/// Append the `WHERE` clause restricting rows to what the visibility allows
fn push_visibility(query: &mut QueryBuilder<'_, Sqlite>, visibility: Visibility) {
    match visibility {
        Visibility::All => {}
        Visibility::Public => {
            query
                .push(" WHERE b.id IN (SELECT bundle_id FROM bundle_group_permissions WHERE capability = ")
                .push_bind(Capability::View)
                .push(" AND group_id = ")
                .push_bind(PUBLIC_GROUP_ID)
                .push(")");
        }
        Visibility::User(user_id) => {
            query
                .push(" WHERE b.id IN (SELECT bundle_id FROM bundle_user_permissions WHERE capability = ")
                .push_bind(Capability::View)
                .push(" AND user_id = ")
                .push_bind(user_id)
                .push(") OR b.id IN (SELECT bundle_id FROM bundle_group_permissions WHERE capability = ")
                .push_bind(Capability::View)
                .push(" AND (group_id = ")
                .push_bind(PUBLIC_GROUP_ID)
                .push(" OR group_id IN (SELECT group_id FROM user_groups WHERE user_id = ")
                .push_bind(user_id)
                .push(")))");
        }
    }
}

pub struct Bundles<'c> {
    db: &'c mut SqliteConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Bundles<'c> {
    type CreateRequest = BundleCreateDBRequest;
    type UpdateRequest = BundleUpdateDBRequest;
    type Response = BundleDBResponse;
    type Id = BundleId;
    type Filter = BundleFilter;

    #[instrument(skip(self, request), fields(rec_id = %request.rec_id), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let now = Utc::now();
        let id: BundleId = sqlx::query_scalar(
            "INSERT INTO bundles (rec_id, owner_id, content, created_at, updated_at) VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&request.rec_id)
        .bind(request.owner_id)
        .bind(Json(&request.content))
        .bind(now)
        .bind(now)
        .fetch_one(&mut *self.db)
        .await?;

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }

    #[instrument(skip(self), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let bundle = sqlx::query_as::<_, Bundle>(&format!("{SELECT_BUNDLES} WHERE b.id = ?"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(bundle.map(BundleDBResponse::from))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<BundleId>) -> Result<HashMap<BundleId, BundleDBResponse>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(SELECT_BUNDLES);
        query.push(" WHERE b.id IN (");
        let mut separated = query.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let bundles = query.build_query_as::<Bundle>().fetch_all(&mut *self.db).await?;

        Ok(bundles.into_iter().map(|b| (b.id, BundleDBResponse::from(b))).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::<Sqlite>::new(SELECT_BUNDLES);
        push_visibility(&mut query, filter.visibility);
        query
            .push(" ORDER BY b.id LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.skip);

        let bundles = query.build_query_as::<Bundle>().fetch_all(&mut *self.db).await?;

        Ok(bundles.into_iter().map(BundleDBResponse::from).collect())
    }

    /// Grants go with the bundle through `ON DELETE CASCADE`.
    #[instrument(skip(self), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM bundles WHERE id = ?")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let result = sqlx::query("UPDATE bundles SET rec_id = ?, content = ?, updated_at = ? WHERE id = ?")
            .bind(&request.rec_id)
            .bind(Json(&request.content))
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }
}

impl<'c> Bundles<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &BundleFilter) -> Result<i64> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM bundles b");
        push_visibility(&mut query, filter.visibility);

        let count: i64 = query.build_query_scalar().fetch_one(&mut *self.db).await?;

        Ok(count)
    }

    #[instrument(skip(self), err)]
    pub async fn exists(&mut self, id: BundleId) -> Result<bool> {
        let found: Option<BundleId> = sqlx::query_scalar("SELECT id FROM bundles WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(found.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::handlers::{Groups, ObjectPermissions, Users};
    use crate::db::models::{groups::GroupCreateDBRequest, users::UserCreateDBRequest};
    use crate::test_utils::create_test_pool;
    use crate::types::Subject;
    use serde_json::json;

    async fn create_user(conn: &mut SqliteConnection, username: &str) -> UserId {
        Users::new(conn)
            .create(&UserCreateDBRequest {
                username: username.to_string(),
                email: None,
                password_hash: None,
                is_admin: false,
            })
            .await
            .unwrap()
            .id
    }

    fn mockup(owner_id: UserId) -> BundleCreateDBRequest {
        BundleCreateDBRequest {
            rec_id: "#mockup".to_string(),
            owner_id,
            content: json!({"entity": {"ex:e1": {}}}),
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_create_get_update_delete() {
        let pool = create_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let owner = create_user(&mut conn, "owner").await;

        let mut bundles = Bundles::new(&mut conn);
        let created = bundles.create(&mockup(owner)).await.unwrap();
        assert_eq!(created.rec_id, "#mockup");
        assert_eq!(created.owner_username, "owner");
        assert_eq!(created.content, json!({"entity": {"ex:e1": {}}}));

        let updated = bundles
            .update(
                created.id,
                &BundleUpdateDBRequest {
                    rec_id: "#revised".to_string(),
                    content: json!({"agent": {}}),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.rec_id, "#revised");
        assert_eq!(updated.content, json!({"agent": {}}));

        assert!(bundles.delete(created.id).await.unwrap());
        assert!(bundles.get_by_id(created.id).await.unwrap().is_none());
        assert!(!bundles.exists(created.id).await.unwrap());
        assert!(matches!(
            bundles
                .update(
                    created.id,
                    &BundleUpdateDBRequest {
                        rec_id: "#gone".to_string(),
                        content: json!({}),
                    }
                )
                .await,
            Err(DbError::NotFound)
        ));
    }

    #[test_log::test(tokio::test)]
    async fn test_listing_respects_visibility() {
        let pool = create_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let owner = create_user(&mut conn, "owner").await;
        let member = create_user(&mut conn, "member").await;
        let stranger = create_user(&mut conn, "stranger").await;

        let curators = Groups::new(&mut conn)
            .create(&GroupCreateDBRequest {
                name: "curators".to_string(),
                description: None,
            })
            .await
            .unwrap();
        Groups::new(&mut conn).add_user_to_group(member, curators.id).await.unwrap();

        let (private, shared, public) = {
            let mut bundles = Bundles::new(&mut conn);
            (
                bundles.create(&mockup(owner)).await.unwrap(),
                bundles.create(&mockup(owner)).await.unwrap(),
                bundles.create(&mockup(owner)).await.unwrap(),
            )
        };

        let mut perms = ObjectPermissions::new(&mut conn);
        for bundle in [&private, &shared, &public] {
            perms.assign(bundle.id, Subject::User(owner), Capability::View).await.unwrap();
        }
        perms.assign(shared.id, Subject::Group(curators.id), Capability::View).await.unwrap();
        perms.assign(public.id, Subject::Group(PUBLIC_GROUP_ID), Capability::View).await.unwrap();
        // Change without view does not make a bundle listable
        perms.assign(private.id, Subject::User(stranger), Capability::Change).await.unwrap();

        let mut bundles = Bundles::new(&mut conn);
        let ids = |v: Vec<BundleDBResponse>| v.into_iter().map(|b| b.id).collect::<Vec<_>>();

        let all = bundles.list(&BundleFilter::new(0, 100, Visibility::All)).await.unwrap();
        assert_eq!(ids(all), vec![private.id, shared.id, public.id]);

        let anon = bundles.list(&BundleFilter::new(0, 100, Visibility::Public)).await.unwrap();
        assert_eq!(ids(anon), vec![public.id]);

        let member_view = bundles.list(&BundleFilter::new(0, 100, Visibility::User(member))).await.unwrap();
        assert_eq!(ids(member_view), vec![shared.id, public.id]);

        let stranger_filter = BundleFilter::new(0, 100, Visibility::User(stranger));
        assert_eq!(ids(bundles.list(&stranger_filter).await.unwrap()), vec![public.id]);
        assert_eq!(bundles.count(&stranger_filter).await.unwrap(), 1);

        let owner_filter = BundleFilter::new(1, 1, Visibility::User(owner));
        assert_eq!(ids(bundles.list(&owner_filter).await.unwrap()), vec![shared.id]);
        assert_eq!(bundles.count(&owner_filter).await.unwrap(), 3);

        let bulk = bundles.get_bulk(vec![private.id, public.id, 9999]).await.unwrap();
        assert_eq!(bulk.len(), 2);
    }
}
