//! Database repository for object-level grants on bundles.
//!
//! A grant attaches one [`Capability`] on one bundle to a [`Subject`]. Grants are stored in two
//! tables, one per subject kind, and are removed together with their bundle.

use crate::db::errors::Result;
use crate::types::{BundleId, Capability, GroupId, PUBLIC_GROUP_ID, Subject, UserId};
use sqlx::SqliteConnection;
use std::collections::BTreeSet;
use tracing::instrument;

pub struct ObjectPermissions<'c> {
    db: &'c mut SqliteConnection,
}

impl<'c> ObjectPermissions<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    /// Grant a capability. Granting something already held is a no-op.
    #[instrument(skip(self), fields(subject = %subject, capability = %capability), err)]
    pub async fn assign(&mut self, bundle_id: BundleId, subject: Subject, capability: Capability) -> Result<()> {
        let query = match subject {
            Subject::User(user_id) => sqlx::query(
                "INSERT INTO bundle_user_permissions (bundle_id, user_id, capability) VALUES (?, ?, ?) ON CONFLICT DO NOTHING",
            )
            .bind(bundle_id)
            .bind(user_id),
            Subject::Group(group_id) => sqlx::query(
                "INSERT INTO bundle_group_permissions (bundle_id, group_id, capability) VALUES (?, ?, ?) ON CONFLICT DO NOTHING",
            )
            .bind(bundle_id)
            .bind(group_id),
        };

        query.bind(capability).execute(&mut *self.db).await?;

        Ok(())
    }

    /// Revoke a capability. Returns false if the subject did not hold it.
    #[instrument(skip(self), fields(subject = %subject, capability = %capability), err)]
    pub async fn remove(&mut self, bundle_id: BundleId, subject: Subject, capability: Capability) -> Result<bool> {
        let query = match subject {
            Subject::User(user_id) => {
                sqlx::query("DELETE FROM bundle_user_permissions WHERE bundle_id = ? AND user_id = ? AND capability = ?")
                    .bind(bundle_id)
                    .bind(user_id)
            }
            Subject::Group(group_id) => {
                sqlx::query("DELETE FROM bundle_group_permissions WHERE bundle_id = ? AND group_id = ? AND capability = ?")
                    .bind(bundle_id)
                    .bind(group_id)
            }
        };

        let result = query.bind(capability).execute(&mut *self.db).await?;

        Ok(result.rows_affected() > 0)
    }

    /// Capabilities granted directly to the subject, ignoring any group overlay.
    #[instrument(skip(self), fields(subject = %subject), err)]
    pub async fn direct_capabilities(&mut self, bundle_id: BundleId, subject: Subject) -> Result<BTreeSet<Capability>> {
        let capabilities: Vec<Capability> = match subject {
            Subject::User(user_id) => {
                sqlx::query_scalar("SELECT capability FROM bundle_user_permissions WHERE bundle_id = ? AND user_id = ?")
                    .bind(bundle_id)
                    .bind(user_id)
                    .fetch_all(&mut *self.db)
                    .await?
            }
            Subject::Group(group_id) => {
                sqlx::query_scalar("SELECT capability FROM bundle_group_permissions WHERE bundle_id = ? AND group_id = ?")
                    .bind(bundle_id)
                    .bind(group_id)
                    .fetch_all(&mut *self.db)
                    .await?
            }
        };

        Ok(capabilities.into_iter().collect())
    }

    /// Union of the user's direct grants, grants on their groups and grants on the public group.
    #[instrument(skip(self), err)]
    pub async fn user_capabilities(&mut self, bundle_id: BundleId, user_id: UserId) -> Result<BTreeSet<Capability>> {
        let capabilities: Vec<Capability> = sqlx::query_scalar(
            r#"
            SELECT capability FROM bundle_user_permissions
            WHERE bundle_id = ? AND user_id = ?
            UNION
            SELECT capability FROM bundle_group_permissions
            WHERE bundle_id = ?
              AND (group_id = ? OR group_id IN (SELECT group_id FROM user_groups WHERE user_id = ?))
            "#,
        )
        .bind(bundle_id)
        .bind(user_id)
        .bind(bundle_id)
        .bind(PUBLIC_GROUP_ID)
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(capabilities.into_iter().collect())
    }

    /// Grants the public group holds, which is everything an anonymous caller holds.
    pub async fn public_capabilities(&mut self, bundle_id: BundleId) -> Result<BTreeSet<Capability>> {
        self.direct_capabilities(bundle_id, Subject::Group(PUBLIC_GROUP_ID)).await
    }

    #[instrument(skip(self), err)]
    pub async fn group_grants(&mut self, bundle_id: BundleId) -> Result<Vec<(GroupId, Capability)>> {
        let grants = sqlx::query_as::<_, (GroupId, Capability)>(
            "SELECT group_id, capability FROM bundle_group_permissions WHERE bundle_id = ? ORDER BY group_id, capability",
        )
        .bind(bundle_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(grants)
    }

    /// Drop every grant on the bundle and return how many rows went. Bundle deletion runs this
    /// first so the removed grants can be reported; the cascade covers any other delete path.
    #[instrument(skip(self), err)]
    pub async fn clear(&mut self, bundle_id: BundleId) -> Result<u64> {
        let users = sqlx::query("DELETE FROM bundle_user_permissions WHERE bundle_id = ?")
            .bind(bundle_id)
            .execute(&mut *self.db)
            .await?;
        let groups = sqlx::query("DELETE FROM bundle_group_permissions WHERE bundle_id = ?")
            .bind(bundle_id)
            .execute(&mut *self.db)
            .await?;

        Ok(users.rows_affected() + groups.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::handlers::{Bundles, Groups, Repository, Users};
    use crate::db::models::{bundles::BundleCreateDBRequest, groups::GroupCreateDBRequest, users::UserCreateDBRequest};
    use crate::test_utils::create_test_pool;
    use serde_json::json;

    async fn setup(conn: &mut SqliteConnection) -> (UserId, UserId, BundleId) {
        let mut users = Users::new(conn);
        let mut request = UserCreateDBRequest {
            username: "owner".to_string(),
            email: None,
            password_hash: None,
            is_admin: false,
        };
        let owner = users.create(&request).await.unwrap().id;
        request.username = "other".to_string();
        let other = users.create(&request).await.unwrap().id;

        let bundle = Bundles::new(conn)
            .create(&BundleCreateDBRequest {
                rec_id: "#mockup".to_string(),
                owner_id: owner,
                content: json!({}),
            })
            .await
            .unwrap();

        (owner, other, bundle.id)
    }

    #[test_log::test(tokio::test)]
    async fn test_assign_and_remove_are_idempotent() {
        let pool = create_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let (owner, _, bundle_id) = setup(&mut conn).await;

        let mut perms = ObjectPermissions::new(&mut conn);
        perms.assign(bundle_id, Subject::User(owner), Capability::View).await.unwrap();
        perms.assign(bundle_id, Subject::User(owner), Capability::View).await.unwrap();
        assert_eq!(
            perms.direct_capabilities(bundle_id, Subject::User(owner)).await.unwrap(),
            BTreeSet::from([Capability::View])
        );

        assert!(perms.remove(bundle_id, Subject::User(owner), Capability::View).await.unwrap());
        assert!(!perms.remove(bundle_id, Subject::User(owner), Capability::View).await.unwrap());
        assert!(perms.direct_capabilities(bundle_id, Subject::User(owner)).await.unwrap().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_user_capabilities_union_groups_and_public() {
        let pool = create_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let (owner, other, bundle_id) = setup(&mut conn).await;

        let editors = Groups::new(&mut conn)
            .create(&GroupCreateDBRequest {
                name: "editors".to_string(),
                description: None,
            })
            .await
            .unwrap();
        Groups::new(&mut conn).add_user_to_group(other, editors.id).await.unwrap();

        let mut perms = ObjectPermissions::new(&mut conn);
        perms.assign(bundle_id, Subject::User(owner), Capability::Delete).await.unwrap();
        perms.assign(bundle_id, Subject::Group(editors.id), Capability::Change).await.unwrap();
        perms.assign(bundle_id, Subject::Group(PUBLIC_GROUP_ID), Capability::View).await.unwrap();

        assert_eq!(
            perms.user_capabilities(bundle_id, owner).await.unwrap(),
            BTreeSet::from([Capability::View, Capability::Delete])
        );
        assert_eq!(
            perms.user_capabilities(bundle_id, other).await.unwrap(),
            BTreeSet::from([Capability::View, Capability::Change])
        );
        assert_eq!(
            perms.public_capabilities(bundle_id).await.unwrap(),
            BTreeSet::from([Capability::View])
        );
        assert_eq!(perms.group_grants(bundle_id).await.unwrap().len(), 2);

        assert_eq!(perms.clear(bundle_id).await.unwrap(), 3);
        assert!(perms.user_capabilities(bundle_id, other).await.unwrap().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_grants_removed_with_bundle() {
        let pool = create_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let (owner, _, bundle_id) = setup(&mut conn).await;

        ObjectPermissions::new(&mut conn)
            .assign(bundle_id, Subject::User(owner), Capability::Ownership)
            .await
            .unwrap();
        assert!(Bundles::new(&mut conn).delete(bundle_id).await.unwrap());

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bundle_user_permissions")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
