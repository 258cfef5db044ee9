//! Object-level authorization for bundles.
//!
//! Every bundle carries five capabilities ([`Capability::ALL`]). A principal's effective set on
//! a bundle is:
//!
//! - every capability, for active administrators;
//! - nothing, for inactive users;
//! - for other users, the union of direct grants, grants on any group they belong to and grants
//!   on the public group;
//! - for anonymous callers, grants on the public group only.
//!
//! Capabilities are independent and additive. Holding `change` says nothing about `view`, and
//! `ownership` is just another grantable capability. Group grants can only add capabilities.
//!
//! Handlers call [`require`] before touching a bundle:
//!
//! ```ignore
//! async fn get_bundle(State(state): State<AppState>, principal: Principal, Path(id): Path<BundleId>) -> Result<...> {
//!     let mut conn = state.db.acquire().await.map_err(DbError::from)?;
//!     permissions::require(&mut conn, &principal, id, Capability::View, Operation::Read).await?;
//!     // ...
//! }
//! ```

use crate::{
    api::models::users::CurrentUser,
    db::handlers::ObjectPermissions,
    errors::{Error, Result},
    types::{BundleId, Capability, CapabilitySet, Operation, Principal, Subject, UserId},
};
use sqlx::SqliteConnection;
use tracing::instrument;

/// The effective capability flags a user record holds on a bundle.
#[instrument(skip(conn, user), fields(user = %user.username), err)]
pub async fn get_user_perms(conn: &mut SqliteConnection, user: &CurrentUser, bundle_id: BundleId) -> Result<CapabilitySet> {
    if !user.is_active {
        return Ok(CapabilitySet::none());
    }
    if user.is_admin {
        return Ok(CapabilitySet::all());
    }

    let capabilities = ObjectPermissions::new(conn).user_capabilities(bundle_id, user.id).await?;
    Ok(capabilities.into_iter().collect())
}

/// The effective capability flags a principal holds on a bundle.
pub async fn get_perms(conn: &mut SqliteConnection, principal: &Principal, bundle_id: BundleId) -> Result<CapabilitySet> {
    match principal {
        Principal::User(user) => get_user_perms(conn, user, bundle_id).await,
        Principal::Anonymous => {
            let capabilities = ObjectPermissions::new(conn).public_capabilities(bundle_id).await?;
            Ok(capabilities.into_iter().collect())
        }
    }
}

pub async fn has_perm(conn: &mut SqliteConnection, principal: &Principal, bundle_id: BundleId, capability: Capability) -> Result<bool> {
    Ok(get_perms(conn, principal, bundle_id).await?.contains(capability))
}

/// Fail unless the principal holds `capability` on the bundle.
///
/// Anonymous callers get `Unauthenticated` (401) so clients know to retry with credentials;
/// authenticated callers get `InsufficientPermissions` (403).
#[instrument(skip(conn, principal), fields(principal = %principal), err)]
pub async fn require(
    conn: &mut SqliteConnection,
    principal: &Principal,
    bundle_id: BundleId,
    capability: Capability,
    action: Operation,
) -> Result<()> {
    if has_perm(conn, principal, bundle_id, capability).await? {
        return Ok(());
    }

    Err(denied(principal, bundle_id, capability, action))
}

/// The error for a principal lacking `capability` on a bundle.
pub fn denied(principal: &Principal, bundle_id: BundleId, capability: Capability, action: Operation) -> Error {
    match principal {
        Principal::Anonymous => Error::Unauthenticated {
            message: Some(format!("Authentication required to {action} bundle {bundle_id}")),
        },
        Principal::User(_) => Error::InsufficientPermissions {
            required: capability,
            action,
            resource: format!("bundle {bundle_id}"),
        },
    }
}

/// Fail unless the user is an administrator.
pub fn require_admin(user: &CurrentUser, action: Operation, resource: &str) -> Result<()> {
    if user.is_admin {
        Ok(())
    } else {
        Err(Error::AdminRequired {
            action,
            resource: resource.to_string(),
        })
    }
}

pub async fn assign_perm(conn: &mut SqliteConnection, subject: Subject, bundle_id: BundleId, capability: Capability) -> Result<()> {
    ObjectPermissions::new(conn).assign(bundle_id, subject, capability).await?;
    Ok(())
}

/// Returns false if the subject did not hold the capability directly.
pub async fn remove_perm(conn: &mut SqliteConnection, subject: Subject, bundle_id: BundleId, capability: Capability) -> Result<bool> {
    Ok(ObjectPermissions::new(conn).remove(bundle_id, subject, capability).await?)
}

/// Grant every capability on a new bundle to its creator.
#[instrument(skip(conn), err)]
pub async fn assign_owner(conn: &mut SqliteConnection, owner_id: UserId, bundle_id: BundleId) -> Result<()> {
    let mut permissions = ObjectPermissions::new(conn);
    for capability in Capability::ALL {
        permissions.assign(bundle_id, Subject::User(owner_id), capability).await?;
    }
    Ok(())
}

/// Fail unless the principal may grant or revoke `capability` on the bundle.
///
/// Managing grants needs `admin`; handing out or taking away `ownership` additionally needs
/// `ownership`.
pub async fn require_manage(
    conn: &mut SqliteConnection,
    principal: &Principal,
    bundle_id: BundleId,
    capability: Capability,
    action: Operation,
) -> Result<()> {
    let held = get_perms(conn, principal, bundle_id).await?;
    for &needed in manage_requirements(capability) {
        if !held.contains(needed) {
            return Err(denied(principal, bundle_id, needed, action));
        }
    }
    Ok(())
}

fn manage_requirements(capability: Capability) -> &'static [Capability] {
    match capability {
        Capability::Ownership => &[Capability::Admin, Capability::Ownership],
        _ => &[Capability::Admin],
    }
}
