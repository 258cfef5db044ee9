//! Repository implementations for database access.
//!
//! Each repository wraps a borrowed SQLite connection (a pooled connection or an open
//! transaction) and returns models from [`crate::db::models`].
//!
//! # Available Repositories
//!
//! - [`Users`]: User accounts
//! - [`Groups`]: Group definitions and memberships, including the built-in public group
//! - [`ApiKeys`]: One API key per user, stored as a digest
//! - [`Bundles`]: Provenance bundles and visibility-filtered listings
//! - [`ObjectPermissions`]: Per-bundle capability grants for users and groups
//!
//! # Common Pattern
//!
//! ```ignore
//! use provstore::db::handlers::{Bundles, ObjectPermissions, Repository};
//!
//! async fn example(pool: &sqlx::SqlitePool, request: BundleCreateDBRequest) -> anyhow::Result<()> {
//!     let mut tx = pool.begin().await?;
//!
//!     let bundle = Bundles::new(&mut tx).create(&request).await?;
//!     ObjectPermissions::new(&mut tx)
//!         .assign(bundle.id, Subject::User(request.owner_id), Capability::View)
//!         .await?;
//!
//!     tx.commit().await?;
//!     Ok(())
//! }
//! ```

pub mod api_keys;
pub mod bundles;
pub mod groups;
pub mod permissions;
pub mod repository;
pub mod users;

pub use api_keys::ApiKeys;
pub use bundles::Bundles;
pub use groups::Groups;
pub use permissions::ObjectPermissions;
pub use repository::Repository;
pub use users::Users;
