//! Database layer for data persistence and access.
//!
//! This module implements the data access layer using SQLx with SQLite.
//! It follows the Repository pattern to provide clean abstractions over database operations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  (API request handlers)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │ Repositories│  (db::handlers - queries)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │   Models    │  (db::models - database records)
//! └──────┬──────┘
//!        │
//!        ↓
//! ┌─────────────┐
//! │   SQLite    │
//! └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`handlers`]: Repository implementations
//! - [`models`]: Database record structures matching table schemas
//! - [`errors`]: Database-specific error types
//!
//! # Transactions
//!
//! Handlers that perform more than one write (creating a bundle and granting its owner, for
//! instance) open a transaction and build every repository from it:
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! let bundle = Bundles::new(&mut tx).create(&request).await?;
//! ObjectPermissions::new(&mut tx).assign(bundle.id, owner, Capability::View).await?;
//! tx.commit().await?;
//! ```
//!
//! Read-only paths use a pooled connection directly.
//!
//! # Migrations
//!
//! Migrations live in `migrations/` and are embedded at compile time. The
//! [`crate::migrator`] function provides access to the migrator:
//!
//! ```ignore
//! provstore::migrator().run(&pool).await?;
//! ```
//!
//! Foreign keys are enforced on every connection, so deleting a bundle or user removes its
//! grants, memberships and keys.

pub mod errors;
pub mod handlers;
pub mod models;
