//! API request and response data models.
//!
//! API models are distinct from the database models in [`crate::db::models`], so the wire
//! format can evolve independently of storage. Every model derives `utoipa::ToSchema` and
//! appears in the generated OpenAPI document.
//!
//! - [`bundles`]: Bundles, list queries and detail responses
//! - [`permissions`]: Capability flags and group grants
//! - [`users`]: User creation, responses and the [`users::CurrentUser`] principal
//! - [`groups`]: Group definitions
//! - [`api_keys`]: Issued keys (secrets are returned only once)
//! - [`pagination`]: The `{meta, objects}` list envelope
//! - [`format`]: The `format` query parameter

pub mod api_keys;
pub mod bundles;
pub mod format;
pub mod groups;
pub mod pagination;
pub mod permissions;
pub mod users;
