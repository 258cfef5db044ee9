//! HTTP request handlers for all API endpoints.
//!
//! Handlers are Axum route functions organized by resource. Each one validates and
//! deserializes the request, resolves the caller, checks capabilities, runs the
//! repository calls and serializes the response.
//!
//! # Handler Modules
//!
//! - [`api_keys`]: Key rotation, revocation and password exchange
//! - [`bundles`]: Provenance bundle CRUD under `/bundle/`
//! - [`groups`]: Group management and memberships
//! - [`permissions`]: Per-bundle grants to users and groups
//! - [`users`]: User creation and the current-user profile
//!
//! # Authentication
//!
//! Handlers take either a [`crate::types::Principal`] (anonymous callers allowed) or a
//! [`crate::api::models::users::CurrentUser`] (an API key is required). Both extractors live in
//! [`crate::auth::current_user`].
//!
//! # Error Handling
//!
//! Handlers return [`crate::errors::Error`], which converts to the matching HTTP status code.

pub mod api_keys;
pub mod bundles;
pub mod groups;
pub mod permissions;
pub mod users;
