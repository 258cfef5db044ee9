//! Authentication and authorization.
//!
//! # Authentication
//!
//! Programmatic clients send `Authorization: ApiKey <username>:<key>`. Each user holds at most
//! one key; only its SHA-256 digest is stored and presented keys are compared in constant time.
//! Requests without credentials run as the anonymous principal, which belongs to the public
//! group and nothing else.
//!
//! Keys are issued by `POST /api/v0/users/me/api-key` (rotating the caller's key) or
//! `POST /api/v0/authentication/api-key` (exchanging a username and password).
//!
//! # Authorization
//!
//! Bundles are guarded per object. Each of the five capabilities (`view`, `change`, `delete`,
//! `admin`, `ownership`) is granted independently to users or groups. See [`permissions`].
//!
//! # Modules
//!
//! - [`credentials`]: Header parsing and key verification
//! - [`current_user`]: Extractors for the [`crate::types::Principal`] and
//!   [`crate::api::models::users::CurrentUser`] of a request
//! - [`password`]: Password hashing and verification using Argon2
//! - [`permissions`]: Capability checks and grants
//!
//! # Usage in Handlers
//!
//! ```ignore
//! use provstore::types::Principal;
//!
//! async fn handler(principal: Principal, State(state): State<AppState>) -> Result<String> {
//!     Ok(format!("Hello, {principal}!"))
//! }
//! ```

pub mod credentials;
pub mod current_user;
pub mod password;
pub mod permissions;
