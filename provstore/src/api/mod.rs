//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures
//!
//! # API Structure
//!
//! Everything is served under `/api/v0`:
//!
//! - **Bundles** (`/bundle/*`): Provenance bundle storage
//! - **Permissions** (`/bundle/{id}/permissions/*`): Object-level grants
//! - **Groups** (`/groups/*`): Group management and memberships
//! - **Users** (`/users/*`): User creation, profile and API keys
//! - **Authentication** (`/authentication/api-key`): Exchange a password for an API key
//!
//! # OpenAPI Documentation
//!
//! Endpoints are annotated with `utoipa`. The document is served at `/api/v0/openapi.json`
//! and rendered at `/api/v0/docs`.

pub mod handlers;
pub mod models;
