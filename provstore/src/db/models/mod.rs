//! Database record models matching table schemas.
//!
//! These models are returned by repositories and accepted for insertion/update. They are kept
//! separate from the API models in [`crate::api::models`] so that storage and wire
//! representations can evolve independently.
//!
//! - [`users`]: User accounts
//! - [`groups`]: Groups (the `public` group is built in)
//! - [`api_keys`]: API key digests and credential lookups
//! - [`bundles`]: Provenance bundles
//!
//! Conversion to API models goes through `From` impls on the API side:
//!
//! ```ignore
//! use provstore::api::models::bundles::BundleResponse;
//!
//! let response: BundleResponse = db_bundle.into();
//! ```

pub mod api_keys;
pub mod bundles;
pub mod groups;
pub mod users;
