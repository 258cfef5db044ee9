//! API response models for bundle permissions.

use crate::types::{BundleId, Capability, CapabilitySet};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Capability flags one principal holds on one bundle.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BundlePermissionsResponse {
    pub bundle: BundleId,
    /// Username, or `anonymous` for unauthenticated callers
    #[schema(example = "alice")]
    pub subject: String,
    pub permissions: CapabilitySet,
}

/// A capability granted to a group on a bundle.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GroupGrantResponse {
    #[schema(example = "public")]
    pub group: String,
    pub capability: Capability,
}
