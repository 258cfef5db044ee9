//! Database models for provenance bundles.

use crate::types::{BundleId, UserId};
use chrono::{DateTime, Utc};

/// Database request for creating a new bundle
#[derive(Debug, Clone)]
pub struct BundleCreateDBRequest {
    pub rec_id: String,
    pub owner_id: UserId,
    pub content: serde_json::Value,
}

/// Database request for replacing a bundle's document
#[derive(Debug, Clone)]
pub struct BundleUpdateDBRequest {
    pub rec_id: String,
    pub content: serde_json::Value,
}

/// Database response for a bundle
#[derive(Debug, Clone)]
pub struct BundleDBResponse {
    pub id: BundleId,
    pub rec_id: String,
    pub owner_id: UserId,
    pub owner_username: String,
    pub content: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
