//! API request/response models for provenance bundles.

use super::pagination::Pagination;
use crate::db::models::bundles::BundleDBResponse;
use crate::errors::Error;
use crate::types::{BundleId, CapabilitySet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

/// Path prefix of the bundle collection. Every bundle's `resource_uri` lives below it.
pub const BUNDLE_COLLECTION_URI: &str = "/api/v0/bundle/";

pub fn bundle_uri(id: BundleId) -> String {
    format!("{BUNDLE_COLLECTION_URI}{id}/")
}

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListBundlesQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Response format. Only `json` is supported.
    pub format: Option<String>,
}

/// Request body for creating or replacing a bundle.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BundleCreate {
    /// Identifier of the bundle inside the document
    #[schema(example = "#mockup")]
    pub rec_id: String,
    /// The provenance document, an arbitrary JSON object
    #[schema(value_type = Object)]
    pub content: Value,
}

pub type BundleUpdate = BundleCreate;

impl BundleCreate {
    pub fn validate(&self) -> Result<(), Error> {
        if self.rec_id.trim().is_empty() {
            return Err(Error::BadRequest {
                message: "rec_id must not be empty".to_string(),
            });
        }
        if !self.content.is_object() {
            return Err(Error::BadRequest {
                message: "content must be a JSON object".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BundleResponse {
    pub id: BundleId,
    pub rec_id: String,
    /// Username of the bundle's creator
    pub owner: String,
    #[schema(value_type = Object)]
    pub content: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[schema(example = "/api/v0/bundle/1/")]
    pub resource_uri: String,
}

impl From<BundleDBResponse> for BundleResponse {
    fn from(db: BundleDBResponse) -> Self {
        Self {
            resource_uri: bundle_uri(db.id),
            id: db.id,
            rec_id: db.rec_id,
            owner: db.owner_username,
            content: db.content,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// A single bundle together with what the caller may do with it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BundleDetailResponse {
    #[serde(flatten)]
    pub bundle: BundleResponse,
    pub permissions: CapabilitySet,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_rejects_non_object_content() {
        let ok = BundleCreate {
            rec_id: "#mockup".to_string(),
            content: json!({"entity": {}}),
        };
        assert!(ok.validate().is_ok());

        let list = BundleCreate {
            content: json!([1, 2]),
            ..ok.clone()
        };
        assert!(list.validate().is_err());

        let blank = BundleCreate {
            rec_id: "  ".to_string(),
            ..ok
        };
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_resource_uri() {
        assert_eq!(bundle_uri(42), "/api/v0/bundle/42/");
    }
}
