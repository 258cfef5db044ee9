//! API request/response models for groups.

use super::pagination::Pagination;
use crate::db::models::groups::GroupDBResponse;
use crate::types::{GroupId, PUBLIC_GROUP_ID, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListGroupsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,
}

/// Request body for creating a new group.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GroupCreate {
    /// Name for the group (must be unique)
    #[schema(example = "curators")]
    pub name: String,
    #[schema(example = "People who maintain the lab's provenance records")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GroupResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: GroupId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    /// True for the built-in public group, which every principal belongs to
    pub is_public: bool,
    /// Member ids (only included if requested)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Vec<String>>)]
    pub members: Option<Vec<UserId>>,
}

impl From<GroupDBResponse> for GroupResponse {
    fn from(db: GroupDBResponse) -> Self {
        Self {
            is_public: db.id == PUBLIC_GROUP_ID,
            id: db.id,
            name: db.name,
            description: db.description,
            created_at: db.created_at,
            members: None,
        }
    }
}

impl GroupResponse {
    pub fn with_members(mut self, members: Vec<UserId>) -> Self {
        self.members = Some(members);
        self
    }
}
