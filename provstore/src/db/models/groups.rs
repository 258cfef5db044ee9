//! Database models for groups.

use crate::types::GroupId;
use chrono::{DateTime, Utc};

/// Database request for creating a new group
#[derive(Debug, Clone)]
pub struct GroupCreateDBRequest {
    pub name: String,
    pub description: Option<String>,
}

/// Database request for updating a group
#[derive(Debug, Clone)]
pub struct GroupUpdateDBRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Database response for a group
#[derive(Debug, Clone)]
pub struct GroupDBResponse {
    pub id: GroupId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}
