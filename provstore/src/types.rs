//! Common type definitions and permission system types.
//!
//! This module defines:
//! - Type aliases for entity IDs (UserId, GroupId, etc.)
//! - The [`Capability`] levels that can be granted on a bundle
//! - [`CapabilitySet`], the flags a principal holds on one bundle
//! - The [`Subject`] a grant is attached to
//! - The [`Principal`] making a request
//! - The [`Operation`] being attempted, for error reporting
//!
//! # Capabilities
//!
//! Every bundle carries five independently grantable capabilities:
//!
//! | Capability  | Codename           |
//! |-------------|--------------------|
//! | `View`      | `view_bundle`      |
//! | `Change`    | `change_bundle`    |
//! | `Delete`    | `delete_bundle`    |
//! | `Admin`     | `admin_bundle`     |
//! | `Ownership` | `ownership_bundle` |
//!
//! Capabilities do not imply each other: holding `Change` says nothing about `View`.
//!
//! # Utility Functions
//!
//! - [`abbrev_uuid`]: Abbreviate UUIDs to first 8 chars for logging

use crate::api::models::users::CurrentUser;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

// Type aliases for IDs
pub type UserId = Uuid;
pub type GroupId = Uuid;
pub type ApiKeyId = Uuid;
pub type BundleId = i64;

/// The built-in `public` group. Every user and the anonymous principal belong to it.
pub const PUBLIC_GROUP_ID: GroupId = Uuid::nil();

/// Name of the built-in public group.
pub const PUBLIC_GROUP_NAME: &str = "public";

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

/// A permission level on a single bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    View,
    Change,
    Delete,
    Admin,
    Ownership,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::View,
        Capability::Change,
        Capability::Delete,
        Capability::Admin,
        Capability::Ownership,
    ];

    /// Short lowercase name, as stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::View => "view",
            Capability::Change => "change",
            Capability::Delete => "delete",
            Capability::Admin => "admin",
            Capability::Ownership => "ownership",
        }
    }

    /// Fully qualified codename, e.g. `view_bundle`
    pub fn codename(&self) -> String {
        format!("{}_bundle", self.as_str())
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCapability(pub String);

impl fmt::Display for UnknownCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown capability '{}'", self.0)
    }
}

impl std::error::Error for UnknownCapability {}

impl FromStr for Capability {
    type Err = UnknownCapability;

    /// Accepts either the bare name (`view`) or the codename (`view_bundle`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.strip_suffix("_bundle").unwrap_or(s);
        Capability::ALL
            .into_iter()
            .find(|c| c.as_str() == name)
            .ok_or_else(|| UnknownCapability(s.to_string()))
    }
}

/// The five capability flags a principal holds on one bundle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CapabilitySet {
    pub view: bool,
    pub change: bool,
    pub delete: bool,
    pub admin: bool,
    pub ownership: bool,
}

impl CapabilitySet {
    pub fn all() -> Self {
        Capability::ALL.into_iter().collect()
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn contains(&self, capability: Capability) -> bool {
        match capability {
            Capability::View => self.view,
            Capability::Change => self.change,
            Capability::Delete => self.delete,
            Capability::Admin => self.admin,
            Capability::Ownership => self.ownership,
        }
    }

    pub fn insert(&mut self, capability: Capability) {
        let flag = match capability {
            Capability::View => &mut self.view,
            Capability::Change => &mut self.change,
            Capability::Delete => &mut self.delete,
            Capability::Admin => &mut self.admin,
            Capability::Ownership => &mut self.ownership,
        };
        *flag = true;
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::none()
    }

    /// Held capabilities, in [`Capability::ALL`] order
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|c| self.contains(*c))
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        let mut set = Self::none();
        for capability in iter {
            set.insert(capability);
        }
        set
    }
}

/// Who is making a request.
#[derive(Debug, Clone)]
pub enum Principal {
    /// No credentials were presented. Anonymous callers hold exactly what the public group holds.
    Anonymous,
    User(CurrentUser),
}

impl Principal {
    pub fn user(&self) -> Option<&CurrentUser> {
        match self {
            Principal::Anonymous => None,
            Principal::User(user) => Some(user),
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user().map(|u| u.id)
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Principal::Anonymous)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::Anonymous => f.write_str("anonymous"),
            Principal::User(user) => f.write_str(&user.username),
        }
    }
}

/// Something a grant can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    User(UserId),
    Group(GroupId),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::User(id) => write!(f, "user {}", abbrev_uuid(id)),
            Subject::Group(id) => write!(f, "group {}", abbrev_uuid(id)),
        }
    }
}

// Operations a caller can attempt, used in error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    Create,
    Update,
    Delete,
    Grant,
    Revoke,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Read => write!(f, "read"),
            Operation::Create => write!(f, "create"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
            Operation::Grant => write!(f, "grant permissions on"),
            Operation::Revoke => write!(f, "revoke permissions on"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_parsing_accepts_codenames_and_short_names() {
        assert_eq!("view".parse::<Capability>().unwrap(), Capability::View);
        assert_eq!("view_bundle".parse::<Capability>().unwrap(), Capability::View);
        assert_eq!("ownership_bundle".parse::<Capability>().unwrap(), Capability::Ownership);
        assert!("view_container".parse::<Capability>().is_err());
        assert!("".parse::<Capability>().is_err());
    }

    #[test]
    fn test_codename_round_trips_through_parse() {
        for capability in Capability::ALL {
            assert_eq!(capability.codename().parse::<Capability>().unwrap(), capability);
        }
    }

    #[test]
    fn test_capability_set_flags() {
        let set: CapabilitySet = [Capability::View, Capability::Ownership].into_iter().collect();

        assert!(set.contains(Capability::View));
        assert!(!set.contains(Capability::Change));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Capability::View, Capability::Ownership]);
        assert!(CapabilitySet::none().is_empty());
        assert_eq!(CapabilitySet::all().iter().count(), 5);
        assert_eq!(
            serde_json::to_value(set).unwrap(),
            serde_json::json!({"view": true, "change": false, "delete": false, "admin": false, "ownership": true})
        );
    }

    #[test]
    fn test_abbrev_uuid() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(abbrev_uuid(&id), "550e8400");
    }
}
