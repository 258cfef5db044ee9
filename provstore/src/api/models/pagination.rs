//! Shared pagination types for list endpoints.
//!
//! List endpoints use offset-based pagination with `offset` and `limit` parameters and wrap
//! results in a `{ "meta": ..., "objects": [...] }` envelope.

use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};

/// Default number of items to return per page.
pub const DEFAULT_LIMIT: i64 = 20;

/// Maximum number of items that can be requested per page.
pub const MAX_LIMIT: i64 = 1000;

/// Pagination parameters for list endpoints.
///
/// A `limit` of 0 asks for as many items as allowed, i.e. [`MAX_LIMIT`].
#[serde_as]
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct Pagination {
    /// Number of items to skip (default: 0)
    #[param(default = 0, minimum = 0)]
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub offset: Option<i64>,

    /// Maximum number of items to return (default: 20, max: 1000, 0 for the maximum)
    #[param(default = 20, minimum = 0, maximum = 1000)]
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub limit: Option<i64>,
}

impl Pagination {
    #[inline]
    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    #[inline]
    pub fn limit(&self) -> i64 {
        match self.limit {
            None => DEFAULT_LIMIT,
            Some(0) => MAX_LIMIT,
            Some(limit) => limit.clamp(1, MAX_LIMIT),
        }
    }

    /// `(offset, limit)`, useful for destructuring.
    #[inline]
    pub fn params(&self) -> (i64, i64) {
        (self.offset(), self.limit())
    }
}

/// Pagination metadata returned alongside every list.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListMeta {
    pub limit: i64,
    pub offset: i64,
    /// Total number of items visible to the caller (before pagination)
    pub total_count: i64,
}

/// Paginated list envelope.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListResponse<T: ToSchema> {
    pub meta: ListMeta,
    pub objects: Vec<T>,
}

impl<T: ToSchema> ListResponse<T> {
    pub fn new(objects: Vec<T>, total_count: i64, offset: i64, limit: i64) -> Self {
        Self {
            meta: ListMeta {
                limit,
                offset,
                total_count,
            },
            objects,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let p = Pagination::default();
        assert_eq!(p.params(), (0, DEFAULT_LIMIT));
    }

    #[test]
    fn test_limit_clamping() {
        let with_limit = |limit| Pagination {
            offset: None,
            limit: Some(limit),
        };

        assert_eq!(with_limit(0).limit(), MAX_LIMIT);
        assert_eq!(with_limit(-5).limit(), 1);
        assert_eq!(with_limit(5000).limit(), MAX_LIMIT);
        assert_eq!(with_limit(50).limit(), 50);
    }

    #[test]
    fn test_negative_offset_is_clamped() {
        let p = Pagination {
            offset: Some(-10),
            limit: None,
        };
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn test_parses_from_query_string() {
        let uri: axum::http::Uri = "http://localhost/?offset=40&limit=10".parse().unwrap();
        let axum::extract::Query(p) = axum::extract::Query::<Pagination>::try_from_uri(&uri).unwrap();
        assert_eq!(p.params(), (40, 10));
    }
}
