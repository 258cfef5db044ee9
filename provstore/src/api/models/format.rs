//! The `format` query parameter accepted by every bundle endpoint.

use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::errors::Error;

/// Serialization formats a caller may request. Only JSON is produced.
pub const SUPPORTED_FORMATS: &[&str] = &["json"];

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct FormatQuery {
    /// Response format. Only `json` is supported; omitting it also yields JSON.
    #[param(example = "json")]
    pub format: Option<String>,
}

impl FormatQuery {
    /// Fail with 400 if a format other than JSON was asked for.
    pub fn ensure_supported(&self) -> Result<(), Error> {
        ensure_format(self.format.as_deref())
    }
}

pub fn ensure_format(format: Option<&str>) -> Result<(), Error> {
    match format {
        None => Ok(()),
        Some(f) if SUPPORTED_FORMATS.contains(&f) => Ok(()),
        Some(other) => Err(Error::BadRequest {
            message: format!("Unsupported format '{other}'. Supported formats: {}", SUPPORTED_FORMATS.join(", ")),
        }),
    }
}
