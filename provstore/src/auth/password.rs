//! Password hashing and verification.
//!
//! Passwords are optional: a user without one can only authenticate with an API key. When a
//! password is set, it can be exchanged for a new key at `/api/v0/authentication/api-key`.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use std::sync::LazyLock;

use crate::db::models::users::UserDBResponse;
use crate::errors::Error;

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 256;

/// Argon2 hashing parameters.
#[derive(Debug, Clone, Copy)]
pub struct Argon2Params {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Argon2Params {
    fn to_argon2(self) -> Result<Argon2<'static>, Error> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None).map_err(|e| Error::Internal {
            operation: format!("create argon2 params: {e}"),
        })?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Cheap parameters for tests. Never use these for stored credentials.
    pub fn insecure_fast() -> Self {
        Self {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            memory_kib: 19456, // 19 MB
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Reject passwords outside the accepted length range.
pub fn validate_password(password: &str) -> Result<(), Error> {
    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(Error::BadRequest {
            message: format!("Password must be at least {MIN_PASSWORD_LENGTH} characters"),
        });
    }
    if length > MAX_PASSWORD_LENGTH {
        return Err(Error::BadRequest {
            message: format!("Password must be at most {MAX_PASSWORD_LENGTH} characters"),
        });
    }
    Ok(())
}

/// Hash a string with Argon2id using the given parameters.
pub fn hash_string_with_params(input: &str, params: Argon2Params) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = params
        .to_argon2()?
        .hash_password(input.as_bytes(), &salt)
        .map_err(|e| Error::Internal {
            operation: format!("hash string: {e}"),
        })?;

    Ok(hash.to_string())
}

/// Hash a string with Argon2id using the default parameters.
pub fn hash_string(input: &str) -> Result<String, Error> {
    hash_string_with_params(input, Argon2Params::default())
}

/// Verify a string against a PHC-formatted hash. Parameters are read from the hash itself.
pub fn verify_string(input: &str, hash: &str) -> Result<bool, Error> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| Error::Internal {
        operation: format!("parse hash: {e}"),
    })?;

    Ok(Argon2::default().verify_password(input.as_bytes(), &parsed_hash).is_ok())
}

/// Check a user's password. Users without a password, and inactive users, never match.
pub fn verify_user_password(user: &UserDBResponse, password: &str) -> Result<bool, Error> {
    match (&user.password_hash, user.is_active) {
        (Some(hash), true) => verify_string(password, hash),
        _ => Ok(false),
    }
}

/// Verified against when a login names no usable account, so that every failed login costs one
/// Argon2 verification with the default parameters.
static DUMMY_HASH: LazyLock<Option<String>> = LazyLock::new(|| hash_string("provstore-unused-password").ok());

/// Check a login attempt. Unknown, inactive and password-less accounts never match, but still
/// pay for a verification.
pub fn verify_login(user: Option<&UserDBResponse>, password: &str) -> Result<bool, Error> {
    match user {
        Some(user) if user.is_active && user.password_hash.is_some() => verify_user_password(user, password),
        _ => {
            if let Some(hash) = DUMMY_HASH.as_deref() {
                verify_string(password, hash)?;
            }
            Ok(false)
        }
    }
}
