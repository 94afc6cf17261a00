//! Argon2id password hashing.
//!
//! Hashes use the library's recommended default parameters and the
//! PHC string format, so parameters travel with the hash and can be
//! tightened later without invalidating stored credentials.
//! Verification is constant-time inside the library.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use parley_types::{ParleyError, Result};

/// Hashes a password with a fresh random salt.
pub fn hash(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| ParleyError::General)
}

/// Verifies a password against a stored PHC hash string.
///
/// A malformed stored hash is an internal error; a mismatching
/// password is `Ok(false)`.
pub fn verify(password: &str, stored: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored).map_err(|_| ParleyError::General)?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(_) => Err(ParleyError::General),
    }
}
