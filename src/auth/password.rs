//! Argon2id password hashing.

use super::AuthError;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use tracing::{error, instrument};

/// Hashes a plain-text password into a PHC string with a random salt.
#[instrument(skip_all)]
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!(error = %e, "Argon2 password hashing failed");
            AuthError::InternalError("Password hashing failed".to_string())
        })
}

/// Returns `Ok(false)` on mismatch and an error only when the stored hash is unreadable.
#[instrument(skip_all)]
pub fn verify_password(stored_hash: &str, password: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| {
        error!(error = %e, "Stored password hash is malformed");
        AuthError::InternalError("Stored password hash is malformed".to_string())
    })?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => {
            error!(error = %e, "Argon2 password verification failed");
            Err(AuthError::InternalError(
                "Password verification failed".to_string(),
            ))
        }
    }
}
