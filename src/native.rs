//! The platform's own credential format: Argon2id PHC strings.

use argon2::Argon2;
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use rand::rngs::OsRng;

/// Hashes a plaintext password into an Argon2id PHC string.
///
/// # Errors
///
/// Propagates hashing errors from [`argon2`].
pub fn hash_password(plaintext: &str) -> password_hash::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(plaintext.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verifies a plaintext password against a stored PHC string.
///
/// An empty or unparsable credential never verifies.
#[must_use]
pub fn verify_password(plaintext: &str, credential: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(credential) else {
        return false;
    };

    Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok()
}
