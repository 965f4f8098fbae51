use crate::error::AppError;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use sha2::Sha256;

/// Prefix of werkzeug's `pbkdf2:sha256:<iterations>$<salt>$<hex>` hashes,
/// found in databases written by the previous deployment.
const WERKZEUG_PBKDF2_SHA256: &str = "pbkdf2:sha256:";

/// Hash a password with Argon2id and a fresh random salt.
///
/// The result is a PHC string carrying algorithm, parameters and salt, so it
/// can be stored in a single column.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Password(format!("Password hashing failed: {}", e)))
}

/// Verify a password against a stored hash: an Argon2 PHC string, or a
/// legacy werkzeug PBKDF2-SHA256 hash.
///
/// A stored value that does not parse never verifies.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    if let Some(rest) = stored_hash.strip_prefix(WERKZEUG_PBKDF2_SHA256) {
        return verify_werkzeug_pbkdf2(password, rest);
    }

    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            log::warn!("Stored password hash is unreadable: {}", e);
            false
        }
    }
}

/// True for stored hashes that should be replaced with Argon2 after the next
/// successful login.
pub fn needs_rehash(stored_hash: &str) -> bool {
    !stored_hash.starts_with("$argon2")
}

/// `rest` is `<iterations>$<salt>$<hex digest>`. The salt is used as its
/// UTF-8 text, as werkzeug does.
fn verify_werkzeug_pbkdf2(password: &str, rest: &str) -> bool {
    let mut parts = rest.splitn(3, '$');
    let (Some(iterations), Some(salt), Some(digest)) = (parts.next(), parts.next(), parts.next())
    else {
        log::warn!("Legacy password hash is malformed");
        return false;
    };
    let Ok(iterations) = iterations.parse::<u32>() else {
        log::warn!("Legacy password hash has a bad iteration count");
        return false;
    };
    let Ok(expected) = hex::decode(digest) else {
        log::warn!("Legacy password hash digest is not hex");
        return false;
    };
    if iterations == 0 || expected.is_empty() {
        return false;
    }

    let mut derived = vec![0u8; expected.len()];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), iterations, &mut derived);

    // constant time over the digest length
    derived
        .iter()
        .zip(&expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
