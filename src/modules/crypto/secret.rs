use argon2::password_hash::rand_core::{OsRng, RngCore};

/// Hex encoded random secret from the OS RNG, 64 characters long.
pub fn random_secret() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
