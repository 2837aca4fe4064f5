//! Password hashing and random token generation
//!
//! Passwords are stored as iterated, salted SHA-256 digests. The salt is
//! stored next to the hash in the `users` table.
//!
//! Pure functions only. Session persistence lives in [`crate::db::sessions`].

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Number of SHA-256 rounds applied to each password
pub const HASH_ROUNDS: u32 = 10_000;

const SALT_BYTES: usize = 16;
const TOKEN_BYTES: usize = 32;

/// Hash a password with a fresh random salt
///
/// Returns `(hash_hex, salt_hex)`.
///
/// # Examples
///
/// ```
/// use nimbus_common::auth::{hash_password, verify_password};
///
/// let (hash, salt) = hash_password("hunter22");
/// assert!(verify_password("hunter22", &hash, &salt));
/// assert!(!verify_password("hunter23", &hash, &salt));
/// ```
pub fn hash_password(password: &str) -> (String, String) {
    let mut salt = [0u8; SALT_BYTES];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt_hex = to_hex(&salt);
    let hash = hash_with_salt(password, &salt_hex);
    (hash, salt_hex)
}

/// Check a password against a stored hash and salt
pub fn verify_password(password: &str, hash_hex: &str, salt_hex: &str) -> bool {
    let calculated = hash_with_salt(password, salt_hex);
    constant_time_eq(calculated.as_bytes(), hash_hex.as_bytes())
}

/// Random 64-character hex token for sessions and OAuth state
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    to_hex(&bytes)
}

fn hash_with_salt(password: &str, salt_hex: &str) -> String {
    let mut digest = Sha256::new()
        .chain_update(salt_hex.as_bytes())
        .chain_update(password.as_bytes())
        .finalize();

    for _ in 1..HASH_ROUNDS {
        digest = Sha256::new()
            .chain_update(digest)
            .chain_update(salt_hex.as_bytes())
            .finalize();
    }

    format!("{:x}", digest)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
