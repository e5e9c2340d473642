//! Password hashing and session key material.
//!
//! Argon2id over `(password, salt)` with 16-byte random salts from the
//! process CSPRNG. Hash comparison is constant-time.

use argon2::Argon2;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

use super::ServiceError;

pub const SALT_LEN: usize = 16;
pub const KEY_LEN: usize = 16;
const HASH_LEN: usize = 32;

pub fn random_salt() -> Vec<u8> {
    let mut salt = vec![0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

/// Fresh 16-byte session key.
pub fn session_key() -> Vec<u8> {
    let mut key = vec![0u8; KEY_LEN];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

pub fn password_hash(password: &str, salt: &[u8]) -> Result<Vec<u8>, ServiceError> {
    let mut digest = vec![0u8; HASH_LEN];
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut digest)
        .map_err(|e| ServiceError::internal(format!("password hashing failed: {}", e)))?;
    Ok(digest)
}

/// Hash `password` with `salt` and compare against `expected` without
/// short-circuiting on the first differing byte.
pub fn verify_password(password: &str, salt: &[u8], expected: &[u8]) -> Result<bool, ServiceError> {
    let digest = password_hash(password, salt)?;
    Ok(constant_time_eq(&digest, expected))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Session keys travel base64url-encoded without padding.
pub fn encode_key(key: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(key)
}

pub fn decode_key(encoded: &str) -> Result<Vec<u8>, ServiceError> {
    URL_SAFE_NO_PAD
        .decode(encoded.as_bytes())
        .map_err(|_| ServiceError::authentication("malformed session key"))
}

/// Constant-time session key comparison.
pub fn keys_match(a: &[u8], b: &[u8]) -> bool {
    constant_time_eq(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn salt_and_key_lengths() {
        assert_eq!(random_salt().len(), SALT_LEN);
        assert_eq!(session_key().len(), KEY_LEN);
    }

    #[test]
    fn hash_is_deterministic_per_salt() {
        let salt = random_salt();
        let a = password_hash("secret", &salt).unwrap();
        let b = password_hash("secret", &salt).unwrap();
        assert_eq!(a, b);

        let other_salt = random_salt();
        let c = password_hash("secret", &other_salt).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn verification_accepts_and_rejects() {
        let salt = random_salt();
        let digest = password_hash("secret", &salt).unwrap();
        assert!(verify_password("secret", &salt, &digest).unwrap());
        assert!(!verify_password("wrong", &salt, &digest).unwrap());
    }

    #[test]
    fn key_encoding_round_trips() {
        let key = session_key();
        let encoded = encode_key(&key);
        assert!(!encoded.contains('='));
        assert_eq!(decode_key(&encoded).unwrap(), key);
    }
}
