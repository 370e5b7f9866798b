use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use sha2::{Digest, Sha256};
use tracing::error;

use social_types::{Error, Result};

/// Hash a password with Argon2id and a fresh random salt. Returns the PHC
/// string, which embeds salt and parameters.
pub fn hash_password(plain: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Password hashing failed: {}", e);
            Error::Storage
        })
}

/// Constant-time verification against a stored PHC string. A malformed
/// stored hash verifies as false.
pub fn verify_password(plain: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            error!("Stored credential hash is malformed: {}", e);
            false
        }
    }
}

/// 256 random bits, URL-safe so the secret can travel in a path segment.
pub fn generate_token_secret() -> String {
    let bytes: [u8; 32] = rand::random();
    B64.encode(bytes)
}

/// One-way hash under which an activation secret is stored and looked up.
pub fn token_hash(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_verifies_and_is_salted() {
        let a = hash_password("correct horse").unwrap();
        let b = hash_password("correct horse").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &a));
        assert!(!verify_password("wrong horse", &a));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn token_secrets_are_unique_and_hash_deterministically() {
        let s1 = generate_token_secret();
        let s2 = generate_token_secret();
        assert_ne!(s1, s2);
        assert_eq!(s1.len(), 43);
        assert_eq!(token_hash(&s1), token_hash(&s1));
        assert_ne!(token_hash(&s1), s1);
        assert_eq!(token_hash(&s1).len(), 64);
    }
}
