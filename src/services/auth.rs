use anyhow::anyhow;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

// ============================================================================
// Credentials - argon2 password hashes and opaque session tokens
// ============================================================================
//
// Tokens are 32 random bytes, handed to the client once. Only their SHA-256
// digest is stored, so a leaked sessions table cannot be replayed.
//
// ============================================================================

const TOKEN_BYTES: usize = 32;

/// Hash a password. Argon2 is deliberately slow, so this runs off the
/// async executor.
pub async fn hash_password(password: String) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| anyhow!("Failed to hash password: {e}"))
    })
    .await?
}

/// Check a password against a stored hash. A malformed hash never verifies.
pub async fn verify_password(password: String, stored_hash: String) -> anyhow::Result<bool> {
    let verified = tokio::task::spawn_blocking(move || {
        let Ok(parsed) = PasswordHash::new(&stored_hash) else {
            tracing::warn!("Stored password hash is malformed");
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
    .await?;
    Ok(verified)
}

/// A freshly issued bearer token and the digest that gets persisted.
pub struct IssuedToken {
    pub token: String,
    pub hash: String,
}

pub fn issue_token() -> IssuedToken {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    let token = URL_SAFE_NO_PAD.encode(bytes);
    let hash = hash_token(&token);
    IssuedToken { token, hash }
}

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_password_round_trip() {
        let hash = hash_password("correct horse battery".into()).await.unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse battery".into(), hash.clone()).await.unwrap());
        assert!(!verify_password("wrong horse battery".into(), hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_malformed_hash_never_verifies() {
        assert!(!verify_password("anything".into(), "not-a-hash".into()).await.unwrap());
    }

    #[test]
    fn test_tokens_are_unique_and_hashed() {
        let a = issue_token();
        let b = issue_token();
        assert_ne!(a.token, b.token);
        assert_eq!(a.token.len(), 43);
        assert_eq!(a.hash, hash_token(&a.token));
        assert_eq!(a.hash.len(), 64);
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
