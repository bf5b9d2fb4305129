//! Two-tier API key verification: a fast SHA-256 cache lookup backed by a
//! slow, memory-hard Argon2id verify against the stored per-project hash.
//!
//! Grounded on the collector's `auth.py` (HIGH-1 fix): a process-wide
//! `fast_hash(key) -> project_id` cache avoids re-running the slow hash on
//! every request for a key that has already been verified once. The cache
//! never produces a false positive — a cache hit always corresponds to a key
//! that passed the slow verify at least once — and is bounded so an attacker
//! flooding the gateway with distinct bogus keys cannot grow it without
//! bound.

use dashmap::DashMap;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use crate::error::{Result, SecurityError};

const API_KEY_PREFIX: &str = "ak_";
const URLSAFE_CHARS: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// A project's stored, slow-hashed API key.
#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    /// The project this key authenticates as.
    pub project_id: String,
    /// Argon2id PHC string, as produced by [`AuthCache::hash_key`].
    pub api_key_hash: String,
}

/// Generate a new API key: the `ak_` prefix plus 32 urlsafe characters.
#[must_use]
pub fn generate_api_key() -> SecretString {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..32)
        .map(|_| {
            let idx = rng.gen_range(0..URLSAFE_CHARS.len());
            URLSAFE_CHARS[idx] as char
        })
        .collect();
    SecretString::from(format!("{API_KEY_PREFIX}{suffix}"))
}

fn fast_hash(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Bounded cache of already-verified keys, plus the Argon2id hash/verify used
/// on a cache miss.
pub struct AuthCache {
    verified: DashMap<String, String>,
    capacity: usize,
}

impl AuthCache {
    /// Create a cache bounded at `capacity` verified entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            verified: DashMap::new(),
            capacity,
        }
    }

    /// Hash a newly minted API key for storage, using Argon2id.
    ///
    /// # Errors
    /// Returns [`SecurityError::HashingFailed`] if the hasher cannot be
    /// constructed or hashing fails.
    pub fn hash_key(&self, api_key: &SecretString) -> Result<String> {
        use argon2::password_hash::{PasswordHasher, SaltString};
        use argon2::Argon2;

        let salt = SaltString::generate(&mut rand::thread_rng());
        let argon2 = Argon2::default();
        argon2
            .hash_password(api_key.expose_secret().as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| SecurityError::HashingFailed(e.to_string()))
    }

    /// Verify `presented` against the cache, falling back to a linear scan of
    /// `known` (every registered project's hash) on a miss.
    ///
    /// # Errors
    /// Returns [`SecurityError::InvalidKeyFormat`] if `presented` lacks the
    /// `ak_` prefix, or [`SecurityError::InvalidKey`] if it matches no known
    /// project.
    pub fn verify(&self, presented: &str, known: &[ApiKeyRecord]) -> Result<String> {
        if !presented.starts_with(API_KEY_PREFIX) {
            return Err(SecurityError::InvalidKeyFormat);
        }

        let key = fast_hash(presented);
        if let Some(project_id) = self.verified.get(&key) {
            return Ok(project_id.clone());
        }

        use argon2::password_hash::{PasswordHash, PasswordVerifier};
        use argon2::Argon2;

        let argon2 = Argon2::default();
        for record in known {
            let Ok(parsed) = PasswordHash::new(&record.api_key_hash) else {
                continue;
            };
            if argon2
                .verify_password(presented.as_bytes(), &parsed)
                .is_ok()
            {
                if self.verified.len() < self.capacity {
                    self.verified.insert(key, record.project_id.clone());
                }
                return Ok(record.project_id.clone());
            }
        }

        Err(SecurityError::InvalidKey)
    }

    /// Evict one key (or, with `None`, every key) from the verified cache.
    /// Call on project deletion/key rotation.
    pub fn invalidate(&self, api_key: Option<&str>) {
        match api_key {
            Some(key) => {
                self.verified.remove(&fast_hash(key));
            }
            None => self.verified.clear(),
        }
    }

    /// Current number of cached verified keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.verified.len()
    }

    /// Whether the cache currently holds no verified keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.verified.is_empty()
    }
}
