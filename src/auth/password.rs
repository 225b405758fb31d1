//! Password hashing and verification
//!
//! Passwords are stored as Argon2id hashes in PHC string format. The work
//! factors are configurable; verification reads them back from each hash.

use std::sync::Arc;
use std::time::Duration;

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier as _, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use thiserror::Error;

use crate::config::PasswordHashingConfig;
use crate::error::RejectReason;
use crate::models::Subject;

use super::store::{bounded, SecretStore};

/// Error type for password hashing operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HashError {
    /// Work factors out of range
    #[error("Invalid hashing parameters: {0}")]
    InvalidParams(String),

    /// Hashing failed
    #[error("Hash failed: {0}")]
    HashFailed(String),
}

/// Build an Argon2id hasher from configured work factors
fn hasher(config: &PasswordHashingConfig) -> Result<Argon2<'static>, HashError> {
    let params = Params::new(
        config.memory_kib,
        config.iterations,
        config.parallelism,
        None,
    )
    .map_err(|e| HashError::InvalidParams(e.to_string()))?;

    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password using Argon2id
///
/// The hash includes a random salt, so hashing the same password twice gives
/// different strings.
///
/// # Example
///
/// ```
/// use auth_gateway::auth::password::{hash_password, verify_password};
/// use auth_gateway::config::PasswordHashingConfig;
///
/// let config = PasswordHashingConfig::default();
/// let hash = hash_password("password", &config).unwrap();
/// assert!(hash.starts_with("$argon2id$"));
/// assert!(verify_password("password", &hash));
/// ```
pub fn hash_password(password: &str, config: &PasswordHashingConfig) -> Result<String, HashError> {
    let salt = SaltString::generate(&mut OsRng);

    hasher(config)?
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| HashError::HashFailed(e.to_string()))
}

/// Verify a password against a stored hash
///
/// Returns `false` for a mismatch and for a hash that cannot be parsed.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Verifier for the password scheme
///
/// Unknown subjects are checked against a decoy hash made with the same work
/// factors, so they cost the same as a known subject with a wrong password
/// and produce the same rejection.
pub struct PasswordVerifier {
    store: Arc<dyn SecretStore>,
    decoy_hash: String,
    lookup_timeout: Duration,
}

impl PasswordVerifier {
    /// Create a verifier backed by the given store
    pub fn new(
        store: Arc<dyn SecretStore>,
        hashing: &PasswordHashingConfig,
        lookup_timeout: Duration,
    ) -> Result<Self, HashError> {
        let decoy_hash = hash_password(&decoy_secret(), hashing)?;
        Ok(Self {
            store,
            decoy_hash,
            lookup_timeout,
        })
    }

    /// Check a subject's password
    ///
    /// Argon2 runs on the blocking pool so a login never stalls the worker
    /// serving other requests.
    pub async fn verify(&self, subject: &str, password: &str) -> Result<Subject, RejectReason> {
        let stored = bounded(self.lookup_timeout, self.store.lookup_password_hash(subject)).await?;

        let known = stored.is_some();
        let hash = stored.unwrap_or_else(|| self.decoy_hash.clone());
        let password = password.to_owned();

        let matched = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Password verification task failed");
                RejectReason::TemporarilyUnavailable
            })?;

        if matched && known {
            Ok(Subject::new(subject))
        } else {
            Err(RejectReason::InvalidCredential)
        }
    }
}

/// Random value nobody knows, used as the decoy password
fn decoy_secret() -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use rand::RngCore;

    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
