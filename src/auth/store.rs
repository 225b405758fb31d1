//! Secret store
//!
//! Single source of truth for password hashes, static keys and the token
//! signing key. The store is constructed once at startup from configuration
//! and passed to every verifier; it is read-only during request handling.
//!
//! The signing key can be swapped atomically between requests with
//! [`InMemorySecretStore::rotate_signing_key`]. Verifiers take one snapshot of
//! the key per verification, so a rotation never splits a single check, but
//! tokens signed under the previous key stop verifying once it is replaced.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use argon2::password_hash::PasswordHash;
use async_trait::async_trait;

use crate::config::{AuthConfig, ConfigError};
use crate::error::{RejectReason, StoreError};

use super::static_key::{SecretDigest, StaticKind};

/// Minimum signing key length in bytes
pub const MIN_SIGNING_KEY_BYTES: usize = 32;

/// Symmetric token signing key
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey {
    id: String,
    secret: Vec<u8>,
}

impl SigningKey {
    /// Create a signing key with an identifier embedded in issued tokens
    pub fn new(id: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
        }
    }

    /// Key identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Raw key material
    pub fn secret(&self) -> &[u8] {
        &self.secret
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("id", &self.id)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Read access to long-lived secrets
///
/// Lookups are async so a remote backend can sit behind this trait; callers
/// bound every lookup with [`bounded`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Stored password hash for a subject, `None` if the subject is not provisioned
    async fn lookup_password_hash(&self, subject: &str) -> Result<Option<String>, StoreError>;

    /// Whether `key` belongs to the allow-set of the given kind
    ///
    /// Implementations must compare in constant time with respect to key content.
    async fn is_static_key_valid(&self, kind: StaticKind, key: &str) -> Result<bool, StoreError>;

    /// Current signing key
    fn signing_key(&self) -> Arc<SigningKey>;
}

/// Run a store lookup with a deadline
///
/// Both an elapsed deadline and a backend error map to
/// `TemporarilyUnavailable`. The lookup is never retried here.
pub async fn bounded<T, F>(timeout: Duration, lookup: F) -> Result<T, RejectReason>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, lookup).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Secret store lookup failed");
            Err(e.into())
        }
        Err(_) => {
            tracing::warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Secret store lookup timed out"
            );
            Err(RejectReason::TemporarilyUnavailable)
        }
    }
}

/// Configuration-resident secret store
pub struct InMemorySecretStore {
    password_hashes: HashMap<String, String>,
    static_keys: HashMap<StaticKind, Vec<SecretDigest>>,
    signing_key: RwLock<Arc<SigningKey>>,
}

impl InMemorySecretStore {
    /// Create an empty store with the given signing key
    pub fn new(signing_key: SigningKey) -> Self {
        Self {
            password_hashes: HashMap::new(),
            static_keys: HashMap::new(),
            signing_key: RwLock::new(Arc::new(signing_key)),
        }
    }

    /// Build the store from the `auth` configuration section
    ///
    /// Fails on anything that would make the store unusable: a missing or
    /// short signing key, or a password hash that is not a valid PHC string.
    pub fn from_config(config: &AuthConfig) -> Result<Self, ConfigError> {
        let secret = config
            .signing_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingRequired("auth.signing_key".to_string()))?;
        if secret.len() < MIN_SIGNING_KEY_BYTES {
            return Err(ConfigError::InvalidValue(format!(
                "auth.signing_key must be at least {} bytes",
                MIN_SIGNING_KEY_BYTES
            )));
        }

        let mut store = Self::new(SigningKey::new(
            config.signing_key_id.clone(),
            secret.as_bytes(),
        ));

        for (subject, hash) in &config.users {
            PasswordHash::new(hash).map_err(|e| {
                ConfigError::InvalidValue(format!(
                    "auth.users.{}: not a valid password hash: {}",
                    subject, e
                ))
            })?;
            store = store.with_user(subject, hash);
        }

        for key in &config.api_keys {
            store = store.with_static_key(StaticKind::ApiKey, key);
        }
        for token in &config.bearer_tokens {
            store = store.with_static_key(StaticKind::Bearer, token);
        }
        if let Some(basic) = &config.basic {
            if basic.username.contains(':') {
                return Err(ConfigError::InvalidValue(
                    "auth.basic.username must not contain ':'".to_string(),
                ));
            }
            store = store.with_basic_pair(&basic.username, &basic.password);
        }

        Ok(store)
    }

    /// Provision a subject with a password hash
    pub fn with_user(mut self, subject: impl Into<String>, hash: impl Into<String>) -> Self {
        self.password_hashes.insert(subject.into(), hash.into());
        self
    }

    /// Add a key to the allow-set of a kind
    pub fn with_static_key(mut self, kind: StaticKind, key: &str) -> Self {
        self.static_keys
            .entry(kind)
            .or_default()
            .push(SecretDigest::of(key));
        self
    }

    /// Add a fixed Basic username/password pair
    pub fn with_basic_pair(self, username: &str, password: &str) -> Self {
        self.with_static_key(StaticKind::BasicPair, &StaticKind::basic_pair(username, password))
    }

    /// Replace the signing key
    pub fn rotate_signing_key(&self, key: SigningKey) {
        let key_id = key.id().to_string();
        *self
            .signing_key
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Arc::new(key);
        tracing::info!(key_id = %key_id, "Signing key rotated");
    }

    /// Number of provisioned subjects
    pub fn subject_count(&self) -> usize {
        self.password_hashes.len()
    }
}

impl fmt::Debug for InMemorySecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemorySecretStore")
            .field("subjects", &self.password_hashes.len())
            .field(
                "static_keys",
                &self
                    .static_keys
                    .iter()
                    .map(|(kind, keys)| (*kind, keys.len()))
                    .collect::<HashMap<_, _>>(),
            )
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn lookup_password_hash(&self, subject: &str) -> Result<Option<String>, StoreError> {
        Ok(self.password_hashes.get(subject).cloned())
    }

    async fn is_static_key_valid(&self, kind: StaticKind, key: &str) -> Result<bool, StoreError> {
        let allowed = self.static_keys.get(&kind).map(Vec::as_slice).unwrap_or(&[]);
        Ok(SecretDigest::of(key).matches_any(allowed))
    }

    fn signing_key(&self) -> Arc<SigningKey> {
        Arc::clone(&self.signing_key.read().unwrap_or_else(|e| e.into_inner()))
    }
}
