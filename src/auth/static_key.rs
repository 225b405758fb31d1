//! Static credential verification
//!
//! API keys, fixed bearer tokens and the fixed Basic pair are all long-lived
//! shared secrets. They share one constant-time matching core; the scheme only
//! selects which allow-set is consulted.
//!
//! Secrets are compared as SHA-256 digests so the comparison runs over fixed
//! 32-byte values regardless of the presented length.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use subtle::{Choice, ConstantTimeEq};

use crate::error::RejectReason;
use crate::models::{SchemeKind, Subject};

use super::store::{bounded, SecretStore};

/// Allow-set selector for shared-secret schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaticKind {
    /// Static API keys
    ApiKey,
    /// Fixed bearer tokens
    Bearer,
    /// Fixed Basic `username:password` pair
    BasicPair,
}

impl StaticKind {
    /// Allow-set used by a scheme, if the scheme is a shared-secret one
    pub fn for_scheme(scheme: SchemeKind) -> Option<Self> {
        match scheme {
            SchemeKind::ApiKey => Some(StaticKind::ApiKey),
            SchemeKind::BearerStatic => Some(StaticKind::Bearer),
            SchemeKind::Basic => Some(StaticKind::BasicPair),
            SchemeKind::Password | SchemeKind::BearerToken => None,
        }
    }

    /// Joined form of a Basic pair as stored in the allow-set
    pub fn basic_pair(username: &str, password: &str) -> String {
        format!("{}:{}", username, password)
    }
}

/// SHA-256 digest of a shared secret
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SecretDigest([u8; 32]);

impl SecretDigest {
    /// Digest a secret
    pub fn of(secret: &str) -> Self {
        Self(Sha256::digest(secret.as_bytes()).into())
    }

    /// Constant-time equality
    pub fn matches(&self, other: &SecretDigest) -> bool {
        self.0.ct_eq(&other.0).into()
    }

    /// Constant-time set membership
    ///
    /// Every candidate is compared; the loop never exits early.
    pub fn matches_any(&self, candidates: &[SecretDigest]) -> bool {
        let mut found = Choice::from(0u8);
        for candidate in candidates {
            found |= self.0.ct_eq(&candidate.0);
        }
        found.into()
    }
}

impl fmt::Debug for SecretDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretDigest([REDACTED])")
    }
}

/// Verifier for shared-secret schemes
pub struct StaticCredentialVerifier {
    store: Arc<dyn SecretStore>,
    lookup_timeout: Duration,
}

impl StaticCredentialVerifier {
    /// Create a verifier backed by the given store
    pub fn new(store: Arc<dyn SecretStore>, lookup_timeout: Duration) -> Self {
        Self {
            store,
            lookup_timeout,
        }
    }

    /// Check a presented secret against the allow-set of `kind`
    pub async fn verify(&self, kind: StaticKind, presented: &str) -> Result<Subject, RejectReason> {
        let valid = bounded(
            self.lookup_timeout,
            self.store.is_static_key_valid(kind, presented),
        )
        .await?;

        if valid {
            Ok(Subject::shared_secret())
        } else {
            Err(RejectReason::InvalidCredential)
        }
    }

    /// Check a Basic pair
    ///
    /// A username containing `:` can never match, since the joined form would
    /// be ambiguous. The lookup still runs so the rejection costs the same.
    pub async fn verify_basic(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Subject, RejectReason> {
        let result = self
            .verify(StaticKind::BasicPair, &StaticKind::basic_pair(username, password))
            .await;

        match result {
            Ok(_) if username.contains(':') => Err(RejectReason::InvalidCredential),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::{InMemorySecretStore, MockSecretStore, SigningKey};
    use crate::error::StoreError;

    fn test_store() -> Arc<dyn SecretStore> {
        Arc::new(
            InMemorySecretStore::new(SigningKey::new("k1", "0123456789abcdef0123456789abcdef"))
                .with_static_key(StaticKind::ApiKey, "mysecretkey")
                .with_static_key(StaticKind::ApiKey, "second-key")
                .with_static_key(StaticKind::Bearer, "yourtokenhere")
                .with_basic_pair("admin", "password"),
        )
    }

    fn verifier() -> StaticCredentialVerifier {
        StaticCredentialVerifier::new(test_store(), Duration::from_millis(200))
    }

    #[test]
    fn test_digest_equality() {
        assert!(SecretDigest::of("abc").matches(&SecretDigest::of("abc")));
        assert!(!SecretDigest::of("abc").matches(&SecretDigest::of("abd")));
        assert!(!SecretDigest::of("abc").matches(&SecretDigest::of("abcd")));
    }

    #[test]
    fn test_digest_set_membership() {
        let set = [SecretDigest::of("one"), SecretDigest::of("two")];
        assert!(SecretDigest::of("two").matches_any(&set));
        assert!(!SecretDigest::of("three").matches_any(&set));
        assert!(!SecretDigest::of("one").matches_any(&[]));
    }

    #[test]
    fn test_scheme_mapping() {
        assert_eq!(
            StaticKind::for_scheme(SchemeKind::ApiKey),
            Some(StaticKind::ApiKey)
        );
        assert_eq!(
            StaticKind::for_scheme(SchemeKind::BearerStatic),
            Some(StaticKind::Bearer)
        );
        assert_eq!(
            StaticKind::for_scheme(SchemeKind::Basic),
            Some(StaticKind::BasicPair)
        );
        assert_eq!(StaticKind::for_scheme(SchemeKind::Password), None);
        assert_eq!(StaticKind::for_scheme(SchemeKind::BearerToken), None);
    }

    #[tokio::test]
    async fn test_api_key_accepted() {
        let result = verifier().verify(StaticKind::ApiKey, "mysecretkey").await;
        assert_eq!(result, Ok(Subject::shared_secret()));

        let result = verifier().verify(StaticKind::ApiKey, "second-key").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_other_strings_rejected() {
        let verifier = verifier();
        for candidate in ["", "mysecretke", "mysecretkey ", "MYSECRETKEY", "yourtokenhere"] {
            assert_eq!(
                verifier.verify(StaticKind::ApiKey, candidate).await,
                Err(RejectReason::InvalidCredential),
                "{:?} should be rejected",
                candidate
            );
        }
    }

    #[tokio::test]
    async fn test_basic_pair() {
        let verifier = verifier();
        assert!(verifier.verify_basic("admin", "password").await.is_ok());
        assert_eq!(
            verifier.verify_basic("admin", "wrong").await,
            Err(RejectReason::InvalidCredential)
        );
        assert_eq!(
            verifier.verify_basic("root", "password").await,
            Err(RejectReason::InvalidCredential)
        );
    }

    #[tokio::test]
    async fn test_basic_username_with_colon_never_matches() {
        let store = Arc::new(
            InMemorySecretStore::new(SigningKey::new("k1", "0123456789abcdef0123456789abcdef"))
                .with_basic_pair("a", "b:c"),
        );
        let verifier = StaticCredentialVerifier::new(store, Duration::from_millis(200));

        assert!(verifier.verify_basic("a", "b:c").await.is_ok());
        assert_eq!(
            verifier.verify_basic("a:b", "c").await,
            Err(RejectReason::InvalidCredential)
        );
    }

    #[tokio::test]
    async fn test_store_failure_is_unavailable() {
        let mut store = MockSecretStore::new();
        store
            .expect_is_static_key_valid()
            .returning(|_, _| Err(StoreError::Unavailable("down".to_string())));

        let verifier = StaticCredentialVerifier::new(Arc::new(store), Duration::from_millis(200));
        assert_eq!(
            verifier.verify(StaticKind::ApiKey, "mysecretkey").await,
            Err(RejectReason::TemporarilyUnavailable)
        );
    }
}
