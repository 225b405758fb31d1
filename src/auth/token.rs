//! Signed token issuance and verification
//!
//! Tokens are compact JWTs signed with HMAC-SHA256 under the store's signing
//! key. The header carries the key id; the claims are `{sub, iat, exp, jti}`.
//!
//! Verification is a fixed pipeline that stops at the first failure:
//! structure, signature, expiry, subject. Claims only become readable through
//! [`VerifiedClaims`], which can only be produced by a successful signature
//! check.

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{
    decode, decode_header, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header,
    Validation,
};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{IssueError, RejectReason};
use crate::models::{IssuedToken, Subject, TokenClaims};

use super::clock::Clock;
use super::store::{bounded, SecretStore, SigningKey};

/// The only algorithm tokens are signed and accepted with
pub const TOKEN_ALGORITHM: Algorithm = Algorithm::HS256;

/// Length of the random token identifier in bytes
const TOKEN_ID_BYTES: usize = 16;

/// Generate a random token identifier
fn generate_token_id() -> String {
    let mut id_bytes = [0u8; TOKEN_ID_BYTES];
    OsRng.fill_bytes(&mut id_bytes);
    URL_SAFE_NO_PAD.encode(id_bytes)
}

/// Mints signed tokens for subjects that passed primary authentication
pub struct TokenIssuer {
    store: Arc<dyn SecretStore>,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    /// Create an issuer
    pub fn new(store: Arc<dyn SecretStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Issue a token for `subject` valid for `ttl`
    ///
    /// The TTL is applied at whole-second granularity and must be at least
    /// one second.
    pub fn issue(&self, subject: &Subject, ttl: Duration) -> Result<IssuedToken, IssueError> {
        let ttl_secs = i64::try_from(ttl.as_secs()).map_err(|_| IssueError::InvalidTtl)?;
        if ttl_secs == 0 {
            return Err(IssueError::InvalidTtl);
        }

        let key = self.store.signing_key();
        let claims = TokenClaims::new(
            subject.as_str(),
            self.clock.now(),
            ttl_secs,
            generate_token_id(),
        )
        .ok_or(IssueError::InvalidTtl)?;

        let mut header = Header::new(TOKEN_ALGORITHM);
        header.kid = Some(key.id().to_string());

        let token = encode(&header, &claims, &EncodingKey::from_secret(key.secret()))?;

        tracing::debug!(
            subject = %subject,
            key_id = %key.id(),
            expires_at = %claims.expires_at(),
            "Token issued"
        );

        Ok(IssuedToken::bearer(token, &claims))
    }
}

/// Claims whose signature has been checked
#[derive(Debug)]
pub struct VerifiedClaims(TokenClaims);

impl VerifiedClaims {
    /// Check structure, algorithm, key id and signature
    fn from_token(token: &str, key: &SigningKey) -> Result<Self, RejectReason> {
        let header = decode_header(token).map_err(|_| RejectReason::Malformed)?;

        // The algorithm is pinned here, never taken from the token.
        if header.alg != TOKEN_ALGORITHM {
            return Err(RejectReason::BadSignature);
        }
        if header.kid.as_deref().is_some_and(|kid| kid != key.id()) {
            return Err(RejectReason::BadSignature);
        }

        let mut validation = Validation::new(TOKEN_ALGORITHM);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["sub", "exp"]);

        decode::<TokenClaims>(token, &DecodingKey::from_secret(key.secret()), &validation)
            .map(|data| VerifiedClaims(data.claims))
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidAlgorithmName
                | ErrorKind::InvalidKeyFormat => RejectReason::BadSignature,
                _ => RejectReason::Malformed,
            })
    }

    /// Verified claims
    pub fn claims(&self) -> &TokenClaims {
        &self.0
    }
}

/// Validates presented signed tokens
pub struct TokenVerifier {
    store: Arc<dyn SecretStore>,
    clock: Arc<dyn Clock>,
    lookup_timeout: Duration,
}

impl TokenVerifier {
    /// Create a verifier
    pub fn new(
        store: Arc<dyn SecretStore>,
        clock: Arc<dyn Clock>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            lookup_timeout,
        }
    }

    /// Verify a token and resolve its subject
    pub async fn verify(&self, token: &str) -> Result<Subject, RejectReason> {
        let key = self.store.signing_key();

        let verified = VerifiedClaims::from_token(token, &key)?;

        if !verified.claims().is_live_at(self.clock.now()) {
            return Err(RejectReason::Expired);
        }

        let subject = &verified.claims().sub;
        let provisioned = bounded(self.lookup_timeout, self.store.lookup_password_hash(subject))
            .await?
            .is_some();
        if !provisioned {
            return Err(RejectReason::UnknownSubject);
        }

        Ok(Subject::new(subject.as_str()))
    }
}
