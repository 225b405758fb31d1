//! Credential models
//!
//! This module defines the scheme-tagged credential envelope and the request
//! context handed to the gateway by the transport layer.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Verified identity produced by a successful authentication
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Subject(String);

impl Subject {
    /// Subject reported by shared-secret schemes, which carry no identity
    pub const STATIC: &'static str = "static";

    /// Create a subject from an identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The subject used for static key, fixed bearer and fixed Basic pair schemes
    pub fn shared_secret() -> Self {
        Self(Self::STATIC.to_string())
    }

    /// Borrow the identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Subject {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Authentication scheme tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemeKind {
    /// Subject + password checked against a stored argon2 hash
    Password,
    /// HTTP Basic fixed username/password pair
    Basic,
    /// Static API key (typically a query parameter or header)
    #[serde(alias = "apiKey")]
    ApiKey,
    /// Fixed bearer token from a static allow-set
    #[serde(alias = "bearerStatic")]
    BearerStatic,
    /// Signed, time-bounded token minted by the token issuer
    #[serde(alias = "bearerToken")]
    BearerToken,
}

impl SchemeKind {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemeKind::Password => "password",
            SchemeKind::Basic => "basic",
            SchemeKind::ApiKey => "api_key",
            SchemeKind::BearerStatic => "bearer_static",
            SchemeKind::BearerToken => "bearer_token",
        }
    }
}

impl fmt::Display for SchemeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw credential material tagged with its scheme
///
/// `Debug` output never includes the secret parts.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialEnvelope {
    /// Primary authentication with a provisioned subject
    Password { subject: String, password: String },

    /// HTTP Basic fixed pair
    Basic { username: String, password: String },

    /// Static API key
    ApiKey(String),

    /// Fixed bearer token
    BearerStatic(String),

    /// Signed token
    BearerToken(String),
}

impl CredentialEnvelope {
    /// Scheme tag of this envelope
    pub fn scheme(&self) -> SchemeKind {
        match self {
            CredentialEnvelope::Password { .. } => SchemeKind::Password,
            CredentialEnvelope::Basic { .. } => SchemeKind::Basic,
            CredentialEnvelope::ApiKey(_) => SchemeKind::ApiKey,
            CredentialEnvelope::BearerStatic(_) => SchemeKind::BearerStatic,
            CredentialEnvelope::BearerToken(_) => SchemeKind::BearerToken,
        }
    }

    /// Build a password envelope
    pub fn password(subject: impl Into<String>, password: impl Into<String>) -> Self {
        CredentialEnvelope::Password {
            subject: subject.into(),
            password: password.into(),
        }
    }

    /// Build a Basic envelope
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        CredentialEnvelope::Basic {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for CredentialEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialEnvelope::Password { subject, .. } => f
                .debug_struct("Password")
                .field("subject", subject)
                .field("password", &"[REDACTED]")
                .finish(),
            CredentialEnvelope::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            other => write!(f, "{}([REDACTED])", other.scheme()),
        }
    }
}

/// Everything the gateway needs to decide one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Route identifier used to select the route policy
    pub route: String,

    /// Effective client address as resolved by the transport
    pub client_addr: Option<IpAddr>,

    /// Presented credential, if any
    pub credential: Option<CredentialEnvelope>,
}

impl RequestContext {
    /// Create a context for a route with no address and no credential
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            client_addr: None,
            credential: None,
        }
    }

    /// Set the client address
    pub fn with_client_addr(mut self, addr: IpAddr) -> Self {
        self.client_addr = Some(addr);
        self
    }

    /// Set the credential envelope
    pub fn with_credential(mut self, credential: CredentialEnvelope) -> Self {
        self.credential = Some(credential);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_scheme() {
        assert_eq!(
            CredentialEnvelope::password("alice", "pw").scheme(),
            SchemeKind::Password
        );
        assert_eq!(
            CredentialEnvelope::basic("admin", "pw").scheme(),
            SchemeKind::Basic
        );
        assert_eq!(
            CredentialEnvelope::ApiKey("k".into()).scheme(),
            SchemeKind::ApiKey
        );
        assert_eq!(
            CredentialEnvelope::BearerStatic("t".into()).scheme(),
            SchemeKind::BearerStatic
        );
        assert_eq!(
            CredentialEnvelope::BearerToken("t".into()).scheme(),
            SchemeKind::BearerToken
        );
    }

    #[test]
    fn test_envelope_debug_redacts_secrets() {
        let rendered = format!("{:?}", CredentialEnvelope::password("alice", "hunter2"));
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));

        let rendered = format!("{:?}", CredentialEnvelope::ApiKey("mysecretkey".into()));
        assert_eq!(rendered, "api_key([REDACTED])");
    }

    #[test]
    fn test_scheme_kind_serde_accepts_both_spellings() {
        let parsed: SchemeKind = serde_json::from_str(r#""bearer_token""#).unwrap();
        assert_eq!(parsed, SchemeKind::BearerToken);

        let parsed: SchemeKind = serde_json::from_str(r#""apiKey""#).unwrap();
        assert_eq!(parsed, SchemeKind::ApiKey);

        assert_eq!(
            serde_json::to_string(&SchemeKind::BearerStatic).unwrap(),
            r#""bearer_static""#
        );
    }

    #[test]
    fn test_request_context_builder() {
        let ctx = RequestContext::new("/users/me")
            .with_client_addr("127.0.0.1".parse().unwrap())
            .with_credential(CredentialEnvelope::BearerToken("abc".into()));

        assert_eq!(ctx.route, "/users/me");
        assert_eq!(ctx.client_addr, Some("127.0.0.1".parse().unwrap()));
        assert_eq!(
            ctx.credential.map(|c| c.scheme()),
            Some(SchemeKind::BearerToken)
        );
    }

    #[test]
    fn test_shared_secret_subject() {
        assert_eq!(Subject::shared_secret().as_str(), "static");
        assert_eq!(Subject::from("alice").to_string(), "alice");
    }
}
