//! Authentication gateway
//!
//! The single entry point transports call. For each request it applies the
//! route's network gate, picks exactly one verifier from the credential's
//! scheme, and reports the outcome.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{Config, ConfigError, RoutePolicyConfig};
use crate::error::{AppError, IssueError, RejectReason};
use crate::models::{
    CredentialEnvelope, IssuedToken, RequestContext, SchemeKind, Subject, VerificationOutcome,
};
use crate::otel::Metrics;

use super::clock::Clock;
use super::network::NetworkGate;
use super::password::PasswordVerifier;
use super::static_key::{StaticCredentialVerifier, StaticKind};
use super::store::SecretStore;
use super::token::{TokenIssuer, TokenVerifier};

/// Accepted schemes and gating for one route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePolicy {
    schemes: Vec<SchemeKind>,
    network_gate: bool,
}

impl RoutePolicy {
    /// Policy accepting the given schemes, without network gating
    pub fn new(schemes: impl IntoIterator<Item = SchemeKind>) -> Self {
        Self {
            schemes: schemes.into_iter().collect(),
            network_gate: false,
        }
    }

    /// Require the caller address to pass the network gate
    pub fn with_network_gate(mut self) -> Self {
        self.network_gate = true;
        self
    }

    /// Whether a scheme is accepted
    pub fn accepts(&self, scheme: SchemeKind) -> bool {
        self.schemes.contains(&scheme)
    }

    /// Accepted schemes
    pub fn schemes(&self) -> &[SchemeKind] {
        &self.schemes
    }

    /// Whether the network gate applies
    pub fn is_network_gated(&self) -> bool {
        self.network_gate
    }
}

impl From<&RoutePolicyConfig> for RoutePolicy {
    fn from(config: &RoutePolicyConfig) -> Self {
        Self {
            schemes: config.schemes.clone(),
            network_gate: config.network_gate,
        }
    }
}

/// Authentication gateway
pub struct AuthGateway {
    passwords: PasswordVerifier,
    statics: StaticCredentialVerifier,
    issuer: TokenIssuer,
    tokens: TokenVerifier,
    network: NetworkGate,
    routes: HashMap<String, RoutePolicy>,
    default_route: RoutePolicy,
    token_ttl: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl AuthGateway {
    /// Build a gateway over `store` from the loaded configuration
    pub fn new(
        store: Arc<dyn SecretStore>,
        config: &Config,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        config.validate()?;

        let lookup_timeout = Duration::from_millis(config.auth.store_timeout_ms);
        let passwords = PasswordVerifier::new(
            Arc::clone(&store),
            &config.auth.password_hashing,
            lookup_timeout,
        )
        .map_err(|e| ConfigError::InvalidValue(format!("auth.password_hashing: {}", e)))?;

        Ok(Self {
            passwords,
            statics: StaticCredentialVerifier::new(Arc::clone(&store), lookup_timeout),
            issuer: TokenIssuer::new(Arc::clone(&store), Arc::clone(&clock)),
            tokens: TokenVerifier::new(store, clock, lookup_timeout),
            network: NetworkGate::new(config.network.allowed_ips.iter().copied()),
            routes: config
                .routes
                .iter()
                .map(|(path, policy)| (path.clone(), RoutePolicy::from(policy)))
                .collect(),
            default_route: RoutePolicy::from(&config.default_route),
            token_ttl: Duration::from_secs(config.auth.token_ttl_secs),
            metrics: None,
        })
    }

    /// Record outcomes into the given metrics
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Policy for a route, falling back to the default policy
    pub fn policy_for(&self, route: &str) -> &RoutePolicy {
        self.routes.get(route).unwrap_or(&self.default_route)
    }

    /// Lifetime of tokens minted by [`AuthGateway::issue_token`]
    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    /// Decide one request
    pub async fn authenticate(&self, ctx: &RequestContext) -> VerificationOutcome {
        let started = Instant::now();
        let scheme = ctx.credential.as_ref().map(CredentialEnvelope::scheme);

        let outcome = VerificationOutcome::from(self.decide(ctx).await);

        self.observe(ctx, scheme, &outcome, started.elapsed());
        outcome
    }

    async fn decide(&self, ctx: &RequestContext) -> Result<Subject, RejectReason> {
        let policy = self.policy_for(&ctx.route);

        if policy.is_network_gated() && !self.network.allows(ctx.client_addr) {
            return Err(RejectReason::ForbiddenNetwork);
        }

        let credential = match &ctx.credential {
            Some(credential) if policy.accepts(credential.scheme()) => credential,
            _ => return Err(RejectReason::MissingCredential),
        };

        match credential {
            CredentialEnvelope::Password { subject, password } => {
                self.passwords.verify(subject, password).await
            }
            CredentialEnvelope::Basic { username, password } => {
                self.statics.verify_basic(username, password).await
            }
            CredentialEnvelope::ApiKey(key) => self.statics.verify(StaticKind::ApiKey, key).await,
            CredentialEnvelope::BearerStatic(token) => {
                self.statics.verify(StaticKind::Bearer, token).await
            }
            CredentialEnvelope::BearerToken(token) => self.tokens.verify(token).await,
        }
    }

    fn observe(
        &self,
        ctx: &RequestContext,
        scheme: Option<SchemeKind>,
        outcome: &VerificationOutcome,
        elapsed: Duration,
    ) {
        let scheme = scheme.map(|s| s.as_str()).unwrap_or("none");

        match outcome {
            VerificationOutcome::Authenticated { subject } => {
                tracing::info!(
                    scheme = scheme,
                    route = %ctx.route,
                    subject = %subject,
                    "Authenticated"
                );
            }
            VerificationOutcome::Rejected { reason } => {
                tracing::warn!(
                    scheme = scheme,
                    route = %ctx.route,
                    reason = reason.code(),
                    "Authentication rejected"
                );
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_outcome(
                scheme,
                outcome.tag(),
                outcome.reason().map(|r| r.code()).unwrap_or(""),
            );
            metrics.record_verify_duration(scheme, elapsed.as_secs_f64());
        }
    }

    /// Mint a signed token for a subject that just passed primary authentication
    pub fn issue_token(&self, subject: &Subject) -> Result<IssuedToken, IssueError> {
        let issued = self.issuer.issue(subject, self.token_ttl)?;
        if let Some(metrics) = &self.metrics {
            metrics.record_token_issued();
        }
        Ok(issued)
    }
}
