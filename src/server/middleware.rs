//! HTTP middleware for auth-gateway
//!
//! This module turns HTTP requests into gateway calls:
//! - Credential extraction from headers and query parameters
//! - Client address resolution
//! - Mapping rejections onto generic refusals

use axum::{
    extract::{ConnectInfo, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use crate::auth::{resolve_client_ip, RoutePolicy};
use crate::models::{
    CredentialEnvelope, Refusal, RequestContext, SchemeKind, Subject, VerificationOutcome,
};

use super::router::AppState;

/// Header carrying a static API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header carrying the original client address when behind a proxy
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Authenticated subject extension for requests
#[derive(Clone, Debug)]
pub struct AuthenticatedSubject {
    /// Verified identity
    pub subject: Subject,

    /// Scheme the identity was verified with
    pub scheme: Option<SchemeKind>,
}

/// Authentication middleware function
///
/// Builds a [`RequestContext`] from the request, asks the gateway for a
/// decision and either forwards the request with an [`AuthenticatedSubject`]
/// extension or answers with a generic refusal.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthResponse> {
    let route = request.uri().path().to_string();
    let policy = state.gateway.policy_for(&route);

    let client_addr = client_addr(&request, state.trust_forwarded_header);
    let credential = extract_credential(request.headers(), request.uri(), policy);

    let mut ctx = RequestContext::new(route);
    ctx.client_addr = client_addr;
    ctx.credential = credential;

    match state.gateway.authenticate(&ctx).await {
        VerificationOutcome::Authenticated { subject } => {
            let scheme = ctx.credential.as_ref().map(CredentialEnvelope::scheme);
            request
                .extensions_mut()
                .insert(AuthenticatedSubject { subject, scheme });
            Ok(next.run(request).await)
        }
        VerificationOutcome::Rejected { reason } => {
            Err(AuthResponse::new(reason.refusal(), policy))
        }
    }
}

/// Effective client address of a request
///
/// The socket peer comes from `ConnectInfo` when the server was started with
/// connect info; without it only a trusted forwarding header can supply one.
fn client_addr(request: &Request, trust_forwarded: bool) -> Option<IpAddr> {
    let forwarded = request
        .headers()
        .get(FORWARDED_FOR_HEADER)
        .and_then(|v| v.to_str().ok());

    match request.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(peer)) => Some(resolve_client_ip(forwarded, peer.ip(), trust_forwarded)),
        None if trust_forwarded => forwarded
            .and_then(|v| v.split(',').next())
            .and_then(|first| first.trim().parse().ok()),
        None => None,
    }
}

/// Pull the credential for a route out of a request
///
/// Every credential present is collected in a fixed order: `Authorization`
/// header, `X-API-Key` header, `api_key` query parameter, then `username` and
/// `password` query parameters. The first one whose scheme the route accepts
/// wins; if none is accepted the first one found is returned so the gateway
/// can reject it.
pub fn extract_credential(
    headers: &HeaderMap,
    uri: &Uri,
    policy: &RoutePolicy,
) -> Option<CredentialEnvelope> {
    let mut found = Vec::new();

    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(credential) = parse_authorization(value, policy) {
            found.push(credential);
        }
    }

    if let Some(key) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        found.push(CredentialEnvelope::ApiKey(key.to_string()));
    }

    let query = Query::<HashMap<String, String>>::try_from_uri(uri)
        .map(|Query(params)| params)
        .unwrap_or_default();

    if let Some(key) = query.get("api_key") {
        found.push(CredentialEnvelope::ApiKey(key.clone()));
    }
    if let (Some(username), Some(password)) = (query.get("username"), query.get("password")) {
        found.push(CredentialEnvelope::password(username, password));
    }

    let accepted = found.iter().position(|c| policy.accepts(c.scheme()));
    match accepted {
        Some(index) => Some(found.swap_remove(index)),
        None => found.into_iter().next(),
    }
}

/// Parse an `Authorization` header value
fn parse_authorization(value: &str, policy: &RoutePolicy) -> Option<CredentialEnvelope> {
    let (scheme, rest) = value.split_once(' ')?;
    let rest = rest.trim();

    if scheme.eq_ignore_ascii_case("basic") {
        let decoded = STANDARD.decode(rest).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        Some(CredentialEnvelope::basic(username, password))
    } else if scheme.eq_ignore_ascii_case("bearer") {
        if policy.accepts(SchemeKind::BearerToken) {
            Some(CredentialEnvelope::BearerToken(rest.to_string()))
        } else {
            Some(CredentialEnvelope::BearerStatic(rest.to_string()))
        }
    } else {
        None
    }
}

/// Authentication error response
///
/// Carries only the externally visible refusal class, never the internal
/// rejection reason.
pub struct AuthResponse {
    status: StatusCode,
    message: &'static str,
    challenge: Option<&'static str>,
}

impl AuthResponse {
    fn new(refusal: Refusal, policy: &RoutePolicy) -> Self {
        let status = match refusal {
            Refusal::Unauthorized => StatusCode::UNAUTHORIZED,
            Refusal::Forbidden => StatusCode::FORBIDDEN,
            Refusal::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        let challenge = match refusal {
            Refusal::Unauthorized => Some(challenge_for(policy)),
            _ => None,
        };

        Self {
            status,
            message: refusal.message(),
            challenge,
        }
    }
}

/// `WWW-Authenticate` challenge for a route
fn challenge_for(policy: &RoutePolicy) -> &'static str {
    let bearer = policy.accepts(SchemeKind::BearerToken) || policy.accepts(SchemeKind::BearerStatic);
    if !bearer && policy.accepts(SchemeKind::Basic) {
        "Basic realm=\"auth-gateway\""
    } else {
        "Bearer"
    }
}

impl IntoResponse for AuthResponse {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        let mut response = (
            self.status,
            [(header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response();

        if let Some(challenge) = self.challenge {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(challenge));
        }
        response
    }
}
