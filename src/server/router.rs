//! HTTP router for auth-gateway
//!
//! This module defines the axum router that handles all HTTP requests.
//! It provides routes for:
//! - Health checks
//! - Token issuance after password login
//! - Protected endpoints that report the authenticated subject

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::AuthGateway;
use crate::config::NetworkConfig;
use crate::models::SchemeKind;

use super::middleware::{auth_middleware, AuthenticatedSubject};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Authentication gateway
    pub gateway: Arc<AuthGateway>,

    /// Take the client address from `X-Forwarded-For`
    pub trust_forwarded_header: bool,
}

impl AppState {
    /// Create state around a gateway
    pub fn new(gateway: Arc<AuthGateway>, network: &NetworkConfig) -> Self {
        Self {
            gateway,
            trust_forwarded_header: network.trust_forwarded_header,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Token endpoint response
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// Current user response
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub username: String,
}

/// Info endpoint response
#[derive(Debug, Serialize, Deserialize)]
pub struct InfoResponse {
    pub current_time: String,
    pub subject: String,
}

/// Build the main application router
///
/// Every route except `/health` runs behind [`auth_middleware`]; the policy
/// for each path comes from the gateway's route configuration.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/token", post(token_handler))
        .route("/users/me", get(users_me_handler))
        .route("/info", get(info_handler))
        .route("/docs", get(docs_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .merge(protected)
        .with_state(state)
}

/// Health check endpoint handler
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Issue a signed token to a subject that logged in with a password
async fn token_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedSubject>,
) -> Response {
    if auth.scheme != Some(SchemeKind::Password) {
        return error_response(StatusCode::UNAUTHORIZED, "Unauthorized");
    }

    match state.gateway.issue_token(&auth.subject) {
        Ok(issued) => Json(TokenResponse {
            access_token: issued.access_token,
            token_type: issued.token_type,
            expires_in: issued.expires_in,
        })
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, subject = %auth.subject, "Failed to issue token");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// Report the authenticated subject
async fn users_me_handler(Extension(auth): Extension<AuthenticatedSubject>) -> impl IntoResponse {
    Json(UserResponse {
        username: auth.subject.to_string(),
    })
}

/// Server time for an authenticated caller
async fn info_handler(Extension(auth): Extension<AuthenticatedSubject>) -> impl IntoResponse {
    Json(InfoResponse {
        current_time: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        subject: auth.subject.to_string(),
    })
}

/// Endpoint listing, for callers holding a static key
async fn docs_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "auth-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/health", "/token", "/users/me", "/info", "/docs"]
    }))
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{hash_password, InMemorySecretStore, ManualClock, SigningKey, StaticKind};
    use crate::config::{Config, PasswordHashingConfig};
    use axum_test::TestServer;

    fn create_test_state() -> AppState {
        let hashing = PasswordHashingConfig::fast_for_tests();
        let store = InMemorySecretStore::new(SigningKey::new(
            "primary",
            "0123456789abcdef0123456789abcdef",
        ))
        .with_user("alice", hash_password("password", &hashing).unwrap())
        .with_static_key(StaticKind::ApiKey, "mysecretkey");

        let mut config = Config::default();
        config.auth.password_hashing = hashing;

        let gateway = AuthGateway::new(
            Arc::new(store),
            &config,
            Arc::new(ManualClock::starting_now()),
        )
        .unwrap();
        AppState::new(Arc::new(gateway), &config.network)
    }

    // Test 1: Health endpoint returns OK without credentials
    #[tokio::test]
    async fn test_health_endpoint_returns_ok() {
        let server = TestServer::new(build_router(create_test_state())).unwrap();

        let response = server.get("/health").await;
        response.assert_status_ok();

        let body: HealthResponse = response.json();
        assert_eq!(body.status, "healthy");
        assert!(!body.version.is_empty());
    }

    // Test 2: Token endpoint issues a bearer token for a password login
    #[tokio::test]
    async fn test_token_endpoint_issues_token() {
        let server = TestServer::new(build_router(create_test_state())).unwrap();

        let response = server
            .post("/token")
            .add_query_param("username", "alice")
            .add_query_param("password", "password")
            .await;
        response.assert_status_ok();

        let body: TokenResponse = response.json();
        assert_eq!(body.token_type, "bearer");
        assert_eq!(body.expires_in, 3600);
        assert_eq!(body.access_token.split('.').count(), 3);
    }

    // Test 3: Token endpoint refuses a wrong password
    #[tokio::test]
    async fn test_token_endpoint_wrong_password() {
        let server = TestServer::new(build_router(create_test_state())).unwrap();

        let response = server
            .post("/token")
            .add_query_param("username", "alice")
            .add_query_param("password", "wrong")
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);

        let body: serde_json::Value = response.json();
        assert_eq!(body["error"], "Unauthorized");
    }

    // Test 4: Users/me returns the token subject
    #[tokio::test]
    async fn test_users_me_with_token() {
        let server = TestServer::new(build_router(create_test_state())).unwrap();

        let token: TokenResponse = server
            .post("/token")
            .add_query_param("username", "alice")
            .add_query_param("password", "password")
            .await
            .json();

        let response = server
            .get("/users/me")
            .add_header(
                axum::http::header::AUTHORIZATION,
                axum::http::HeaderValue::from_str(&format!("Bearer {}", token.access_token))
                    .unwrap(),
            )
            .await;
        response.assert_status_ok();

        let body: UserResponse = response.json();
        assert_eq!(body.username, "alice");
    }

    // Test 5: Docs endpoint requires a static key
    #[tokio::test]
    async fn test_docs_requires_api_key() {
        let server = TestServer::new(build_router(create_test_state())).unwrap();

        server.get("/docs").await.assert_status(StatusCode::UNAUTHORIZED);

        server
            .get("/docs")
            .add_query_param("api_key", "mysecretkey")
            .await
            .assert_status_ok();
    }

    // Test 6: Unknown routes are not protected routes
    #[tokio::test]
    async fn test_unknown_route_not_found() {
        let server = TestServer::new(build_router(create_test_state())).unwrap();
        server
            .get("/nope")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
