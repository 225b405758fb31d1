//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use auth_gateway::auth::{hash_password, AuthGateway, Clock, InMemorySecretStore};
use auth_gateway::config::{BasicPairConfig, Config, PasswordHashingConfig, RoutePolicyConfig};
use auth_gateway::models::SchemeKind;
use auth_gateway::server::{build_router, AppState};

/// Signing key used by every test configuration
pub const TEST_SIGNING_KEY: &str = "integration-signing-key-0123456789";

/// Configuration with one user, one key of each static kind and a gated `/info`
pub fn create_test_config() -> Config {
    let hashing = PasswordHashingConfig::fast_for_tests();

    let mut config = Config::default();
    config.auth.password_hashing = hashing.clone();
    config.auth.signing_key = Some(TEST_SIGNING_KEY.to_string());
    config.auth.users.insert(
        "alice".to_string(),
        hash_password("password", &hashing).expect("Failed to hash test password"),
    );
    config.auth.api_keys = vec!["mysecretkey".to_string()];
    config.auth.bearer_tokens = vec!["yourtokenhere".to_string()];
    config.auth.basic = Some(BasicPairConfig {
        username: "admin".to_string(),
        password: "password".to_string(),
    });

    config.network.allowed_ips = vec!["127.0.0.1".parse().unwrap()];
    config.network.trust_forwarded_header = true;

    config.routes.insert(
        "/info".to_string(),
        RoutePolicyConfig {
            schemes: vec![SchemeKind::Password, SchemeKind::BearerToken],
            network_gate: true,
        },
    );

    config
}

/// Build the store from a configuration
pub fn create_test_store(config: &Config) -> Arc<InMemorySecretStore> {
    Arc::new(InMemorySecretStore::from_config(&config.auth).expect("Failed to build test store"))
}

/// Build a gateway over a store
pub fn create_test_gateway(
    store: Arc<InMemorySecretStore>,
    config: &Config,
    clock: Arc<dyn Clock>,
) -> Arc<AuthGateway> {
    Arc::new(AuthGateway::new(store, config, clock).expect("Failed to build test gateway"))
}

/// Run a test server in the background and return the address
/// The server will be shut down when the returned shutdown sender is dropped or sent
pub async fn run_test_server(state: AppState) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local address");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let app = build_router(state).layer(tower_http::trace::TraceLayer::new_for_http());

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        })
        .await
        .expect("Server error");
    });

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    (addr, shutdown_tx)
}
