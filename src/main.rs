//! auth-gateway - Pluggable authentication gateway for HTTP endpoints
//!
//! This is the main entry point for the auth-gateway application.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info};

use auth_gateway::auth::{hash_password, AuthGateway, InMemorySecretStore, SystemClock};
use auth_gateway::config::Config;
use auth_gateway::otel::{init_tracing, Metrics, OtelProvider};
use auth_gateway::server::{AppState, Server};

/// auth-gateway - Pluggable authentication gateway for HTTP endpoints
#[derive(Parser, Debug)]
#[command(name = "auth-gateway")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "AUTH_GATEWAY_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,

    /// Print an Argon2id hash for provisioning `auth.users`
    HashPassword {
        /// Password to hash
        password: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::HashPassword { password } => {
            let hash = hash_password(&password, &config.auth.password_hashing)?;
            println!("{}", hash);
            Ok(())
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let otel_provider = OtelProvider::new(&config.otel)?;
    init_tracing(&otel_provider, &config.logging.level)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting auth-gateway");

    config.validate()?;

    let store = Arc::new(InMemorySecretStore::from_config(&config.auth)?);
    info!(
        subjects = store.subject_count(),
        key_id = %config.auth.signing_key_id,
        "Secret store initialized"
    );

    let metrics = Arc::new(Metrics::new(&otel_provider.meter()));
    let gateway = AuthGateway::new(store, &config, Arc::new(SystemClock))?.with_metrics(metrics);
    info!(
        routes = config.routes.len(),
        allowed_ips = config.network.allowed_ips.len(),
        trust_forwarded_header = config.network.trust_forwarded_header,
        "Authentication gateway initialized"
    );

    let state = AppState::new(Arc::new(gateway), &config.network);
    let server = Server::new(config.server.clone(), state);

    info!(
        host = %config.server.host,
        port = %config.server.port,
        "Starting HTTP server"
    );

    let result = server.run(shutdown_signal()).await;

    if let Err(e) = otel_provider.shutdown() {
        error!(error = %e, "Failed to shutdown OpenTelemetry");
    }

    info!("auth-gateway shutdown complete");

    result.map_err(Into::into)
}

/// Load configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => {
            // Tracing is not initialized yet.
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
        None => {
            eprintln!("Loading configuration from environment variables");
            Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
    }
}

/// Create a future that resolves when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
