//! Authentication core for auth-gateway
//!
//! This module provides the verification pipeline:
//! - Secret store holding hashes, static keys and the signing key
//! - Per-scheme verifiers (password, static secrets, signed tokens)
//! - Network gate
//! - The gateway that routes each request to exactly one verifier

pub mod clock;
pub mod gateway;
pub mod network;
pub mod password;
pub mod static_key;
pub mod store;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use gateway::{AuthGateway, RoutePolicy};
pub use network::{resolve_client_ip, NetworkGate};
pub use password::{hash_password, verify_password, HashError, PasswordVerifier};
pub use static_key::{StaticCredentialVerifier, StaticKind};
pub use store::{InMemorySecretStore, SecretStore, SigningKey};
pub use token::{TokenIssuer, TokenVerifier};
