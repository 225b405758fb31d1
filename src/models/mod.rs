//! Domain models for auth-gateway
//!
//! This module contains the values exchanged between the transport layer,
//! the gateway and the verifiers.

pub mod credential;
pub mod outcome;
pub mod token;

// Re-export commonly used types
pub use credential::{CredentialEnvelope, RequestContext, SchemeKind, Subject};
pub use outcome::{Refusal, VerificationOutcome};
pub use token::{IssuedToken, TokenClaims};
