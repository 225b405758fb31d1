//! auth-gateway - Pluggable authentication gateway for HTTP endpoints
//!
//! This crate verifies passwords, static keys and signed tokens behind a
//! single entry point, with an optional IP allow-list in front of each route.

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod otel;
pub mod server;
