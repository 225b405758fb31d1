//! Configuration management for auth-gateway
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

use crate::models::SchemeKind;

/// Longest accepted token lifetime, ten years
pub const MAX_TOKEN_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Credential and token configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Network gate configuration
    #[serde(default)]
    pub network: NetworkConfig,

    /// Per-route policies keyed by request path
    #[serde(default = "default_routes")]
    pub routes: HashMap<String, RoutePolicyConfig>,

    /// Policy for paths without an entry in `routes`
    #[serde(default)]
    pub default_route: RoutePolicyConfig,

    /// OpenTelemetry configuration
    #[serde(default)]
    pub otel: OtelConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            network: NetworkConfig::default(),
            routes: default_routes(),
            default_route: RoutePolicyConfig::default(),
            otel: OtelConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(yaml);
        serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))
    }

    /// Load configuration from environment variables with prefix AUTH_GATEWAY_
    ///
    /// List values (`API_KEYS`, `BEARER_TOKENS`, `ALLOWED_IPS`, `GATED_ROUTES`)
    /// are comma-separated. `AUTH_USERS` holds `subject=hash` entries and
    /// `ROUTES` holds `path=scheme,scheme` entries, both separated by `;`
    /// since PHC hashes and scheme lists contain commas.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Ok(host) = std::env::var("AUTH_GATEWAY_SERVER_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("AUTH_GATEWAY_SERVER_PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid port number".to_string()))?;
        }

        if let Ok(key) = std::env::var("AUTH_GATEWAY_AUTH_SIGNING_KEY") {
            config.auth.signing_key = Some(key);
        }
        if let Ok(key_id) = std::env::var("AUTH_GATEWAY_AUTH_SIGNING_KEY_ID") {
            config.auth.signing_key_id = key_id;
        }
        if let Ok(ttl) = std::env::var("AUTH_GATEWAY_AUTH_TOKEN_TTL_SECS") {
            config.auth.token_ttl_secs = ttl
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid token TTL".to_string()))?;
        }
        if let Ok(keys) = std::env::var("AUTH_GATEWAY_AUTH_API_KEYS") {
            config.auth.api_keys = split_list(&keys);
        }
        if let Ok(tokens) = std::env::var("AUTH_GATEWAY_AUTH_BEARER_TOKENS") {
            config.auth.bearer_tokens = split_list(&tokens);
        }
        if let Ok(users) = std::env::var("AUTH_GATEWAY_AUTH_USERS") {
            config.auth.users = parse_users(&users)?;
        }
        match (
            std::env::var("AUTH_GATEWAY_AUTH_BASIC_USERNAME"),
            std::env::var("AUTH_GATEWAY_AUTH_BASIC_PASSWORD"),
        ) {
            (Ok(username), Ok(password)) => {
                config.auth.basic = Some(BasicPairConfig { username, password });
            }
            (Err(_), Err(_)) => {}
            (Ok(_), Err(_)) => {
                return Err(ConfigError::MissingRequired(
                    "AUTH_GATEWAY_AUTH_BASIC_PASSWORD".to_string(),
                ))
            }
            (Err(_), Ok(_)) => {
                return Err(ConfigError::MissingRequired(
                    "AUTH_GATEWAY_AUTH_BASIC_USERNAME".to_string(),
                ))
            }
        }
        if let Some(timeout) = env_number("AUTH_GATEWAY_AUTH_STORE_TIMEOUT_MS")? {
            config.auth.store_timeout_ms = timeout;
        }
        if let Some(memory) = env_number("AUTH_GATEWAY_AUTH_PASSWORD_HASHING_MEMORY_KIB")? {
            config.auth.password_hashing.memory_kib = memory;
        }
        if let Some(iterations) = env_number("AUTH_GATEWAY_AUTH_PASSWORD_HASHING_ITERATIONS")? {
            config.auth.password_hashing.iterations = iterations;
        }
        if let Some(parallelism) = env_number("AUTH_GATEWAY_AUTH_PASSWORD_HASHING_PARALLELISM")? {
            config.auth.password_hashing.parallelism = parallelism;
        }

        if let Ok(ips) = std::env::var("AUTH_GATEWAY_NETWORK_ALLOWED_IPS") {
            config.network.allowed_ips = split_list(&ips)
                .iter()
                .map(|ip| {
                    ip.parse().map_err(|_| {
                        ConfigError::InvalidValue(format!("network.allowed_ips: {}", ip))
                    })
                })
                .collect::<Result<_, _>>()?;
        }
        if let Ok(trust) = std::env::var("AUTH_GATEWAY_NETWORK_TRUST_FORWARDED_HEADER") {
            config.network.trust_forwarded_header = trust.parse().unwrap_or(false);
        }

        if let Ok(routes) = std::env::var("AUTH_GATEWAY_ROUTES") {
            for (path, schemes) in parse_routes(&routes)? {
                config.routes.entry(path).or_default().schemes = schemes;
            }
        }
        if let Ok(schemes) = std::env::var("AUTH_GATEWAY_DEFAULT_ROUTE_SCHEMES") {
            config.default_route.schemes = parse_schemes("default_route", &schemes)?;
        }
        if let Ok(gated) = std::env::var("AUTH_GATEWAY_GATED_ROUTES") {
            for path in split_list(&gated) {
                config.routes.entry(path).or_default().network_gate = true;
            }
        }

        if let Ok(enabled) = std::env::var("AUTH_GATEWAY_OTEL_ENABLED") {
            config.otel.enabled = enabled.parse().unwrap_or(false);
        }
        if let Ok(endpoint) = std::env::var("AUTH_GATEWAY_OTEL_ENDPOINT") {
            config.otel.endpoint = Some(endpoint);
        }

        if let Ok(service_name) = std::env::var("AUTH_GATEWAY_OTEL_SERVICE_NAME") {
            config.otel.service_name = service_name;
        }

        if let Ok(level) = std::env::var("AUTH_GATEWAY_LOGGING_LEVEL") {
            config.logging.level = level;
        }

        Ok(config)
    }

    /// Check values serde cannot check on its own
    ///
    /// Secret material (hash format, signing key length) is checked when the
    /// secret store is built from this configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.token_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "auth.token_ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.auth.token_ttl_secs > MAX_TOKEN_TTL_SECS {
            return Err(ConfigError::InvalidValue(format!(
                "auth.token_ttl_secs must not exceed {}",
                MAX_TOKEN_TTL_SECS
            )));
        }
        if self.auth.store_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "auth.store_timeout_ms must be greater than zero".to_string(),
            ));
        }

        let routes = self
            .routes
            .iter()
            .map(|(path, policy)| (path.as_str(), policy))
            .chain(std::iter::once(("default_route", &self.default_route)));

        for (name, policy) in routes {
            if policy.schemes.is_empty() {
                return Err(ConfigError::InvalidValue(format!(
                    "routes.{}: at least one scheme is required",
                    name
                )));
            }
            if policy.network_gate && self.network.allowed_ips.is_empty() {
                return Err(ConfigError::InvalidValue(format!(
                    "routes.{}: network_gate requires network.allowed_ips",
                    name
                )));
            }
        }

        Ok(())
    }
}

fn split_list(value: &str) -> Vec<String> {
    split_on(value, ',')
}

fn split_on(value: &str, separator: char) -> Vec<String> {
    value
        .split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn env_number<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Parse(format!("Invalid number in {}", name))),
        Err(_) => Ok(None),
    }
}

/// Parse `subject=hash;subject=hash`
///
/// Errors name the entry's subject only; hashes are never echoed.
fn parse_users(value: &str) -> Result<HashMap<String, String>, ConfigError> {
    split_on(value, ';')
        .into_iter()
        .map(|entry| match entry.split_once('=') {
            Some((subject, hash)) if !subject.trim().is_empty() && !hash.trim().is_empty() => {
                Ok((subject.trim().to_string(), hash.trim().to_string()))
            }
            Some((subject, _)) if !subject.contains('$') => Err(ConfigError::InvalidValue(format!(
                "auth.users: entry for '{}' needs a subject and a hash",
                subject.trim()
            ))),
            _ => Err(ConfigError::InvalidValue(
                "auth.users: entries must be subject=hash".to_string(),
            )),
        })
        .collect()
}

/// Parse `path=scheme,scheme;path=scheme`
fn parse_routes(value: &str) -> Result<Vec<(String, Vec<SchemeKind>)>, ConfigError> {
    split_on(value, ';')
        .into_iter()
        .map(|entry| -> Result<(String, Vec<SchemeKind>), ConfigError> {
            let (path, schemes) = entry.split_once('=').ok_or_else(|| {
                ConfigError::InvalidValue(format!("routes: '{}' must be path=schemes", entry))
            })?;
            let path = path.trim();
            Ok((path.to_string(), parse_schemes(path, schemes)?))
        })
        .collect()
}

fn parse_schemes(route: &str, value: &str) -> Result<Vec<SchemeKind>, ConfigError> {
    split_list(value)
        .iter()
        .map(|name| {
            serde_yaml::from_str::<SchemeKind>(name).map_err(|_| {
                ConfigError::InvalidValue(format!("routes.{}: unknown scheme '{}'", route, name))
            })
        })
        .collect()
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Credential and token configuration
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    /// Provisioned subjects and their Argon2 PHC password hashes
    #[serde(default)]
    pub users: HashMap<String, String>,

    /// Static API keys
    #[serde(default)]
    pub api_keys: Vec<String>,

    /// Fixed bearer tokens
    #[serde(default)]
    pub bearer_tokens: Vec<String>,

    /// Fixed Basic username/password pair
    #[serde(default)]
    pub basic: Option<BasicPairConfig>,

    /// HMAC key for signed tokens
    pub signing_key: Option<String>,

    /// Identifier embedded in issued tokens
    #[serde(default = "default_signing_key_id")]
    pub signing_key_id: String,

    /// Lifetime of issued tokens in seconds
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,

    /// Deadline for a single secret store lookup
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,

    /// Argon2 work factors for new hashes
    #[serde(default)]
    pub password_hashing: PasswordHashingConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            users: HashMap::new(),
            api_keys: Vec::new(),
            bearer_tokens: Vec::new(),
            basic: None,
            signing_key: None,
            signing_key_id: default_signing_key_id(),
            token_ttl_secs: default_token_ttl(),
            store_timeout_ms: default_store_timeout(),
            password_hashing: PasswordHashingConfig::default(),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("users", &self.users.keys().collect::<Vec<_>>())
            .field("api_keys", &self.api_keys.len())
            .field("bearer_tokens", &self.bearer_tokens.len())
            .field("basic", &self.basic)
            .field("signing_key", &self.signing_key.as_ref().map(|_| "[REDACTED]"))
            .field("signing_key_id", &self.signing_key_id)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("store_timeout_ms", &self.store_timeout_ms)
            .field("password_hashing", &self.password_hashing)
            .finish()
    }
}

fn default_signing_key_id() -> String {
    "primary".to_string()
}

fn default_token_ttl() -> u64 {
    3600
}

fn default_store_timeout() -> u64 {
    500
}

/// Fixed Basic credential pair
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct BasicPairConfig {
    /// Username; must not contain `:`
    pub username: String,

    /// Password
    pub password: String,
}

impl std::fmt::Debug for BasicPairConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicPairConfig")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Argon2id work factors
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PasswordHashingConfig {
    /// Memory cost in KiB
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,

    /// Number of passes
    #[serde(default = "default_iterations")]
    pub iterations: u32,

    /// Degree of parallelism
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

impl Default for PasswordHashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
        }
    }
}

impl PasswordHashingConfig {
    /// Minimal work factors, for tests only
    pub fn fast_for_tests() -> Self {
        Self {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }
}

fn default_memory_kib() -> u32 {
    19_456
}

fn default_iterations() -> u32 {
    2
}

fn default_parallelism() -> u32 {
    1
}

/// Network gate configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// Addresses admitted by the gate
    #[serde(default)]
    pub allowed_ips: Vec<IpAddr>,

    /// Take the client address from `X-Forwarded-For`
    ///
    /// Only safe behind a proxy that overwrites the header.
    #[serde(default)]
    pub trust_forwarded_header: bool,
}

/// Accepted schemes and gating for one route
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutePolicyConfig {
    /// Schemes accepted on this route
    #[serde(default = "default_route_schemes")]
    pub schemes: Vec<SchemeKind>,

    /// Apply the network gate before any credential check
    #[serde(default)]
    pub network_gate: bool,
}

impl Default for RoutePolicyConfig {
    fn default() -> Self {
        Self {
            schemes: default_route_schemes(),
            network_gate: false,
        }
    }
}

fn default_route_schemes() -> Vec<SchemeKind> {
    vec![SchemeKind::BearerToken]
}

fn default_routes() -> HashMap<String, RoutePolicyConfig> {
    let route = |schemes: Vec<SchemeKind>| RoutePolicyConfig {
        schemes,
        network_gate: false,
    };

    HashMap::from([
        ("/token".to_string(), route(vec![SchemeKind::Password])),
        ("/users/me".to_string(), route(vec![SchemeKind::BearerToken])),
        (
            "/info".to_string(),
            route(vec![SchemeKind::Password, SchemeKind::BearerToken]),
        ),
        (
            "/docs".to_string(),
            route(vec![
                SchemeKind::ApiKey,
                SchemeKind::Basic,
                SchemeKind::BearerStatic,
            ]),
        ),
    ])
}

/// OpenTelemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OtelConfig {
    /// Whether OpenTelemetry is enabled
    #[serde(default)]
    pub enabled: bool,

    /// OTLP endpoint URL
    pub endpoint: Option<String>,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            service_name: default_service_name(),
        }
    }
}

fn default_service_name() -> String {
    "auth-gateway".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax. Unset variables are left as written.
fn expand_env_vars(input: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .expect("Invalid regex pattern for environment variable expansion");

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
