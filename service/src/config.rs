use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use payguard_crypto::{EncryptionKey, KeyError, SigningSecret};
use serde::{Deserialize, Deserializer, Serialize};
use serde_aux::prelude::deserialize_vec_from_string_or_vec;

use crate::protocol::{activity, freshness, nonce_ledger, rate_limiter, NonceCommit};

/// Application configuration loaded from multiple sources.
///
/// Configuration is loaded in priority order (lowest to highest):
/// 1. Struct defaults
/// 2. config.yaml file (if exists)
/// 3. Environment variables with PAYGUARD_ prefix (always wins)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub security_headers: SecurityHeadersConfig,
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub suspicious_activity: SuspiciousActivityConfig,
    #[serde(default)]
    pub checkout: CheckoutConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// HTTP server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// HTTP server bind address.
    #[serde(default = "default_host")]
    pub host: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level filter (debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Payment-request protocol parameters and key material.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProtocolConfig {
    /// Pre-shared AES-256 key, 64 hex characters. Required.
    #[serde(default)]
    pub encryption_key: String,

    /// Pre-shared HMAC secret. Required.
    #[serde(default)]
    pub signing_secret: String,

    /// Maximum allowed |server clock − client timestamp|, in milliseconds.
    #[serde(default = "default_freshness_tolerance_ms")]
    pub freshness_tolerance_ms: u64,

    /// How long a consumed nonce is remembered. Must exceed the freshness tolerance.
    #[serde(default = "default_nonce_retention_ms")]
    pub nonce_retention_ms: u64,

    /// Period of the background sweep over the nonce, rate and activity registries.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// When a claimed nonce becomes permanently consumed.
    #[serde(default)]
    pub nonce_commit: NonceCommit,

    /// Reject requests without a bearer token (default: true).
    #[serde(default = "default_true")]
    pub require_identity: bool,

    /// Upper bound on the payment provider and order store calls.
    #[serde(default = "default_downstream_timeout_ms")]
    pub downstream_timeout_ms: u64,
}

impl ProtocolConfig {
    /// Parse the configured encryption key.
    ///
    /// # Errors
    /// Returns [`KeyError`] if the key is not 64 hex characters.
    pub fn encryption_key(&self) -> Result<EncryptionKey, KeyError> {
        EncryptionKey::from_hex(&self.encryption_key)
    }

    #[must_use]
    pub fn signing_secret(&self) -> SigningSecret {
        SigningSecret::new(self.signing_secret.as_bytes())
    }
}

/// Fixed-window limiter keyed by (subject, origin).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests allowed per window (default: 5).
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length in milliseconds (default: 60000).
    #[serde(default = "default_rate_window_ms")]
    pub window_ms: u64,
}

/// Sliding-window abuse detector keyed by subject.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SuspiciousActivityConfig {
    /// Events tolerated inside the window before blocking (default: 10).
    #[serde(default = "default_suspicious_threshold")]
    pub threshold: usize,

    /// Trailing window in milliseconds (default: 300000).
    #[serde(default = "default_suspicious_window_ms")]
    pub window_ms: u64,
}

/// Order pricing and the in-memory collaborator adapters used by the binary.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckoutConfig {
    /// ISO 4217 currency passed to the payment provider (default: "INR").
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Role that bypasses the rate limiter (default: "admin").
    #[serde(default = "default_privileged_role")]
    pub privileged_role: String,

    /// Course catalog: price per course in minor currency units.
    #[serde(default)]
    pub courses: Vec<CoursePrice>,

    /// Static bearer tokens for the development identity provider.
    #[serde(default)]
    pub dev_tokens: Vec<DevToken>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoursePrice {
    pub id: String,
    pub amount: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DevToken {
    pub token: String,
    pub subject_id: String,
    #[serde(default = "default_role")]
    pub role: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests.
    /// Use `"*"` to allow any origin (not recommended for production).
    /// Accepts either an array or comma-separated string.
    /// Example: `["http://localhost:5173"]` or `"http://localhost:5173,https://app.example.com"`
    #[serde(
        default = "default_allowed_origins",
        deserialize_with = "deserialize_origins"
    )]
    pub allowed_origins: Vec<String>,
}

/// Deserialize origins from comma-separated string or array, filtering empty values.
fn deserialize_origins<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let origins: Vec<String> = deserialize_vec_from_string_or_vec(deserializer)?;
    Ok(origins.into_iter().filter(|s| !s.is_empty()).collect())
}

// These functions cannot be const because serde uses function pointers for defaults
#[allow(clippy::missing_const_for_fn)]
fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_freshness_tolerance_ms() -> u64 {
    freshness::DEFAULT_TOLERANCE_MS
}

#[allow(clippy::missing_const_for_fn)]
fn default_nonce_retention_ms() -> u64 {
    nonce_ledger::DEFAULT_RETENTION_MS
}

#[allow(clippy::missing_const_for_fn)]
fn default_sweep_interval_ms() -> u64 {
    60_000
}

#[allow(clippy::missing_const_for_fn)]
fn default_downstream_timeout_ms() -> u64 {
    10_000
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_requests() -> u32 {
    rate_limiter::DEFAULT_MAX_REQUESTS
}

#[allow(clippy::missing_const_for_fn)]
fn default_rate_window_ms() -> u64 {
    rate_limiter::DEFAULT_WINDOW_MS
}

#[allow(clippy::missing_const_for_fn)]
fn default_suspicious_threshold() -> usize {
    activity::DEFAULT_THRESHOLD
}

#[allow(clippy::missing_const_for_fn)]
fn default_suspicious_window_ms() -> u64 {
    activity::DEFAULT_WINDOW_MS
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_privileged_role() -> String {
    "admin".to_string()
}

fn default_role() -> String {
    "student".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_allowed_origins() -> Vec<String> {
    // Default to empty (no cross-origin requests allowed) - safe for production
    // Configure explicitly via PAYGUARD_CORS__ALLOWED_ORIGINS or config.yaml
    vec![]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_rate_window_ms(),
        }
    }
}

impl Default for SuspiciousActivityConfig {
    fn default() -> Self {
        Self {
            threshold: default_suspicious_threshold(),
            window_ms: default_suspicious_window_ms(),
        }
    }
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            privileged_role: default_privileged_role(),
            courses: Vec::new(),
            dev_tokens: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecurityHeadersConfig {
    /// Enable security headers (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Enable HSTS header (default: false, enable in production with HTTPS).
    #[serde(default)]
    pub hsts_enabled: bool,

    /// HSTS max-age in seconds (default: 31536000 = 1 year).
    #[serde(default = "default_hsts_max_age")]
    pub hsts_max_age: u64,

    /// Include subdomains in HSTS (default: true).
    #[serde(default = "default_true")]
    pub hsts_include_subdomains: bool,

    /// X-Frame-Options value: "DENY" or "SAMEORIGIN" (default: "DENY").
    #[serde(default = "default_frame_options")]
    pub frame_options: String,

    /// Content-Security-Policy header value (default: "default-src 'none'").
    #[serde(default = "default_csp")]
    pub content_security_policy: String,

    /// Referrer-Policy header value (default: "no-referrer").
    #[serde(default = "default_referrer_policy")]
    pub referrer_policy: String,
}

#[allow(clippy::missing_const_for_fn)]
fn default_true() -> bool {
    true
}

#[allow(clippy::missing_const_for_fn)]
fn default_hsts_max_age() -> u64 {
    31_536_000 // 1 year
}

fn default_frame_options() -> String {
    "DENY".to_string()
}

fn default_csp() -> String {
    "default-src 'none'".to_string()
}

fn default_referrer_policy() -> String {
    "no-referrer".to_string()
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            hsts_enabled: false,
            hsts_max_age: default_hsts_max_age(),
            hsts_include_subdomains: default_true(),
            frame_options: default_frame_options(),
            content_security_policy: default_csp(),
            referrer_policy: default_referrer_policy(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: default_port(),
                host: default_host(),
            },
            logging: LoggingConfig {
                level: default_log_level(),
            },
            cors: CorsConfig::default(),
            security_headers: SecurityHeadersConfig::default(),
            protocol: ProtocolConfig {
                encryption_key: String::new(),
                signing_secret: String::new(),
                freshness_tolerance_ms: default_freshness_tolerance_ms(),
                nonce_retention_ms: default_nonce_retention_ms(),
                sweep_interval_ms: default_sweep_interval_ms(),
                nonce_commit: NonceCommit::default(),
                require_identity: default_true(),
                downstream_timeout_ms: default_downstream_timeout_ms(),
            },
            rate_limit: RateLimitConfig::default(),
            suspicious_activity: SuspiciousActivityConfig::default(),
            checkout: CheckoutConfig::default(),
        }
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Sources are merged in priority order:
    /// 1. Struct defaults (lowest)
    /// 2. config.yaml file (if exists)
    /// 3. Environment variables with PAYGUARD_ prefix (highest)
    ///
    /// # Errors
    /// Returns an error if configuration cannot be loaded or is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config.yaml")
    }

    /// Load configuration with a custom YAML file path.
    ///
    /// # Errors
    /// Returns an error if configuration cannot be loaded or is invalid.
    pub fn load_from(yaml_path: &str) -> Result<Self, ConfigError> {
        let config: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Yaml::file(yaml_path))
            .merge(Env::prefixed("PAYGUARD_").split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let protocol = &self.protocol;

        // Key material is required and must parse
        if protocol.encryption_key.is_empty() {
            return Err(ConfigError::Validation(
                "protocol.encryption_key is required. Set PAYGUARD_PROTOCOL__ENCRYPTION_KEY environment variable or configure in config.yaml.".into(),
            ));
        }
        if let Err(e) = protocol.encryption_key() {
            return Err(ConfigError::Validation(format!(
                "protocol.encryption_key is invalid: {e}"
            )));
        }
        if protocol.signing_secret.is_empty() {
            return Err(ConfigError::Validation(
                "protocol.signing_secret is required. Set PAYGUARD_PROTOCOL__SIGNING_SECRET environment variable or configure in config.yaml.".into(),
            ));
        }

        if protocol.freshness_tolerance_ms == 0 {
            return Err(ConfigError::Validation(
                "protocol.freshness_tolerance_ms cannot be 0".into(),
            ));
        }

        // A nonce must outlive every timestamp that could still pass the freshness gate
        if protocol.nonce_retention_ms <= protocol.freshness_tolerance_ms {
            return Err(ConfigError::Validation(format!(
                "protocol.nonce_retention_ms ({}) must exceed protocol.freshness_tolerance_ms ({})",
                protocol.nonce_retention_ms, protocol.freshness_tolerance_ms
            )));
        }

        if protocol.sweep_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "protocol.sweep_interval_ms cannot be 0".into(),
            ));
        }

        if protocol.downstream_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "protocol.downstream_timeout_ms cannot be 0".into(),
            ));
        }

        // A reservation held across the downstream call must not be swept mid-flight
        if protocol.downstream_timeout_ms >= protocol.nonce_retention_ms {
            return Err(ConfigError::Validation(format!(
                "protocol.downstream_timeout_ms ({}) must be below protocol.nonce_retention_ms ({})",
                protocol.downstream_timeout_ms, protocol.nonce_retention_ms
            )));
        }

        if self.rate_limit.max_requests == 0 {
            return Err(ConfigError::Validation(
                "rate_limit.max_requests cannot be 0".into(),
            ));
        }
        if self.rate_limit.window_ms == 0 {
            return Err(ConfigError::Validation(
                "rate_limit.window_ms cannot be 0".into(),
            ));
        }

        if self.suspicious_activity.threshold == 0 {
            return Err(ConfigError::Validation(
                "suspicious_activity.threshold cannot be 0".into(),
            ));
        }
        if self.suspicious_activity.window_ms == 0 {
            return Err(ConfigError::Validation(
                "suspicious_activity.window_ms cannot be 0".into(),
            ));
        }

        let currency = &self.checkout.currency;
        if currency.len() != 3 || !currency.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(ConfigError::Validation(format!(
                "checkout.currency must be a 3-letter ISO 4217 code, got: '{currency}'"
            )));
        }

        // Port must be non-zero
        if self.server.port == 0 {
            return Err(ConfigError::Validation("server.port cannot be 0".into()));
        }

        // CORS origins must be valid URLs or "*"
        for origin in &self.cors.allowed_origins {
            if origin != "*" && !origin.starts_with("http://") && !origin.starts_with("https://") {
                return Err(ConfigError::Validation(format!(
                    "cors.allowed_origins contains invalid origin '{origin}'. Must be '*' or start with http:// or https://"
                )));
            }
        }

        // X-Frame-Options must be DENY or SAMEORIGIN
        let frame_opts = self.security_headers.frame_options.to_uppercase();
        if frame_opts != "DENY" && frame_opts != "SAMEORIGIN" {
            return Err(ConfigError::Validation(format!(
                "security_headers.frame_options must be 'DENY' or 'SAMEORIGIN', got: '{}'",
                self.security_headers.frame_options
            )));
        }

        Ok(())
    }
}
