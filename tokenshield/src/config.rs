//! Centralized configuration for the TokenShield core.
//!
//! All configuration is loaded from environment variables and validated
//! at startup; nothing is re-read afterward (spec.md §5: "configuration is
//! read-only after startup").

use crate::error::TokenShieldError;
use rust_common::CircuitBreakerConfig;
use std::env;
use std::time::Duration;

/// Token format the engine generates and recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFormat {
    /// `tok_` followed by URL-safe base64 of 32 random bytes.
    Prefix,
    /// Sixteen Luhn-valid decimal digits beginning with the `9999` sentinel.
    Luhn,
}

impl TokenFormat {
    /// Parse a token format from the `TOKEN_FORMAT` environment value.
    pub fn from_str(s: &str) -> Result<Self, TokenShieldError> {
        match s.to_lowercase().as_str() {
            "prefix" => Ok(Self::Prefix),
            "luhn" => Ok(Self::Luhn),
            other => Err(TokenShieldError::Config(format!(
                "invalid TOKEN_FORMAT: {other} (expected \"prefix\" or \"luhn\")"
            ))),
        }
    }
}

/// Encryption mode the facade selects at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMode {
    /// Single 32-byte process-wide key, authenticated symmetric encryption.
    Legacy,
    /// KEK/DEK envelope encryption via the Key Manager.
    KekDek,
}

/// TokenShield core configuration.
#[derive(Debug, Clone)]
pub struct Config {
    // Store
    /// Postgres connection string assembled from `DB_*`.
    pub database_url: String,
    /// Maximum pool connections.
    pub db_max_connections: u32,
    /// Minimum idle pool connections.
    pub db_min_connections: u32,
    /// Maximum connection lifetime.
    pub db_max_lifetime: Duration,

    // Encryption
    /// Selected encryption mode.
    pub encryption_mode: EncryptionMode,
    /// Legacy-mode 32-byte key (only meaningful when `encryption_mode` is `Legacy`).
    pub legacy_encryption_key: [u8; 32],

    // Token engine
    /// Selected token format.
    pub token_format: TokenFormat,

    // Endpoints
    /// Upstream application base URL for the HTTP forwarder.
    pub app_endpoint: String,
    /// HTTP forwarder listen port.
    pub http_port: u16,
    /// ICAP listen port.
    pub icap_port: u16,
    /// Management API listen port (consumed by an external collaborator;
    /// threaded through so that process can share this `Config`).
    pub api_port: u16,

    // Misc
    /// Verbose logging toggle.
    pub debug_mode: bool,
    /// Bearer secret gating privileged management-API actions.
    pub admin_secret: String,
    /// Circuit breaker guarding outbound dispatch to `app_endpoint`.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Maximum request/response body size the forwarder will buffer.
    pub max_body_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or malformed.
    /// Missing `ENCRYPTION_KEY` is not an error in legacy mode — a
    /// volatile key is generated and logged, per spec.md §6 (development
    /// convenience only).
    pub fn from_env() -> Result<Self, TokenShieldError> {
        dotenvy::dotenv().ok();

        let db_host = env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string());
        let db_port = parse_env("DB_PORT", 5432u16)?;
        let db_user = env::var("DB_USER").unwrap_or_else(|_| "tokenshield".to_string());
        let db_password = env::var("DB_PASSWORD").unwrap_or_default();
        let db_name = env::var("DB_NAME").unwrap_or_else(|_| "tokenshield".to_string());
        let database_url = format!(
            "postgres://{db_user}:{db_password}@{db_host}:{db_port}/{db_name}"
        );

        let token_format = TokenFormat::from_str(
            &env::var("TOKEN_FORMAT").unwrap_or_else(|_| "prefix".to_string()),
        )?;

        let use_kek_dek = parse_env("USE_KEK_DEK", false)?;
        let encryption_mode = if use_kek_dek {
            EncryptionMode::KekDek
        } else {
            EncryptionMode::Legacy
        };
        let legacy_encryption_key = parse_encryption_key()?;

        let app_endpoint = env::var("APP_ENDPOINT")
            .map_err(|_| TokenShieldError::Config("APP_ENDPOINT is required".to_string()))?;

        let http_port = parse_env("HTTP_PORT", 8080u16)?;
        let icap_port = parse_env("ICAP_PORT", 1344u16)?;
        let api_port = parse_env("API_PORT", 8081u16)?;

        let debug_mode = parse_env("DEBUG_MODE", false)?;
        let admin_secret = env::var("ADMIN_SECRET").unwrap_or_default();

        let circuit_breaker = CircuitBreakerConfig::default()
            .with_failure_threshold(parse_env("CB_FAILURE_THRESHOLD", 5)?)
            .with_success_threshold(parse_env("CB_SUCCESS_THRESHOLD", 2)?)
            .with_timeout(Duration::from_secs(parse_env("CB_TIMEOUT_SECS", 30)?));

        let max_body_bytes = parse_env("MAX_BODY_BYTES", 10 * 1024 * 1024usize)?;

        Ok(Self {
            database_url,
            db_max_connections: parse_env("DB_MAX_CONNECTIONS", 25)?,
            db_min_connections: parse_env("DB_MIN_CONNECTIONS", 5)?,
            db_max_lifetime: Duration::from_secs(parse_env("DB_MAX_LIFETIME_SECS", 300)?),
            encryption_mode,
            legacy_encryption_key,
            token_format,
            app_endpoint,
            http_port,
            icap_port,
            api_port,
            debug_mode,
            admin_secret,
            circuit_breaker,
            max_body_bytes,
        })
    }

    /// Validate cross-field invariants not already enforced at parse time.
    ///
    /// # Errors
    ///
    /// Returns an error if `admin_secret` is empty outside legacy/dev use,
    /// or if `app_endpoint` is not a well-formed URL.
    pub fn validate(&self) -> Result<(), TokenShieldError> {
        if reqwest::Url::parse(&self.app_endpoint).is_err() {
            return Err(TokenShieldError::Config(format!(
                "APP_ENDPOINT is not a valid URL: {}",
                self.app_endpoint
            )));
        }
        if self.http_port == self.icap_port || self.http_port == self.api_port || self.icap_port == self.api_port {
            return Err(TokenShieldError::Config(
                "HTTP_PORT, ICAP_PORT, and API_PORT must be distinct".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse an environment variable with a default value.
fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T, TokenShieldError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val
            .parse()
            .map_err(|e| TokenShieldError::Config(format!("invalid {name}: {e}"))),
        Err(_) => Ok(default),
    }
}

/// Parse the legacy-mode encryption key from `ENCRYPTION_KEY`, generating a
/// volatile one (and logging a warning) when unset.
fn parse_encryption_key() -> Result<[u8; 32], TokenShieldError> {
    match env::var("ENCRYPTION_KEY") {
        Ok(key) => {
            use base64::Engine;
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(&key)
                .map_err(|e| TokenShieldError::Config(format!("invalid ENCRYPTION_KEY: {e}")))?;

            if bytes.len() != 32 {
                return Err(TokenShieldError::Config(format!(
                    "ENCRYPTION_KEY must decode to 32 bytes, got {}",
                    bytes.len()
                )));
            }

            let mut arr = [0u8; 32];
            arr.copy_from_slice(&bytes);
            Ok(arr)
        }
        Err(_) => {
            tracing::warn!("ENCRYPTION_KEY not set; generating a volatile development-only key");
            use rand::RngCore;
            let mut key = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut key);
            Ok(key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_format_parsing() {
        assert_eq!(TokenFormat::from_str("prefix").unwrap(), TokenFormat::Prefix);
        assert_eq!(TokenFormat::from_str("LUHN").unwrap(), TokenFormat::Luhn);
        assert!(TokenFormat::from_str("bogus").is_err());
    }

    #[test]
    fn test_validate_rejects_colliding_ports() {
        let mut config = sample_config();
        config.icap_port = config.http_port;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = sample_config();
        config.app_endpoint = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_sane_config() {
        assert!(sample_config().validate().is_ok());
    }

    fn sample_config() -> Config {
        Config {
            database_url: "postgres://tokenshield:pw@localhost:5432/tokenshield".to_string(),
            db_max_connections: 25,
            db_min_connections: 5,
            db_max_lifetime: Duration::from_secs(300),
            encryption_mode: EncryptionMode::Legacy,
            legacy_encryption_key: [0u8; 32],
            token_format: TokenFormat::Prefix,
            app_endpoint: "http://localhost:3000".to_string(),
            http_port: 8080,
            icap_port: 1344,
            api_port: 8081,
            debug_mode: false,
            admin_secret: "test-secret".to_string(),
            circuit_breaker: CircuitBreakerConfig::default(),
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}
