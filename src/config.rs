//! Service configuration
//!
//! One TOML file, loaded once at process start: server bind address, gateway
//! credentials and timeouts, the unlock price, and the ordered plan table.
//! The plan table is not expected to change at runtime; a price change is a
//! deploy.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8807
//!
//! [gateway]
//! base_url = "https://api.paygate.example"
//! secret_key = "sk_live_..."
//!
//! [unlock]
//! price_minor = 2500
//!
//! [[plans]]
//! name = "starter"
//! price_minor = 5000
//! keys = 5
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::reconcile::{Plan, PlanTable, RetryPolicy};
use crate::types::LedgerError;

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8807
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Payment-gateway settings
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Gateway API root
    pub base_url: String,

    /// Bearer credential
    pub secret_key: String,

    /// Per-call deadline in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra fetch attempts after the first failure
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Delay between fetch attempts, in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Transaction-history page size
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    1_500
}

fn default_page_size() -> u32 {
    50
}

impl GatewayConfig {
    /// Per-call deadline as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Retry policy for the reconciler
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            extra_attempts: self.retry_attempts,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

/// Unlock-gate settings
#[derive(Debug, Clone, Deserialize)]
pub struct UnlockConfig {
    /// One-shot unlock price in minor currency units
    pub price_minor: i64,
}

/// Root configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Payment-gateway settings
    pub gateway: GatewayConfig,

    /// Unlock-gate settings
    pub unlock: UnlockConfig,

    /// Ordered plan table
    pub plans: Vec<Plan>,
}

impl Config {
    /// Load and validate configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Config`] if the file cannot be read, does not
    /// parse, or fails validation (empty plan table, zero-key plan,
    /// non-positive prices).
    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            LedgerError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(raw: &str) -> Result<Self, LedgerError> {
        let config: Config =
            toml::from_str(raw).map_err(|e| LedgerError::config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Build the validated plan table
    pub fn plan_table(&self) -> Result<PlanTable, LedgerError> {
        PlanTable::new(self.plans.clone()).map_err(LedgerError::config)
    }

    fn validate(&self) -> Result<(), LedgerError> {
        if self.gateway.base_url.is_empty() {
            return Err(LedgerError::config("gateway.base_url must be set"));
        }
        if self.gateway.secret_key.is_empty() {
            return Err(LedgerError::config("gateway.secret_key must be set"));
        }
        if self.unlock.price_minor <= 0 {
            return Err(LedgerError::config("unlock.price_minor must be positive"));
        }
        // Surface plan-table problems at startup, not at first reconcile
        self.plan_table()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    const VALID: &str = r#"
        [gateway]
        base_url = "https://api.paygate.example"
        secret_key = "sk_test_abc"

        [unlock]
        price_minor = 2500

        [[plans]]
        name = "starter"
        price_minor = 5000
        keys = 5

        [[plans]]
        name = "bulk"
        price_minor = 30000
        keys = 40
    "#;

    #[test]
    fn test_valid_config_parses_with_defaults() {
        let config = Config::from_toml_str(VALID).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8807);
        assert_eq!(config.gateway.timeout(), Duration::from_secs(15));
        assert_eq!(config.gateway.retry_policy().extra_attempts, 2);
        assert_eq!(
            config.gateway.retry_policy().delay,
            Duration::from_millis(1_500)
        );
        assert_eq!(config.plans.len(), 2);
    }

    #[test]
    fn test_explicit_values_override_defaults() {
        let raw = r#"
            [server]
            host = "0.0.0.0"
            port = 9000

            [gateway]
            base_url = "https://api.paygate.example"
            secret_key = "sk"
            timeout_secs = 5
            retry_attempts = 1
            retry_delay_ms = 100
            page_size = 10

            [unlock]
            price_minor = 1000

            [[plans]]
            name = "only"
            price_minor = 1000
            keys = 1
        "#;

        let config = Config::from_toml_str(raw).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.gateway.timeout(), Duration::from_secs(5));
        assert_eq!(config.gateway.page_size, 10);
    }

    #[test]
    fn test_missing_plans_is_rejected() {
        let raw = r#"
            plans = []

            [gateway]
            base_url = "https://api.paygate.example"
            secret_key = "sk"

            [unlock]
            price_minor = 1000
        "#;

        let result = Config::from_toml_str(raw);
        assert!(matches!(result.unwrap_err(), LedgerError::Config { .. }));
    }

    #[test]
    fn test_empty_secret_key_is_rejected() {
        let raw = VALID.replace("sk_test_abc", "");
        let result = Config::from_toml_str(&raw);
        assert!(matches!(result.unwrap_err(), LedgerError::Config { .. }));
    }

    #[test]
    fn test_non_positive_unlock_price_is_rejected() {
        let raw = VALID.replace("price_minor = 2500", "price_minor = 0");
        let result = Config::from_toml_str(&raw);
        assert!(matches!(result.unwrap_err(), LedgerError::Config { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().expect("failed to create temp file");
        file.write_all(VALID.as_bytes())
            .expect("failed to write temp file");
        file.flush().expect("failed to flush temp file");

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.plans[0].name, "starter");
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let result = Config::load(Path::new("no-such-config.toml"));
        assert!(matches!(result.unwrap_err(), LedgerError::Config { .. }));
    }
}
