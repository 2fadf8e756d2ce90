use crate::domain::money::Money;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Payout settings read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    pub minimum_payout: Money,
    pub maximum_payout: Money,
    /// Method used when a payout request names none; also the processor name.
    pub default_method: String,
    /// Lowercased names of processors that require seller onboarding.
    pub onboarding_required: Vec<String>,
    pub processor_timeout: Duration,
    pub http_endpoint: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            minimum_payout: Money::from_minor(1_000),
            maximum_payout: Money::from_minor(1_000_000),
            default_method: "disabled".to_string(),
            onboarding_required: Vec::new(),
            processor_timeout: Duration::from_secs(30),
            http_endpoint: None,
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let minimum_payout =
            parse_money(&env_map, "PAYOUT_MINIMUM")?.unwrap_or(defaults.minimum_payout);
        let maximum_payout =
            parse_money(&env_map, "PAYOUT_MAXIMUM")?.unwrap_or(defaults.maximum_payout);
        if minimum_payout > maximum_payout {
            return Err(ConfigError::InvalidValue(
                "PAYOUT_MINIMUM".to_string(),
                format!("must not exceed PAYOUT_MAXIMUM ({maximum_payout})"),
            ));
        }
        if !minimum_payout.is_positive() {
            return Err(ConfigError::InvalidValue(
                "PAYOUT_MINIMUM".to_string(),
                "must be positive".to_string(),
            ));
        }

        let default_method = env_map
            .get("PAYOUT_DEFAULT_METHOD")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.default_method);

        let onboarding_required = env_map
            .get("PAYOUT_ONBOARDING_REQUIRED")
            .map(|s| {
                s.split(',')
                    .map(|name| name.trim().to_lowercase())
                    .filter(|name| !name.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let processor_timeout = env_map
            .get("PAYOUT_PROCESSOR_TIMEOUT_MS")
            .map(|s| s.as_str())
            .unwrap_or("30000")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "PAYOUT_PROCESSOR_TIMEOUT_MS".to_string(),
                    "must be a whole number of milliseconds".to_string(),
                )
            })
            .map(Duration::from_millis)?;

        let http_endpoint = env_map
            .get("PAYOUT_HTTP_ENDPOINT")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty());

        Ok(LedgerConfig {
            minimum_payout,
            maximum_payout,
            default_method,
            onboarding_required,
            processor_timeout,
            http_endpoint,
        })
    }

    pub fn requires_onboarding(&self, method: &str) -> bool {
        let method = method.to_lowercase();
        self.onboarding_required.iter().any(|name| *name == method)
    }
}

fn parse_money(env_map: &HashMap<String, String>, key: &str) -> Result<Option<Money>, ConfigError> {
    let Some(raw) = env_map.get(key) else {
        return Ok(None);
    };
    let decimal = Decimal::from_str(raw.trim()).map_err(|_| {
        ConfigError::InvalidValue(key.to_string(), "must be a decimal amount".to_string())
    })?;
    Money::from_decimal(decimal)
        .map(Some)
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}
