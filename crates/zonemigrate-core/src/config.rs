//! Configuration types for the migration engine
//!
//! This module defines all configuration structures used throughout the crate.

use crate::record::RecordType;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Subdomains probed by default when aggregating live DNS data
pub const DEFAULT_SUBDOMAINS: &[&str] = &[
    "@",
    "www",
    "mail",
    "webmail",
    "smtp",
    "imap",
    "pop",
    "ftp",
    "autodiscover",
    "autoconfig",
    "_dmarc",
    "default._domainkey",
    "selector1._domainkey",
    "selector2._domainkey",
    "api",
    "app",
    "blog",
    "shop",
    "cdn",
    "vpn",
    "remote",
    "ns1",
    "ns2",
    "_sip._tls",
    "_sipfederationtls._tcp",
    "lyncdiscover",
    "enterpriseregistration",
    "enterpriseenrollment",
];

/// Main migration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Domain being migrated (without trailing dot)
    pub domain: String,

    /// Target provider configuration
    pub provider: ProviderConfig,

    /// Live query settings
    #[serde(default)]
    pub aggregator: AggregatorConfig,

    /// Plan execution settings
    #[serde(default)]
    pub executor: ExecutorConfig,
}

impl MigrationConfig {
    /// Create a configuration for a domain with default settings
    pub fn new(domain: impl Into<String>, provider: ProviderConfig) -> Self {
        Self {
            domain: domain.into(),
            provider,
            aggregator: AggregatorConfig::default(),
            executor: ExecutorConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        let domain = self.domain.trim().trim_end_matches('.');
        if domain.is_empty() {
            return Err(crate::Error::config("Domain cannot be empty"));
        }
        if !domain.contains('.') {
            return Err(crate::Error::config(format!(
                "Domain '{}' must have at least two labels",
                domain
            )));
        }

        self.provider.validate()?;
        self.aggregator.validate()?;
        self.executor.validate()?;

        Ok(())
    }
}

/// Target provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Constellix DNS
    Constellix {
        /// Account API key
        api_key: String,
        /// Account secret used to sign requests
        secret_key: String,
        /// API base URL override (defaults to the public endpoint)
        #[serde(default)]
        base_url: Option<String>,
    },

    /// Custom provider
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Constellix {
                api_key,
                secret_key,
                base_url,
            } => {
                if api_key.is_empty() {
                    return Err(crate::Error::config("Constellix API key cannot be empty"));
                }
                if secret_key.is_empty() {
                    return Err(crate::Error::config("Constellix secret key cannot be empty"));
                }
                if let Some(url) = base_url
                    && !url.starts_with("https://")
                    && !url.starts_with("http://")
                {
                    return Err(crate::Error::config(format!(
                        "Constellix base URL must use HTTP or HTTPS scheme. Got: {}",
                        url
                    )));
                }
                Ok(())
            }
            ProviderConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom provider factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom provider config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Constellix { .. } => "constellix",
            ProviderConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::Constellix {
            api_key: String::new(),
            secret_key: String::new(),
            base_url: None,
        }
    }
}

/// Live DNS aggregation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Queries in flight at once for a single source
    ///
    /// Public resolvers and many authoritative servers throttle or drop
    /// bursts, so this stays small.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between batches sent to a live nameserver (milliseconds)
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,

    /// Upper bound on a single query (milliseconds); exceeding it counts as
    /// "no data"
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Subdomains to probe ("@" for the apex)
    #[serde(default = "default_subdomains")]
    pub subdomains: Vec<String>,

    /// Record types to probe
    #[serde(default = "default_record_types")]
    pub record_types: Vec<RecordType>,
}

impl AggregatorConfig {
    /// Validate the aggregation settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.batch_size == 0 {
            return Err(crate::Error::config("Aggregator batch size must be > 0"));
        }
        if self.query_timeout_ms == 0 {
            return Err(crate::Error::config("Aggregator query timeout must be > 0"));
        }
        Ok(())
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_pause_ms: default_batch_pause_ms(),
            query_timeout_ms: default_query_timeout_ms(),
            subdomains: default_subdomains(),
            record_types: default_record_types(),
        }
    }
}

/// Plan execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Fixed delay between provider writes (milliseconds)
    ///
    /// Sized to the provider's published per-account rate limit.
    #[serde(default = "default_operation_delay_ms")]
    pub operation_delay_ms: u64,

    /// Wait before the single retry after an HTTP 429 (milliseconds)
    #[serde(default = "default_rate_limit_backoff_ms")]
    pub rate_limit_backoff_ms: u64,

    /// Capacity of the executor event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl ExecutorConfig {
    /// Validate the execution settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config(
                "Executor event channel capacity must be > 0",
            ));
        }
        Ok(())
    }

    pub fn operation_delay(&self) -> Duration {
        Duration::from_millis(self.operation_delay_ms)
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_millis(self.rate_limit_backoff_ms)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            operation_delay_ms: default_operation_delay_ms(),
            rate_limit_backoff_ms: default_rate_limit_backoff_ms(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_batch_size() -> usize {
    8
}

fn default_batch_pause_ms() -> u64 {
    250
}

fn default_query_timeout_ms() -> u64 {
    5000
}

fn default_subdomains() -> Vec<String> {
    DEFAULT_SUBDOMAINS.iter().map(|s| s.to_string()).collect()
}

fn default_record_types() -> Vec<RecordType> {
    RecordType::MIGRATABLE.to_vec()
}

fn default_operation_delay_ms() -> u64 {
    350
}

fn default_rate_limit_backoff_ms() -> u64 {
    5000
}

fn default_event_channel_capacity() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constellix() -> ProviderConfig {
        ProviderConfig::Constellix {
            api_key: "key".to_string(),
            secret_key: "secret".to_string(),
            base_url: None,
        }
    }

    #[test]
    fn test_defaults_from_empty_json() {
        let config: MigrationConfig = serde_json::from_value(serde_json::json!({
            "domain": "example.com",
            "provider": { "type": "constellix", "api_key": "k", "secret_key": "s" }
        }))
        .unwrap();

        assert_eq!(config.aggregator.batch_size, 8);
        assert_eq!(config.executor.operation_delay_ms, 350);
        assert!(config.aggregator.subdomains.contains(&"www".to_string()));
        assert!(!config.aggregator.record_types.contains(&RecordType::Soa));
        assert_eq!(config.provider.type_name(), "constellix");
    }

    #[test]
    fn test_validate() {
        assert!(MigrationConfig::new("example.com", constellix()).validate().is_ok());
        assert!(MigrationConfig::new("", constellix()).validate().is_err());
        assert!(MigrationConfig::new("localhost", constellix()).validate().is_err());
        assert!(
            MigrationConfig::new("example.com", ProviderConfig::default())
                .validate()
                .is_err()
        );

        let mut config = MigrationConfig::new("example.com", constellix());
        config.aggregator.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_base_url_scheme_checked() {
        let config = ProviderConfig::Constellix {
            api_key: "key".to_string(),
            secret_key: "secret".to_string(),
            base_url: Some("ftp://api".to_string()),
        };
        assert!(config.validate().is_err());
    }
}
