//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files and environment variables.

mod client;
mod messaging;
mod server;
mod storage;

pub use client::{ApiClientConfig, ProviderConfig};
pub use messaging::{KafkaConfig, WebhookConfig, WebhookMode};
pub use server::{LogFormat, LoggingConfig, ServerConfig};
pub use storage::DatabaseConfig;

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "CHARGEFLOW_CONFIG";
/// Prefix for structured configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "CHARGEFLOW";
/// Environment variable for the tracing filter.
pub const LOG_ENV_VAR: &str = "CHARGEFLOW_LOG";

/// Flat operational variables and the config keys they override.
pub const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("PORT", "server.port"),
    ("PG_URL", "database.url"),
    ("PG_POOL_MAX", "database.pool_max"),
    ("LOG_LEVEL", "logging.level"),
    ("LOG_FORMAT", "logging.format"),
    ("SILVERGATE_BASE_URL", "provider.base_url"),
    (
        "SILVERGATE_SUBMIT_REPRESENTMENT_PATH",
        "provider.submit_representment_path",
    ),
    ("SILVERGATE_CAPTURE_PATH", "provider.capture_path"),
    ("HTTP_SILVERGATE_CLIENT_TIMEOUT_SECS", "provider.timeout_secs"),
    ("WEBHOOK_MODE", "webhook.mode"),
    ("KAFKA_BROKERS", "kafka.brokers"),
    ("KAFKA_ORDERS_TOPIC", "kafka.orders_topic"),
    ("KAFKA_DISPUTES_TOPIC", "kafka.disputes_topic"),
    ("KAFKA_ORDERS_DLQ_TOPIC", "kafka.orders_dlq_topic"),
    ("KAFKA_DISPUTES_DLQ_TOPIC", "kafka.disputes_dlq_topic"),
    ("KAFKA_ORDERS_CONSUMER_GROUP", "kafka.orders_consumer_group"),
    ("KAFKA_DISPUTES_CONSUMER_GROUP", "kafka.disputes_consumer_group"),
    ("API_BASE_URL", "api_client.base_url"),
    ("API_TIMEOUT_SECS", "api_client.timeout_secs"),
    ("API_RETRY_ATTEMPTS", "api_client.retry_attempts"),
    ("API_RETRY_BASE_DELAY_MS", "api_client.retry_base_delay_ms"),
    ("API_RETRY_MAX_DELAY_MS", "api_client.retry_max_delay_ms"),
    (
        "DISPUTES_ACCEPT_UNKNOWN_VOCABULARY",
        "disputes.accept_unknown_vocabulary",
    ),
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("webhook mode '{mode}' is not supported by {binary}")]
    UnsupportedMode { binary: Binary, mode: WebhookMode },
}

/// The process a configuration is validated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binary {
    Api,
    Ingest,
}

impl std::fmt::Display for Binary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Binary::Api => f.write_str("chargeflow-api"),
            Binary::Ingest => f.write_str("chargeflow-ingest"),
        }
    }
}

/// Dispute intake switches.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DisputesConfig {
    /// Record chargebacks carrying unknown status or resolution values
    /// instead of rejecting them.
    pub accept_unknown_vocabulary: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    /// Payment provider endpoints.
    pub provider: ProviderConfig,
    pub webhook: WebhookConfig,
    pub kafka: KafkaConfig,
    /// Ingest to API hand-off client.
    pub api_client: ApiClientConfig,
    pub disputes: DisputesConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    /// 5. The flat variables in [`ENV_OVERRIDES`]
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        Self::load_with(path, |name| std::env::var(name).ok())
    }

    /// [`Config::load`] with an injectable lookup for the flat variables.
    pub fn load_with<F>(path: Option<&str>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Some(config_path) = lookup(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(CONFIG_ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        for (var, key) in ENV_OVERRIDES {
            let value = lookup(var).filter(|v| !v.trim().is_empty());
            builder = builder.set_override_option(*key, value)?;
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Reject webhook modes the given binary cannot serve.
    pub fn validate_for(&self, binary: Binary) -> Result<(), ConfigError> {
        let supported = match binary {
            Binary::Api => matches!(self.webhook.mode, WebhookMode::Sync | WebhookMode::Kafka),
            Binary::Ingest => matches!(self.webhook.mode, WebhookMode::Kafka | WebhookMode::Http),
        };
        if supported {
            Ok(())
        } else {
            Err(ConfigError::UnsupportedMode {
                binary,
                mode: self.webhook.mode,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::load_with(None, |name| env.get(name).cloned()).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = load(&[]);
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.url, "postgres://localhost:5432/chargeflow");
        assert_eq!(config.database.pool_max, 10);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.webhook.mode, WebhookMode::Sync);
        assert_eq!(config.kafka.orders_topic, "webhooks.orders");
        assert_eq!(config.kafka.disputes_dlq_topic, "webhooks.disputes.dlq");
        assert_eq!(config.api_client.retry_attempts, 3);
        assert!(!config.disputes.accept_unknown_vocabulary);
    }

    #[test]
    fn test_flat_env_overrides() {
        let config = load(&[
            ("PORT", "8080"),
            ("PG_URL", "postgres://db/payments"),
            ("PG_POOL_MAX", "25"),
            ("WEBHOOK_MODE", "kafka"),
            ("KAFKA_BROKERS", "k1:9092,k2:9092"),
            ("HTTP_SILVERGATE_CLIENT_TIMEOUT_SECS", "3"),
            ("DISPUTES_ACCEPT_UNKNOWN_VOCABULARY", "true"),
        ]);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.url, "postgres://db/payments");
        assert_eq!(config.database.pool_max, 25);
        assert_eq!(config.webhook.mode, WebhookMode::Kafka);
        assert_eq!(config.kafka.broker_list(), vec!["k1:9092", "k2:9092"]);
        assert_eq!(config.provider.timeout_secs, 3);
        assert!(config.disputes.accept_unknown_vocabulary);
    }

    #[test]
    fn test_file_then_env_precedence() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        std::io::Write::write_all(
            &mut file,
            b"server:\n  port: 4000\nwebhook:\n  mode: http\napi_client:\n  base_url: http://api:3000\n",
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = Config::load_with(Some(&path), |name| {
            (name == "PORT").then(|| "4100".to_string())
        })
        .unwrap();
        assert_eq!(config.server.port, 4100);
        assert_eq!(config.webhook.mode, WebhookMode::Http);
        assert_eq!(config.api_client.base_url, "http://api:3000");
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let result = Config::load_with(Some("/nonexistent/chargeflow.yaml"), |_| None);
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_blank_override_keeps_default() {
        let config = load(&[("PORT", "  ")]);
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_unknown_mode_fails_to_load() {
        let env: HashMap<&str, &str> = HashMap::from([("WEBHOOK_MODE", "carrier-pigeon")]);
        let result = Config::load_with(None, |name| env.get(name).map(|v| v.to_string()));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_mode_validation_per_binary() {
        let mut config = Config::default();

        config.webhook.mode = WebhookMode::Sync;
        assert!(config.validate_for(Binary::Api).is_ok());
        assert!(matches!(
            config.validate_for(Binary::Ingest),
            Err(ConfigError::UnsupportedMode {
                binary: Binary::Ingest,
                mode: WebhookMode::Sync
            })
        ));

        config.webhook.mode = WebhookMode::Http;
        assert!(config.validate_for(Binary::Ingest).is_ok());
        assert!(config.validate_for(Binary::Api).is_err());

        config.webhook.mode = WebhookMode::Kafka;
        assert!(config.validate_for(Binary::Api).is_ok());
        assert!(config.validate_for(Binary::Ingest).is_ok());
    }
}
