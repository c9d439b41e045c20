//! Webhook delivery and Kafka configuration types.

use serde::Deserialize;

/// How accepted webhooks reach the domain services.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookMode {
    /// Handled in-process by the API binary.
    #[default]
    Sync,
    /// Published to Kafka and consumed by the API workers.
    Kafka,
    /// Forwarded by the ingest binary to the API's internal endpoints.
    Http,
}

impl std::fmt::Display for WebhookMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            WebhookMode::Sync => "sync",
            WebhookMode::Kafka => "kafka",
            WebhookMode::Http => "http",
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub mode: WebhookMode,
}

/// Kafka brokers, topics and consumer groups.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// Bootstrap servers (comma-separated).
    pub brokers: String,
    pub orders_topic: String,
    pub disputes_topic: String,
    pub orders_dlq_topic: String,
    pub disputes_dlq_topic: String,
    pub orders_consumer_group: String,
    pub disputes_consumer_group: String,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            orders_topic: "webhooks.orders".to_string(),
            disputes_topic: "webhooks.disputes".to_string(),
            orders_dlq_topic: "webhooks.orders.dlq".to_string(),
            disputes_dlq_topic: "webhooks.disputes.dlq".to_string(),
            orders_consumer_group: "orders-processor".to_string(),
            disputes_consumer_group: "disputes-processor".to_string(),
        }
    }
}

impl KafkaConfig {
    pub fn broker_list(&self) -> Vec<String> {
        self.brokers
            .split(',')
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_list_skips_blanks() {
        let config = KafkaConfig {
            brokers: " a:9092 ,, b:9092 ".to_string(),
            ..KafkaConfig::default()
        };
        assert_eq!(config.broker_list(), vec!["a:9092", "b:9092"]);
    }

    #[test]
    fn test_webhook_mode_display() {
        assert_eq!(WebhookMode::Kafka.to_string(), "kafka");
        assert_eq!(WebhookMode::default(), WebhookMode::Sync);
    }
}
