use super::*;

#[test]
fn test_publisher_config() {
    let config = KafkaClientConfig::publisher("localhost:9092");
    let client = config.build_producer_config();

    assert_eq!(client.get("bootstrap.servers"), Some("localhost:9092"));
    assert_eq!(client.get("acks"), Some("all"));
    assert_eq!(client.get("enable.idempotence"), Some("true"));
    assert!(client.get("group.id").is_none());
}

#[test]
fn test_subscriber_config_disables_auto_commit() {
    let config = KafkaClientConfig::subscriber("localhost:9092", "orders-processor");
    let client = config.build_consumer_config();

    assert_eq!(client.get("group.id"), Some("orders-processor"));
    assert_eq!(client.get("enable.auto.commit"), Some("false"));
    assert_eq!(client.get("auto.offset.reset"), Some("earliest"));
}

#[test]
fn test_from_app_config_joins_brokers() {
    let app = KafkaConfig {
        brokers: "kafka-1:9092, kafka-2:9092".to_string(),
        ..KafkaConfig::default()
    };
    let config = KafkaClientConfig::from_app_config(&app);
    assert_eq!(config.bootstrap_servers, "kafka-1:9092,kafka-2:9092");
}

#[test]
fn test_clients_connect_over_plaintext() {
    let config = KafkaClientConfig::subscriber("localhost:9092", "orders-processor");
    for client in [config.build_producer_config(), config.build_consumer_config()] {
        assert!(client.get("security.protocol").is_none());
        assert!(client.get("sasl.mechanism").is_none());
    }
}

#[test]
fn test_consumer_requires_group_id() {
    let config = KafkaClientConfig::publisher("localhost:9092");
    let result = KafkaConsumer::new(&config, "webhooks.orders");
    assert!(matches!(result, Err(BusError::Connection(_))));
}

#[test]
fn test_header_conversion() {
    let headers = HashMap::from([
        (CORRELATION_HEADER.to_string(), "corr-1".to_string()),
        ("error".to_string(), "boom".to_string()),
    ]);
    let owned = owned_headers(&headers);
    assert_eq!(owned.count(), 2);
    assert_eq!(header_map(Some(&owned)), headers);
}
