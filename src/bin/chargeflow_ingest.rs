//! chargeflow-ingest: provider webhook intake
//!
//! Accepts order and chargeback webhooks, validates them and hands them on
//! without touching the database.
//!
//! ## Webhook modes
//! - `kafka`: publishes an envelope per webhook, keyed by user id
//! - `http`: forwards to the API's internal update endpoints

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use chargeflow::clients::ApiClient;
use chargeflow::config::{Binary, Config, WebhookMode};
use chargeflow::context::Context;
use chargeflow::http::{ingest_router, HealthState};
use chargeflow::utils::bootstrap::{init_tracing, parse_config_path, shutdown_signal};
use chargeflow::webhook::{HttpProcessor, Processor};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(parse_config_path().as_deref())?;
    init_tracing(&config.logging);
    config.validate_for(Binary::Ingest).map_err(|e| {
        error!(error = %e, "Invalid configuration");
        e
    })?;

    info!(mode = %config.webhook.mode, "Starting chargeflow-ingest");

    #[cfg(feature = "kafka")]
    let mut publishers: Vec<Arc<dyn chargeflow::bus::Publisher>> = Vec::new();

    let processor: Arc<dyn Processor> = match config.webhook.mode {
        WebhookMode::Http => {
            info!(api = %config.api_client.base_url, "Forwarding webhooks to the API");
            Arc::new(HttpProcessor::new(Arc::new(ApiClient::new(config.api_client.clone())?)))
        }
        #[cfg(feature = "kafka")]
        _ => {
            use chargeflow::bus::kafka::KafkaClientConfig;
            use chargeflow::bus::KafkaPublisher;
            use chargeflow::webhook::AsyncProcessor;

            let client = KafkaClientConfig::from_app_config(&config.kafka);
            let orders: Arc<dyn chargeflow::bus::Publisher> =
                Arc::new(KafkaPublisher::new(&client, &config.kafka.orders_topic)?);
            let disputes: Arc<dyn chargeflow::bus::Publisher> =
                Arc::new(KafkaPublisher::new(&client, &config.kafka.disputes_topic)?);
            publishers.extend([orders.clone(), disputes.clone()]);
            info!(
                orders_topic = %config.kafka.orders_topic,
                disputes_topic = %config.kafka.disputes_topic,
                "Publishing webhooks to Kafka"
            );
            Arc::new(AsyncProcessor::new(orders, disputes))
        }
        #[cfg(not(feature = "kafka"))]
        mode => return Err(format!("webhook mode '{mode}' requires the 'kafka' feature").into()),
    };

    let token = CancellationToken::new();
    let root = Context::new(token.clone());
    let app = ingest_router(root, processor, HealthState::default());

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "chargeflow-ingest listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(token.clone()))
        .await;
    token.cancel();

    #[cfg(feature = "kafka")]
    for publisher in publishers {
        if let Err(e) = publisher.close().await {
            error!(error = %e, "Failed to flush publisher");
        }
    }

    info!("chargeflow-ingest stopped");
    served.map_err(Into::into)
}
