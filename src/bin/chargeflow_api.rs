//! chargeflow-api: order and dispute API
//!
//! Serves order and dispute reads, operator actions and the internal update
//! endpoints the ingest service forwards to.
//!
//! ## Webhook modes
//! - `sync`: also serves the provider webhook routes and applies them
//!   in-process
//! - `kafka`: consumes the orders and disputes topics with retrying workers
//!   that dead-letter what they cannot apply
//!
//! ## Configuration
//! - `config.yaml`, `--config <path>` or `CHARGEFLOW_CONFIG`
//! - `CHARGEFLOW__SECTION__KEY` overrides plus the flat variables
//!   (`PORT`, `PG_URL`, `WEBHOOK_MODE`, `KAFKA_BROKERS`, ...)

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use chargeflow::clients::SilvergateClient;
use chargeflow::config::{Binary, Config, WebhookMode};
use chargeflow::context::Context;
use chargeflow::http::{api_router, ApiServices, HealthState};
use chargeflow::interfaces::{ProviderGateway, SystemClock};
use chargeflow::services::{DisputeService, OrderService};
use chargeflow::storage::postgres::{PgDisputeEventSink, PgOrderEventSink};
use chargeflow::storage::{Database, PgDisputeRepo, PgOrderRepo};
use chargeflow::utils::bootstrap::{
    connect_with_retry, init_tracing, parse_config_path, shutdown_signal,
};
use chargeflow::webhook::{Processor, SyncProcessor};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(parse_config_path().as_deref())?;
    init_tracing(&config.logging);
    config.validate_for(Binary::Api).map_err(|e| {
        error!(error = %e, "Invalid configuration");
        e
    })?;

    info!(mode = %config.webhook.mode, "Starting chargeflow-api");

    let db = connect_with_retry("postgres", || Database::connect(&config.database)).await?;
    db.migrate().await?;

    let gateway: Arc<dyn ProviderGateway> = Arc::new(SilvergateClient::new(&config.provider)?);
    let clock = Arc::new(SystemClock);
    let orders = Arc::new(OrderService::new(
        Arc::new(PgOrderRepo::new(db.clone())),
        Arc::new(PgOrderEventSink::new(db.clone())),
        gateway.clone(),
        clock.clone(),
    ));
    let disputes = Arc::new(
        DisputeService::new(
            Arc::new(PgDisputeRepo::new(db.clone())),
            Arc::new(PgDisputeEventSink::new(db.clone())),
            gateway,
            clock,
        )
        .with_unknown_vocabulary(config.disputes.accept_unknown_vocabulary),
    );

    let token = CancellationToken::new();
    let root = Context::new(token.clone());

    let processor: Option<Arc<dyn Processor>> = match config.webhook.mode {
        WebhookMode::Sync => Some(Arc::new(SyncProcessor::new(orders.clone(), disputes.clone()))),
        _ => None,
    };

    #[cfg(feature = "kafka")]
    let consumers = match config.webhook.mode {
        WebhookMode::Kafka => Some(consumers::spawn(&config, &root, orders.clone(), disputes.clone())?),
        _ => None,
    };
    #[cfg(not(feature = "kafka"))]
    if config.webhook.mode == WebhookMode::Kafka {
        return Err("webhook mode 'kafka' requires the 'kafka' feature".into());
    }

    let health = HealthState::new(vec![Arc::new(db.clone())]);
    let app = api_router(root.clone(), ApiServices { orders, disputes }, processor, health);

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "chargeflow-api listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(token.clone()))
        .await;
    token.cancel();

    #[cfg(feature = "kafka")]
    if let Some(consumers) = consumers {
        consumers.join().await;
    }

    db.close().await;
    info!("chargeflow-api stopped");
    served.map_err(Into::into)
}

#[cfg(feature = "kafka")]
mod consumers {
    use std::sync::Arc;

    use tokio::task::JoinHandle;
    use tracing::{error, info};

    use chargeflow::bus::kafka::KafkaClientConfig;
    use chargeflow::bus::middleware::compose;
    use chargeflow::bus::{BusError, KafkaConsumer, KafkaDeadLetterPublisher, RetryConfig, Runner, Worker};
    use chargeflow::config::Config;
    use chargeflow::context::Context;
    use chargeflow::dlq::DeadLetterPublisher;
    use chargeflow::handlers::{DisputeConsumer, OrderConsumer};
    use chargeflow::services::{DisputeService, OrderService};

    /// Running consumer pools and the DLQ producers to flush after them.
    pub struct Consumers {
        runners: Vec<JoinHandle<()>>,
        dlqs: Vec<Arc<KafkaDeadLetterPublisher>>,
    }

    impl Consumers {
        pub async fn join(self) {
            for runner in self.runners {
                if let Err(e) = runner.await {
                    error!(error = %e, "Consumer task failed");
                }
            }
            for dlq in self.dlqs {
                if let Err(e) = dlq.close().await {
                    error!(error = %e, "Failed to flush DLQ producer");
                }
            }
        }
    }

    pub fn spawn(
        config: &Config,
        root: &Context,
        orders: Arc<OrderService>,
        disputes: Arc<DisputeService>,
    ) -> Result<Consumers, BusError> {
        let kafka = &config.kafka;
        let brokers = KafkaClientConfig::from_app_config(kafka).bootstrap_servers;

        let orders_dlq = Arc::new(KafkaDeadLetterPublisher::new(
            &KafkaClientConfig::publisher(brokers.clone()),
            &kafka.orders_dlq_topic,
        )?);
        let disputes_dlq = Arc::new(KafkaDeadLetterPublisher::new(
            &KafkaClientConfig::publisher(brokers.clone()),
            &kafka.disputes_dlq_topic,
        )?);

        let orders_source = KafkaConsumer::new(
            &KafkaClientConfig::subscriber(brokers.clone(), &kafka.orders_consumer_group),
            &kafka.orders_topic,
        )?;
        let disputes_source = KafkaConsumer::new(
            &KafkaClientConfig::subscriber(brokers, &kafka.disputes_consumer_group),
            &kafka.disputes_topic,
        )?;

        let orders_runner = Runner::new(
            vec![Worker::new(Arc::new(orders_source))],
            compose(
                OrderConsumer::new(orders),
                RetryConfig::default(),
                orders_dlq.clone() as Arc<dyn DeadLetterPublisher>,
                &kafka.orders_topic,
                &kafka.orders_consumer_group,
            ),
        );
        let disputes_runner = Runner::new(
            vec![Worker::new(Arc::new(disputes_source))],
            compose(
                DisputeConsumer::new(disputes),
                RetryConfig::default(),
                disputes_dlq.clone() as Arc<dyn DeadLetterPublisher>,
                &kafka.disputes_topic,
                &kafka.disputes_consumer_group,
            ),
        );

        let runners = [("orders", orders_runner), ("disputes", disputes_runner)]
            .into_iter()
            .map(|(name, runner)| {
                let ctx = root.clone();
                tokio::spawn(async move {
                    info!(pool = name, "Consumer pool started");
                    if let Err(e) = runner.start(&ctx).await {
                        error!(pool = name, error = %e, "Consumer pool stopped with error");
                        ctx.cancellation().cancel();
                    }
                })
            })
            .collect();

        Ok(Consumers {
            runners,
            dlqs: vec![orders_dlq, disputes_dlq],
        })
    }
}
