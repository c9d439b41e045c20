//! Silvergate payment provider client.
//!
//! POSTs JSON to the representment and capture endpoints. Any non-2xx answer
//! surfaces as [`GatewayError::Provider`] with the status and raw body.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::interfaces::gateway::Result;
use crate::interfaces::{
    CapturePaymentRequest, CaptureResult, CaptureStatus, GatewayError, ProviderGateway,
    RepresentmentRequest, RepresentmentResult,
};

#[derive(Debug, Serialize)]
struct SubmitBody<'a> {
    order_id: &'a str,
    evidences_file_id: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SubmitReply {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Serialize)]
struct CaptureBody<'a> {
    order_id: &'a str,
    amount: f64,
    currency: &'a str,
    idempotency_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct CaptureReply {
    transaction_id: String,
    status: String,
}

pub struct SilvergateClient {
    client: Client,
    submit_url: String,
    capture_url: String,
}

impl SilvergateClient {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let base = config.base_url.trim_end_matches('/');

        Ok(Self {
            client,
            submit_url: format!("{base}{}", config.submit_representment_path),
            capture_url: format!("{base}{}", config.capture_path),
        })
    }

    async fn post<B: Serialize>(&self, url: &str, body: &B) -> Result<String> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), body = %text, "Provider rejected request");
            return Err(GatewayError::Provider {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }
}

fn transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Transport(err.to_string())
    }
}

#[async_trait]
impl ProviderGateway for SilvergateClient {
    #[tracing::instrument(name = "provider.submit_representment", skip_all, fields(order_id = %req.order_id))]
    async fn submit_representment(&self, req: RepresentmentRequest) -> Result<RepresentmentResult> {
        let body = SubmitBody {
            order_id: &req.order_id,
            evidences_file_id: req.evidence.file_ids(),
        };
        let raw = self.post(&self.submit_url, &body).await?;

        // An empty or malformed body still means the provider accepted it.
        let reply: SubmitReply = serde_json::from_str(&raw).unwrap_or_default();
        debug!(submission_id = %reply.id, "Representment accepted");
        Ok(RepresentmentResult {
            submission_id: reply.id,
        })
    }

    #[tracing::instrument(name = "provider.capture_payment", skip_all, fields(order_id = %req.order_id))]
    async fn capture_payment(&self, req: CapturePaymentRequest) -> Result<CaptureResult> {
        let body = CaptureBody {
            order_id: &req.order_id,
            amount: req.amount,
            currency: &req.currency,
            idempotency_key: &req.idempotency_key,
        };
        let raw = self.post(&self.capture_url, &body).await?;
        let reply: CaptureReply =
            serde_json::from_str(&raw).map_err(|e| GatewayError::Decode(e.to_string()))?;

        let status = if reply.status == "success" {
            CaptureStatus::Success
        } else {
            CaptureStatus::Failed
        };
        debug!(tx_id = %reply.transaction_id, status = ?status, "Capture answered");
        Ok(CaptureResult {
            tx_id: reply.transaction_id,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use chrono::Utc;
    use serde_json::{json, Value};
    use tokio::sync::Mutex;
    use uuid::Uuid;

    use super::*;
    use crate::domain::{Evidence, EvidenceFile};

    type Seen = Arc<Mutex<Vec<Value>>>;

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(base_url: String) -> SilvergateClient {
        SilvergateClient::new(&ProviderConfig {
            base_url,
            timeout_secs: 2,
            ..ProviderConfig::default()
        })
        .unwrap()
    }

    fn capture_request() -> CapturePaymentRequest {
        CapturePaymentRequest {
            order_id: "ord-1".into(),
            amount: 12.5,
            currency: "USD".into(),
            idempotency_key: "key-1".into(),
        }
    }

    #[tokio::test]
    async fn test_capture_success() {
        let seen: Seen = Arc::default();
        let app = Router::new()
            .route(
                "/api/v1/capture",
                post(|State(seen): State<Seen>, Json(body): Json<Value>| async move {
                    seen.lock().await.push(body);
                    Json(json!({"transaction_id": "tx-9", "status": "success"}))
                }),
            )
            .with_state(seen.clone());
        let gateway = client(spawn(app).await);

        let result = gateway.capture_payment(capture_request()).await.unwrap();
        assert_eq!(result.tx_id, "tx-9");
        assert_eq!(result.status, CaptureStatus::Success);

        let bodies = seen.lock().await;
        assert_eq!(bodies[0]["idempotency_key"], "key-1");
        assert_eq!(bodies[0]["amount"], 12.5);
    }

    #[tokio::test]
    async fn test_capture_non_success_status_is_failed() {
        let app = Router::new().route(
            "/api/v1/capture",
            post(|| async { Json(json!({"transaction_id": "tx-1", "status": "declined"})) }),
        );
        let gateway = client(spawn(app).await);

        let result = gateway.capture_payment(capture_request()).await.unwrap();
        assert_eq!(result.status, CaptureStatus::Failed);
    }

    #[tokio::test]
    async fn test_capture_error_status_is_provider_error() {
        let app = Router::new().route(
            "/api/v1/capture",
            post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        );
        let gateway = client(spawn(app).await);

        let err = gateway.capture_payment(capture_request()).await.unwrap_err();
        match err {
            GatewayError::Provider { status, ref body } => {
                assert_eq!(status, 502);
                assert_eq!(body, "upstream down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_capture_garbage_reply_is_decode_error() {
        let app = Router::new().route("/api/v1/capture", post(|| async { "not json" }));
        let gateway = client(spawn(app).await);

        let err = gateway.capture_payment(capture_request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Decode(_)));
    }

    #[tokio::test]
    async fn test_submit_sends_file_ids() {
        let seen: Seen = Arc::default();
        let app = Router::new()
            .route(
                "/api/v1/dispute/representment",
                post(|State(seen): State<Seen>, Json(body): Json<Value>| async move {
                    seen.lock().await.push(body);
                    Json(json!({"id": "sub-7"}))
                }),
            )
            .with_state(seen.clone());
        let gateway = client(spawn(app).await);

        let evidence = Evidence {
            dispute_id: Uuid::new_v4(),
            fields: HashMap::new(),
            files: vec![EvidenceFile {
                file_id: "f-1".into(),
                name: "receipt.pdf".into(),
                content_type: "application/pdf".into(),
                size: 10,
            }],
            updated_at: Utc::now(),
        };
        let result = gateway
            .submit_representment(RepresentmentRequest {
                order_id: "ord-1".into(),
                evidence,
            })
            .await
            .unwrap();

        assert_eq!(result.submission_id, "sub-7");
        let bodies = seen.lock().await;
        assert_eq!(bodies[0], json!({"order_id": "ord-1", "evidences_file_id": ["f-1"]}));
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_transport_error() {
        let gateway = client("http://127.0.0.1:1".to_string());
        let err = gateway.capture_payment(capture_request()).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Transport(_) | GatewayError::Timeout
        ));
        assert!(err.is_transient());
    }
}
