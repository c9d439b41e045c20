//! Mock payment provider for testing.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::RwLock;

use crate::interfaces::gateway::Result;
use crate::interfaces::{
    CapturePaymentRequest, CaptureResult, CaptureStatus, GatewayError, ProviderGateway,
    RepresentmentRequest, RepresentmentResult,
};

/// Runs while a capture is in flight at the provider.
pub type CaptureHook = Box<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Mock provider that records requests and answers from toggles.
#[derive(Default)]
pub struct MockGateway {
    fail_with_status: RwLock<Option<u16>>,
    capture_status: RwLock<Option<CaptureStatus>>,
    during_capture: RwLock<Option<CaptureHook>>,
    captures: RwLock<Vec<CapturePaymentRequest>>,
    representments: RwLock<Vec<RepresentmentRequest>>,
    counter: AtomicUsize,
}

impl std::fmt::Debug for MockGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockGateway")
            .field("counter", &self.counter)
            .finish_non_exhaustive()
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every call with this HTTP status. `None` restores success.
    pub async fn set_fail_with_status(&self, status: Option<u16>) {
        *self.fail_with_status.write().await = status;
    }

    /// Status returned by successful captures, `success` unless set.
    pub async fn set_capture_status(&self, status: CaptureStatus) {
        *self.capture_status.write().await = Some(status);
    }

    /// Run `hook` before answering each capture, after the request is
    /// recorded.
    pub async fn set_during_capture(&self, hook: CaptureHook) {
        *self.during_capture.write().await = Some(hook);
    }

    pub async fn captures(&self) -> Vec<CapturePaymentRequest> {
        self.captures.read().await.clone()
    }

    pub async fn representments(&self) -> Vec<RepresentmentRequest> {
        self.representments.read().await.clone()
    }

    async fn check_failure(&self) -> Result<()> {
        match *self.fail_with_status.read().await {
            Some(status) => Err(GatewayError::Provider {
                status,
                body: "mock provider failure".to_string(),
            }),
            None => Ok(()),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl ProviderGateway for MockGateway {
    async fn submit_representment(&self, req: RepresentmentRequest) -> Result<RepresentmentResult> {
        self.check_failure().await?;
        self.representments.write().await.push(req);
        Ok(RepresentmentResult {
            submission_id: self.next_id("sub"),
        })
    }

    async fn capture_payment(&self, req: CapturePaymentRequest) -> Result<CaptureResult> {
        self.check_failure().await?;
        self.captures.write().await.push(req);
        if let Some(hook) = self.during_capture.read().await.as_ref() {
            hook().await;
        }
        let status = self
            .capture_status
            .read()
            .await
            .unwrap_or(CaptureStatus::Success);
        Ok(CaptureResult {
            tx_id: self.next_id("tx"),
            status,
        })
    }
}
