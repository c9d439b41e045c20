//! Ambient processing context.
//!
//! Every HTTP request and every consumed message runs under a [`Context`]
//! carrying the shutdown token and the correlation id of the work item.

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// HTTP and broker header carrying the correlation id.
pub const CORRELATION_HEADER: &str = "X-Correlation-ID";

#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: CancellationToken,
    correlation_id: Option<String>,
}

impl Context {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            correlation_id: None,
        }
    }

    /// A context that is never cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        self.correlation_id = (!id.is_empty()).then_some(id);
        self
    }

    /// Keeps an existing correlation id or mints a new one.
    pub fn ensure_correlation_id(self) -> Self {
        if self.correlation_id.is_some() {
            self
        } else {
            self.with_correlation_id(Uuid::new_v4().to_string())
        }
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// A context cancelled with this one but cancellable on its own.
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            correlation_id: self.correlation_id.clone(),
        }
    }

    /// Same correlation id, detached from cancellation. Used for commits and
    /// dead-letter publishes that must outlive a shutdown signal.
    pub fn detached(&self) -> Self {
        Self {
            cancel: CancellationToken::new(),
            correlation_id: self.correlation_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_correlation_id_keeps_existing() {
        let ctx = Context::background().with_correlation_id("abc").ensure_correlation_id();
        assert_eq!(ctx.correlation_id(), Some("abc"));
    }

    #[test]
    fn test_ensure_correlation_id_generates() {
        let ctx = Context::background().with_correlation_id("").ensure_correlation_id();
        assert!(Uuid::parse_str(ctx.correlation_id().unwrap()).is_ok());
    }

    #[test]
    fn test_detached_survives_parent_cancel() {
        let token = CancellationToken::new();
        let ctx = Context::new(token.clone()).with_correlation_id("c1");
        let child = ctx.child();
        let detached = ctx.detached();
        token.cancel();

        assert!(child.is_cancelled());
        assert!(!detached.is_cancelled());
        assert_eq!(detached.correlation_id(), Some("c1"));
    }
}
