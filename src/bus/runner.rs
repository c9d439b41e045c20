//! Supervises a set of workers sharing one handler.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{error, info};

use super::{BusError, MessageHandler, Result, Worker};
use crate::context::Context;

pub struct Runner {
    workers: Vec<Arc<Worker>>,
    handler: Arc<dyn MessageHandler>,
}

impl Runner {
    pub fn new(workers: Vec<Worker>, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            workers: workers.into_iter().map(Arc::new).collect(),
            handler,
        }
    }

    /// Run every worker in its own task until all return.
    ///
    /// The first worker error cancels the others and is returned. A panicking
    /// worker is logged and closed without stopping the rest.
    pub async fn start(&self, ctx: &Context) -> Result<()> {
        let group = ctx.child();
        let mut tasks = JoinSet::new();

        for (idx, worker) in self.workers.iter().enumerate() {
            let worker = Arc::clone(worker);
            let handler = Arc::clone(&self.handler);
            let ctx = group.clone();

            tasks.spawn(async move {
                let outcome = AssertUnwindSafe(worker.start(&ctx, handler))
                    .catch_unwind()
                    .await;
                let result = match outcome {
                    Ok(result) => result,
                    Err(panic) => {
                        error!(
                            worker_idx = idx,
                            topic = %worker.topic(),
                            panic = %panic_message(panic.as_ref()),
                            "Worker panic recovered"
                        );
                        Ok(())
                    }
                };
                if let Err(e) = worker.close().await {
                    error!(worker_idx = idx, error = %e, "Failed to close worker");
                }
                result
            });
        }

        info!(workers = self.workers.len(), "Runner started");

        let mut first_error: Option<BusError> = None;
        while let Some(joined) = tasks.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(e) => Err(BusError::Fetch(format!("worker task failed: {e}"))),
            };
            if let Err(e) = result {
                if first_error.is_none() {
                    group.cancellation().cancel();
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
