//! Reads frames from the connection, fans them out, then acknowledges.

use crate::{HandlerContext, HandlerOutcome, HandlerRegistry, TriggerOutput};
use chrono::Utc;
use futures_util::FutureExt;
use snoti_connection::Connection;
use snoti_protocol::{build_ack, display_frame};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Result of dispatching one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub msg_id: String,
    pub handled: usize,
    pub skipped: usize,
    /// Names of handlers that returned an error or panicked.
    pub failed: Vec<String>,
}

/// Single-loop dispatcher: one frame at a time, in arrival order.
pub struct Dispatcher {
    connection: Arc<dyn Connection>,
    handlers: HandlerRegistry,
}

impl Dispatcher {
    pub fn new(connection: Arc<dyn Connection>, handlers: HandlerRegistry) -> Self {
        Self {
            connection,
            handlers,
        }
    }

    /// Dispatch frames until `shutdown` is cancelled.
    ///
    /// A frame already being dispatched is finished and acknowledged first.
    pub async fn run(&self, shutdown: CancellationToken) {
        debug!(handlers = ?self.handlers.names(), "Dispatcher started");
        loop {
            let frame = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                frame = self.connection.read() => frame,
            };
            if let Some(frame) = frame {
                self.dispatch(&frame).await;
            }
        }
        debug!("Dispatcher stopped");
    }

    /// Run every handler on `frame`, wait for all of them, then queue one ack.
    ///
    /// Returns `None` without acknowledging when the frame is not a JSON object.
    pub async fn dispatch(&self, frame: &[u8]) -> Option<DispatchReport> {
        let Some(message) = TriggerOutput::from_frame(frame) else {
            warn!(content = %display_frame(frame), "Skipping frame that is not a JSON object");
            return None;
        };
        let ctx = Arc::new(HandlerContext::new(&message.event(), Utc::now()));
        let message = Arc::new(message);

        // Dropping the set aborts any handler still running.
        let mut runs = JoinSet::new();
        for handler in self.handlers.iter() {
            let handler = handler.clone();
            let ctx = ctx.clone();
            let message = message.clone();
            runs.spawn(async move {
                let name = handler.name().to_string();
                let result = AssertUnwindSafe(handler.handle(&ctx, &message))
                    .catch_unwind()
                    .await;
                (name, result)
            });
        }

        let mut report = DispatchReport {
            msg_id: ctx.msg_id.clone(),
            ..DispatchReport::default()
        };

        while let Some(joined) = runs.join_next().await {
            let (name, result) = match joined {
                Ok(run) => run,
                Err(e) => {
                    error!(msg_id = %ctx.msg_id, error = %e, "Handler task did not finish");
                    continue;
                }
            };
            match result {
                Ok(Ok(HandlerOutcome::Handled)) => report.handled += 1,
                Ok(Ok(HandlerOutcome::Skipped)) => report.skipped += 1,
                Ok(Err(e)) => {
                    error!(
                        handler = %name,
                        msg_id = %ctx.msg_id,
                        delivery_id = %ctx.delivery_id,
                        error = %format!("{e:#}"),
                        "Handler failed, message lost"
                    );
                    report.failed.push(name);
                }
                Err(panic) => {
                    error!(
                        handler = %name,
                        msg_id = %ctx.msg_id,
                        delivery_id = %ctx.delivery_id,
                        panic = %panic_message(panic.as_ref()),
                        "Handler panicked, message lost"
                    );
                    report.failed.push(name);
                }
            }
        }

        self.connection.write(build_ack(frame));
        debug!(
            msg_id = %ctx.msg_id,
            delivery_id = %ctx.delivery_id,
            handled = report.handled,
            skipped = report.skipped,
            failed = report.failed.len(),
            "Message acknowledged"
        );
        Some(report)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
