//! Trigger lifecycle: one connection, one dispatcher.

use crate::{Dispatcher, HandlerRegistry, TriggerResult};
use parking_lot::Mutex;
use snoti_connection::{Connection, Settings, SnotiClient};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Runs a broker connection and feeds its frames to the handlers.
pub struct Trigger {
    connection: Arc<dyn Connection>,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Trigger {
    /// Trigger backed by a TLS connection to the broker in `settings`.
    pub fn new(settings: Settings, handlers: HandlerRegistry) -> TriggerResult<Self> {
        let client = SnotiClient::new(settings)?;
        Ok(Self::with_connection(Arc::new(client), handlers))
    }

    /// Trigger over an existing connection.
    pub fn with_connection(connection: Arc<dyn Connection>, handlers: HandlerRegistry) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(connection.clone(), handlers));
        Self {
            connection,
            dispatcher,
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the connection and dispatcher tasks. Returns immediately.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            warn!("Trigger already started");
            return;
        }

        let connection = self.connection.clone();
        tasks.push(tokio::spawn(async move { connection.connect().await }));

        let dispatcher = self.dispatcher.clone();
        let shutdown = self.shutdown.clone();
        tasks.push(tokio::spawn(async move { dispatcher.run(shutdown).await }));

        info!("Trigger started");
    }

    /// Stop dispatching, close the connection and wait up to `wait` for
    /// both tasks. Returns false if they did not finish in time; tasks that
    /// miss the deadline are aborted, along with any handler still running.
    pub async fn stop(&self, wait: Duration) -> bool {
        self.shutdown.cancel();
        self.connection.close();

        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        let deadline = tokio::time::Instant::now() + wait;
        let mut finished = true;
        for task in tasks {
            let abort = task.abort_handle();
            match tokio::time::timeout_at(deadline, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Trigger task failed"),
                Err(_) => {
                    warn!(wait_ms = wait.as_millis() as u64, "Trigger task did not stop in time");
                    abort.abort();
                    finished = false;
                }
            }
        }

        info!("Trigger stopped");
        finished
    }
}
