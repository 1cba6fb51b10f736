//! Scenario tests for the broker client, driven by the in-memory broker.
//!
//! - `lifecycle.rs` - dial, handshake and login failures, retry, shutdown
//! - `heartbeat.rs` - ping cadence, session loss and redial
//! - `delivery.rs`  - what reaches the ingress queue, egress writes, overflow

mod delivery;
mod heartbeat;

use crate::testing::{mock_broker, test_settings, MockBroker, MockTransport};
use crate::{ClientTimings, Connection, ConnectionState, SnotiClient};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub(crate) const WAIT: Duration = Duration::from_secs(2);

pub(crate) struct TestClient {
    pub client: Arc<SnotiClient<MockTransport>>,
    pub transport: MockTransport,
    pub broker: MockBroker,
    pub task: Option<JoinHandle<()>>,
}

impl TestClient {
    /// Build a client without starting it.
    pub fn new(timings: ClientTimings) -> Self {
        let (transport, broker) = mock_broker();
        let client = SnotiClient::with_transport(test_settings(), transport.clone())
            .with_timings(timings);
        Self {
            client: Arc::new(client),
            transport,
            broker,
            task: None,
        }
    }

    /// Run `connect()` in the background.
    pub fn start(&mut self) {
        let client = self.client.clone();
        self.task = Some(tokio::spawn(async move { client.connect().await }));
    }

    pub async fn wait_for_state(&self, state: ConnectionState, wait: Duration) -> bool {
        let mut rx = self.client.watch_state();
        tokio::time::timeout(wait, rx.wait_for(|s| *s == state))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }

    /// Read frames until one arrives or `wait` passes.
    pub async fn read_within(&self, wait: Duration) -> Option<Vec<u8>> {
        tokio::time::timeout(wait, async {
            loop {
                if let Some(frame) = self.client.read().await {
                    return frame;
                }
            }
        })
        .await
        .ok()
    }

    /// Close the client and wait for `connect()` to return.
    pub async fn stop(&mut self, wait: Duration) -> bool {
        self.client.close();
        match self.task.take() {
            Some(task) => tokio::time::timeout(wait, task).await.is_ok(),
            None => true,
        }
    }
}
