//! In-memory broker for exercising the client without a network.
//!
//! [`mock_broker`] returns a [`MockTransport`] to hand to
//! [`SnotiClient::with_transport`](crate::SnotiClient::with_transport) and a
//! [`MockBroker`] that receives one [`BrokerSession`] per successful handshake.

use crate::{ClientTimings, ConnectionError, ConnectionResult, Settings, Transport};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::mpsc;

const PIPE_CAPACITY: usize = 256 * 1024;

struct MockState {
    dial_failures: AtomicUsize,
    handshake_failures: AtomicUsize,
    dials: AtomicUsize,
    handshakes: AtomicUsize,
    pending: Mutex<VecDeque<DuplexStream>>,
    sessions: mpsc::UnboundedSender<BrokerSession>,
}

/// Transport whose "network" is a duplex pipe per dial.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<MockState>,
}

/// Broker end of the mock transport.
pub struct MockBroker {
    sessions: mpsc::UnboundedReceiver<BrokerSession>,
}

/// Create a connected transport/broker pair.
pub fn mock_broker() -> (MockTransport, MockBroker) {
    let (tx, rx) = mpsc::unbounded_channel();
    let transport = MockTransport {
        state: Arc::new(MockState {
            dial_failures: AtomicUsize::new(0),
            handshake_failures: AtomicUsize::new(0),
            dials: AtomicUsize::new(0),
            handshakes: AtomicUsize::new(0),
            pending: Mutex::new(VecDeque::new()),
            sessions: tx,
        }),
    };
    (transport, MockBroker { sessions: rx })
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        .is_ok()
}

impl MockTransport {
    /// Refuse the next `n` dials.
    pub fn fail_next_dials(&self, n: usize) {
        self.state.dial_failures.store(n, Ordering::Release);
    }

    /// Fail the next `n` handshakes.
    pub fn fail_next_handshakes(&self, n: usize) {
        self.state.handshake_failures.store(n, Ordering::Release);
    }

    /// Dial attempts so far, failed ones included.
    pub fn dial_count(&self) -> usize {
        self.state.dials.load(Ordering::Acquire)
    }

    /// Handshake attempts so far, failed ones included.
    pub fn handshake_count(&self) -> usize {
        self.state.handshakes.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Stream = DuplexStream;
    type Secured = DuplexStream;

    async fn dial(&self, addr: &str) -> ConnectionResult<DuplexStream> {
        self.state.dials.fetch_add(1, Ordering::AcqRel);
        if take_one(&self.state.dial_failures) {
            return Err(ConnectionError::Dial {
                addr: addr.to_string(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "mock refused"),
            });
        }
        let (client, server) = tokio::io::duplex(PIPE_CAPACITY);
        self.state.pending.lock().push_back(server);
        Ok(client)
    }

    async fn secure(&self, _server_name: &str, stream: DuplexStream) -> ConnectionResult<DuplexStream> {
        self.state.handshakes.fetch_add(1, Ordering::AcqRel);
        let server = self.state.pending.lock().pop_front();
        if take_one(&self.state.handshake_failures) {
            return Err(ConnectionError::Tls("mock handshake failure".to_string()));
        }
        let server = server.ok_or(ConnectionError::Closed)?;
        let _ = self.state.sessions.send(BrokerSession::new(server));
        Ok(stream)
    }
}

impl MockBroker {
    /// Wait for the client to complete a handshake.
    pub async fn next_session(&mut self, wait: Duration) -> Option<BrokerSession> {
        tokio::time::timeout(wait, self.sessions.recv()).await.ok().flatten()
    }
}

/// One accepted client stream, seen from the broker.
pub struct BrokerSession {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
    buf: Vec<u8>,
}

impl BrokerSession {
    fn new(stream: DuplexStream) -> Self {
        let (read_half, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(read_half),
            writer,
            buf: Vec::new(),
        }
    }

    /// Next frame from the client, or `None` at EOF.
    ///
    /// Frames that are not JSON come back as a JSON string.
    pub async fn recv(&mut self) -> Option<Value> {
        loop {
            let n = self.reader.read_until(b'\n', &mut self.buf).await.ok()?;
            if n == 0 && self.buf.is_empty() {
                return None;
            }
            let line = std::mem::take(&mut self.buf);
            let text = String::from_utf8_lossy(&line);
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            return Some(
                serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())),
            );
        }
    }

    /// Next frame with the given `cmd`, skipping others, within `wait`.
    pub async fn recv_cmd(&mut self, cmd: &str, wait: Duration) -> Option<Value> {
        tokio::time::timeout(wait, async {
            loop {
                let frame = self.recv().await?;
                if frame["cmd"] == cmd {
                    return Some(frame);
                }
            }
        })
        .await
        .ok()
        .flatten()
    }

    pub async fn send(&mut self, frame: &Value) -> io::Result<()> {
        let mut bytes = serde_json::to_vec(frame)?;
        bytes.push(b'\n');
        self.send_raw(&bytes).await
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await
    }

    /// Wait for `login_req` and accept it. Returns the login request.
    pub async fn accept_login(&mut self, wait: Duration) -> Option<Value> {
        let request = self.recv_cmd("login_req", wait).await?;
        self.send(&json!({"cmd": "login_res", "data": {"result": true, "msg": "ok"}}))
            .await
            .ok()?;
        Some(request)
    }

    /// Wait for `login_req` and refuse it with `reason`.
    pub async fn reject_login(&mut self, reason: &str, wait: Duration) -> Option<Value> {
        let request = self.recv_cmd("login_req", wait).await?;
        self.send(&json!({"cmd": "login_res", "data": {"result": false, "msg": reason}}))
            .await
            .ok()?;
        Some(request)
    }

    pub async fn pong(&mut self) -> io::Result<()> {
        self.send(&json!({"cmd": "pong"})).await
    }

    /// Push an event frame.
    pub async fn push_event(
        &mut self,
        msg_id: &str,
        delivery_id: Value,
        event_type: &str,
        data: Value,
    ) -> io::Result<()> {
        self.send(&json!({
            "cmd": "event_push",
            "msg_id": msg_id,
            "delivery_id": delivery_id,
            "event_type": event_type,
            "product_key": "test-product",
            "did": "device-1",
            "mac": "aabbccddeeff",
            "data": data,
            "created_at": 1_700_000_000.5,
        }))
        .await
    }

    /// True once the client closes its end within `wait`.
    pub async fn closed(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, async { while self.recv().await.is_some() {} })
            .await
            .is_ok()
    }
}

/// Valid settings pointing at a fake broker.
pub fn test_settings() -> Settings {
    Settings::builder()
        .broker_url("broker.test:2017")
        .auth_id("test-auth-id")
        .auth_secret("test-auth-secret")
        .product_key("test-product")
        .sub_key("test-sub")
        .build()
        .expect("test settings are valid")
}

/// Millisecond-scale timings so lifecycle tests run quickly.
pub fn fast_timings() -> ClientTimings {
    ClientTimings {
        retry_delay: Duration::from_millis(50),
        heartbeat_interval: Duration::from_millis(50),
        heartbeat_timeout: Duration::from_millis(200),
        io_timeout: Duration::from_millis(20),
        poll_timeout: Duration::from_millis(20),
        login_timeout: Duration::from_millis(500),
        teardown_grace: Duration::from_millis(10),
    }
}
