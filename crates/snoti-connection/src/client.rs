//! Self-healing broker client.

use crate::{
    ConnectionError, ConnectionResult, DropOldestQueue, FrameReader, Heartbeat, Settings,
    TlsTransport, Transport,
};
use async_trait::async_trait;
use snoti_protocol::{
    decode, display_frame, encode, LoginResponse, PingRequest, CMD_INVALID_MSG, CMD_PONG,
};
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::watch;
use tokio::time::{interval_at, sleep, timeout, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Capacity of the ingress and egress queues.
pub const QUEUE_CAPACITY: usize = 128;

/// Timing knobs of the connection lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientTimings {
    /// Pause after a failed dial, handshake or login.
    pub retry_delay: Duration,
    /// Period between heartbeat checks (and pings).
    pub heartbeat_interval: Duration,
    /// Silence after which a session is considered lost.
    pub heartbeat_timeout: Duration,
    /// Deadline for one socket read or write.
    pub io_timeout: Duration,
    /// How long [`Connection::read`] waits for a frame.
    pub poll_timeout: Duration,
    /// Deadline for each step of establishing a session.
    pub login_timeout: Duration,
    /// Pause before redialing after a lost session.
    pub teardown_grace: Duration,
}

impl Default for ClientTimings {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(15),
            heartbeat_interval: Duration::from_secs(15),
            heartbeat_timeout: Duration::from_secs(60),
            io_timeout: Duration::from_secs(1),
            poll_timeout: Duration::from_secs(1),
            login_timeout: Duration::from_secs(15),
            teardown_grace: Duration::from_secs(1),
        }
    }
}

/// Lifecycle state of the broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Dialing,
    TlsHandshaking,
    LoggingIn,
    Connected,
    Closing,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Dialing => "dialing",
            Self::TlsHandshaking => "tls_handshaking",
            Self::LoggingIn => "logging_in",
            Self::Connected => "connected",
            Self::Closing => "closing",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A long-lived, self-healing frame connection.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Keep a session up until [`Connection::close`] is called.
    async fn connect(&self);

    /// Request orderly shutdown. `connect` returns once teardown is done.
    fn close(&self);

    /// Next inbound frame, or `None` if none arrived within the poll timeout.
    async fn read(&self) -> Option<Vec<u8>>;

    /// Queue an outbound frame. Never blocks; a full queue drops its oldest frame.
    fn write(&self, frame: Vec<u8>);
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Lost,
    Shutdown,
}

/// A logged-in stream split for the reader and writer tasks.
struct Session<S> {
    reader: FrameReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
}

/// What the reader does with one inbound frame.
#[derive(Debug, PartialEq, Eq)]
enum Inbound {
    Blank,
    Pong,
    Rejected { code: i64, message: String },
    Malformed,
    Deliver,
}

fn classify(frame: &[u8]) -> Inbound {
    if frame.iter().all(u8::is_ascii_whitespace) {
        return Inbound::Blank;
    }
    let envelope = decode(frame);
    match envelope.cmd.as_str() {
        "" => Inbound::Malformed,
        CMD_PONG => Inbound::Pong,
        CMD_INVALID_MSG => Inbound::Rejected {
            code: envelope.error_code,
            message: envelope.message,
        },
        _ => Inbound::Deliver,
    }
}

/// SNOTI broker client.
///
/// One client outlives many socket sessions. Frames read from the broker
/// wait in the ingress queue for [`Connection::read`]; frames passed to
/// [`Connection::write`] wait in the egress queue and survive a redial.
pub struct SnotiClient<T: Transport = TlsTransport> {
    settings: Settings,
    transport: T,
    timings: ClientTimings,
    state: watch::Sender<ConnectionState>,
    ingress: Arc<DropOldestQueue<Vec<u8>>>,
    egress: Arc<DropOldestQueue<Vec<u8>>>,
    shutdown: CancellationToken,
    running: AtomicBool,
}

impl SnotiClient<TlsTransport> {
    /// Client using TLS over TCP.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Tls`] if the TLS configuration cannot be built.
    pub fn new(settings: Settings) -> ConnectionResult<Self> {
        let transport = TlsTransport::from_settings(&settings)?;
        Ok(Self::with_transport(settings, transport))
    }
}

impl<T: Transport> SnotiClient<T> {
    /// Client using a custom transport.
    pub fn with_transport(settings: Settings, transport: T) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            settings,
            transport,
            timings: ClientTimings::default(),
            state,
            ingress: Arc::new(DropOldestQueue::new(QUEUE_CAPACITY)),
            egress: Arc::new(DropOldestQueue::new(QUEUE_CAPACITY)),
            shutdown: CancellationToken::new(),
            running: AtomicBool::new(false),
        }
    }

    pub fn with_timings(mut self, timings: ClientTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to lifecycle state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Frames waiting in the ingress queue.
    pub fn pending_inbound(&self) -> usize {
        self.ingress.len()
    }

    /// Frames waiting in the egress queue.
    pub fn pending_outbound(&self) -> usize {
        self.egress.len()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "Connection state changed");
        }
    }

    /// Sleep unless shutdown arrives first. Returns false on shutdown.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = sleep(delay) => true,
        }
    }

    async fn run(&self) {
        let broker = self.settings.broker_url();
        info!(broker = %broker, "Starting broker connection");

        while !self.shutdown.is_cancelled() {
            let established = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                result = self.establish() => result,
            };

            match established {
                Ok(session) => {
                    if self.run_session(session).await == SessionEnd::Shutdown {
                        break;
                    }
                    info!(
                        broker = %broker,
                        redial_in_ms = self.timings.teardown_grace.as_millis() as u64,
                        "Session lost, redialing"
                    );
                    if !self.pause(self.timings.teardown_grace).await {
                        break;
                    }
                }
                Err(e) => {
                    error!(
                        broker = %broker,
                        stage = %self.state(),
                        error = %e,
                        retry_in_secs = self.timings.retry_delay.as_secs(),
                        "Failed to establish broker session"
                    );
                    self.set_state(ConnectionState::Disconnected);
                    if !self.pause(self.timings.retry_delay).await {
                        break;
                    }
                }
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!(broker = %broker, "Broker connection stopped");
    }

    /// Dial, secure and log in.
    async fn establish(&self) -> ConnectionResult<Session<T::Secured>> {
        let broker = self.settings.broker_url();
        let step = self.timings.login_timeout;

        self.set_state(ConnectionState::Dialing);
        debug!(broker = %broker, "Dialing broker");
        let stream = timeout(step, self.transport.dial(broker))
            .await
            .map_err(|_| ConnectionError::Timeout("dial"))??;

        self.set_state(ConnectionState::TlsHandshaking);
        let secured = timeout(step, self.transport.secure(self.settings.server_name(), stream))
            .await
            .map_err(|_| ConnectionError::Timeout("TLS handshake"))??;

        self.set_state(ConnectionState::LoggingIn);
        let (read_half, mut writer) = tokio::io::split(secured);
        let mut reader = FrameReader::new(read_half);
        timeout(step, self.login(&mut reader, &mut writer))
            .await
            .map_err(|_| ConnectionError::Timeout("login response"))??;

        Ok(Session { reader, writer })
    }

    async fn login<R, W>(&self, reader: &mut FrameReader<R>, writer: &mut W) -> ConnectionResult<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&encode(&self.settings.login_request())).await?;
        writer.flush().await?;

        let frame = reader.next_frame().await?.ok_or(ConnectionError::Closed)?;
        let response: LoginResponse = serde_json::from_slice(&frame)?;
        if !response.data.result {
            return Err(ConnectionError::Authentication(response.data.message));
        }

        info!(
            broker = %self.settings.broker_url(),
            product_key = %self.settings.product_key(),
            "Logged in to broker"
        );
        Ok(())
    }

    async fn run_session(&self, session: Session<T::Secured>) -> SessionEnd {
        let Session { reader, writer } = session;
        let token = self.shutdown.child_token();
        let heartbeat = Arc::new(Heartbeat::new());

        self.set_state(ConnectionState::Connected);

        let read_task = tokio::spawn(read_loop(
            reader,
            self.ingress.clone(),
            heartbeat.clone(),
            token.clone(),
            self.timings.io_timeout,
        ));
        let write_task = tokio::spawn(write_loop(
            writer,
            self.egress.clone(),
            token.clone(),
            self.timings.io_timeout,
        ));

        let end = self.watch_heartbeat(&heartbeat).await;

        self.set_state(ConnectionState::Closing);
        token.cancel();

        match (read_task.await, write_task.await) {
            (Ok(reader), Ok(writer)) => {
                let mut stream = reader.into_inner().unsplit(writer);
                if timeout(self.timings.io_timeout, stream.shutdown()).await.is_err() {
                    debug!("Timed out shutting down broker stream");
                }
            }
            (read, write) => {
                for err in [read.err(), write.err()].into_iter().flatten() {
                    error!(error = %err, "Session task failed");
                }
            }
        }

        if !self.egress.is_empty() {
            debug!(pending = self.egress.len(), "Outbound frames held for next session");
        }
        self.set_state(ConnectionState::Disconnected);
        end
    }

    /// Ping on every tick until the broker goes quiet or shutdown arrives.
    async fn watch_heartbeat(&self, heartbeat: &Heartbeat) -> SessionEnd {
        let period = self.timings.heartbeat_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return SessionEnd::Shutdown,
                _ = ticker.tick() => {}
            }

            let silence = heartbeat.elapsed();
            if silence > self.timings.heartbeat_timeout {
                warn!(
                    broker = %self.settings.broker_url(),
                    silent_ms = silence.as_millis() as u64,
                    "No heartbeat from broker, dropping session"
                );
                return SessionEnd::Lost;
            }
            self.write(encode(&PingRequest::default()));
        }
    }
}

#[async_trait]
impl<T: Transport> Connection for SnotiClient<T> {
    async fn connect(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("Broker connection is already running");
            return;
        }
        self.run().await;
        self.running.store(false, Ordering::Release);
    }

    fn close(&self) {
        if !self.shutdown.is_cancelled() {
            info!(broker = %self.settings.broker_url(), "Closing broker connection");
            self.shutdown.cancel();
        }
    }

    async fn read(&self) -> Option<Vec<u8>> {
        self.ingress.pop_timeout(self.timings.poll_timeout).await
    }

    fn write(&self, frame: Vec<u8>) {
        if let Some(lost) = self.egress.push(frame) {
            error!(content = %display_frame(&lost), "Egress queue full, dropped oldest frame");
        }
    }
}

async fn read_loop<R>(
    mut reader: FrameReader<R>,
    ingress: Arc<DropOldestQueue<Vec<u8>>>,
    heartbeat: Arc<Heartbeat>,
    token: CancellationToken,
    io_timeout: Duration,
) -> FrameReader<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    loop {
        let next = tokio::select! {
            _ = token.cancelled() => break,
            next = timeout(io_timeout, reader.next_frame()) => next,
        };

        let pause = match next {
            Err(_) => false,
            Ok(Ok(Some(frame))) => {
                accept_inbound(frame, &ingress, &heartbeat);
                false
            }
            Ok(Ok(None)) => {
                debug!("Broker stream reached EOF");
                true
            }
            Ok(Err(e)) if e.kind() == io::ErrorKind::InvalidData => {
                warn!(error = %e, "Discarding oversized frame");
                false
            }
            Ok(Err(e)) => {
                debug!(error = %e, "Read from broker failed");
                true
            }
        };

        if pause {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = sleep(io_timeout) => {}
            }
        }
    }
    reader
}

fn accept_inbound(frame: Vec<u8>, ingress: &DropOldestQueue<Vec<u8>>, heartbeat: &Heartbeat) {
    match classify(&frame) {
        Inbound::Blank => {}
        Inbound::Pong => {
            trace!("Heartbeat from broker");
            heartbeat.beat();
        }
        Inbound::Rejected { code, message } => {
            error!(error_code = code, message = %message, "Broker rejected a frame");
        }
        Inbound::Malformed => {
            warn!(content = %display_frame(&frame), "Discarding malformed frame");
        }
        Inbound::Deliver => {
            if let Some(lost) = ingress.push(frame) {
                error!(content = %display_frame(&lost), "Ingress queue full, dropped oldest frame");
            }
        }
    }
}

async fn write_loop<W>(
    mut writer: W,
    egress: Arc<DropOldestQueue<Vec<u8>>>,
    token: CancellationToken,
    io_timeout: Duration,
) -> W
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    loop {
        let frame = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            frame = egress.pop() => frame,
        };

        let written = timeout(io_timeout, async {
            writer.write_all(&frame).await?;
            writer.flush().await
        })
        .await;

        match written {
            Ok(Ok(())) => trace!(bytes = frame.len(), "Frame written"),
            Ok(Err(e)) => {
                error!(error = %e, content = %display_frame(&frame), "Failed to write frame");
            }
            Err(_) => {
                error!(content = %display_frame(&frame), "Timed out writing frame");
            }
        }
    }
    writer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings() {
        let timings = ClientTimings::default();
        assert_eq!(timings.retry_delay, Duration::from_secs(15));
        assert_eq!(timings.heartbeat_interval, Duration::from_secs(15));
        assert_eq!(timings.heartbeat_timeout, Duration::from_secs(60));
        assert_eq!(timings.io_timeout, Duration::from_secs(1));
        assert_eq!(timings.poll_timeout, Duration::from_secs(1));
        assert_eq!(timings.teardown_grace, Duration::from_secs(1));
    }

    #[test]
    fn test_classify_frames() {
        assert_eq!(classify(b"{\"cmd\":\"pong\"}"), Inbound::Pong);
        assert_eq!(classify(b"  \r"), Inbound::Blank);
        assert_eq!(classify(b""), Inbound::Blank);
        assert_eq!(classify(b"not json"), Inbound::Malformed);
        assert_eq!(classify(b"{\"msg_id\":\"m1\"}"), Inbound::Malformed);
        assert_eq!(
            classify(b"{\"cmd\":\"invalid_msg\",\"error_code\":4001,\"msg\":\"bad\"}"),
            Inbound::Rejected {
                code: 4001,
                message: "bad".to_string()
            }
        );
        assert_eq!(
            classify(b"{\"cmd\":\"event_push\",\"msg_id\":\"m1\"}"),
            Inbound::Deliver
        );
    }

    #[test]
    fn test_classify_keeps_command_despite_odd_fields() {
        assert_eq!(
            classify(
                br#"{"cmd":"event_push","msg_id":"m1","delivery_id":42,"event_type":null,"msg":null}"#
            ),
            Inbound::Deliver
        );
        assert_eq!(
            classify(br#"{"cmd":"invalid_msg","error_code":"4001","msg":"bad"}"#),
            Inbound::Rejected {
                code: 0,
                message: "bad".to_string()
            }
        );
        assert_eq!(classify(br#"{"cmd":null,"msg_id":"m1"}"#), Inbound::Malformed);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::TlsHandshaking.to_string(), "tls_handshaking");
        assert_eq!(ConnectionState::Connected.as_str(), "connected");
    }

    #[test]
    fn test_write_evicts_oldest_outbound_frame() {
        let settings = Settings::builder()
            .broker_url("broker.test:2017")
            .auth_id("id")
            .auth_secret("secret")
            .product_key("pk")
            .sub_key("sub")
            .build()
            .unwrap();
        let client = SnotiClient::new(settings).unwrap();

        for i in 0..=QUEUE_CAPACITY {
            client.write(format!("{i}\n").into_bytes());
        }

        assert_eq!(client.pending_outbound(), QUEUE_CAPACITY);
        assert_eq!(client.egress.try_pop().unwrap(), b"1\n");
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_read_times_out_when_empty() {
        let settings = Settings::builder()
            .broker_url("broker.test:2017")
            .auth_id("id")
            .auth_secret("secret")
            .product_key("pk")
            .sub_key("sub")
            .build()
            .unwrap();
        let client = SnotiClient::new(settings).unwrap().with_timings(ClientTimings {
            poll_timeout: Duration::from_millis(10),
            ..ClientTimings::default()
        });

        assert!(client.read().await.is_none());
        client.ingress.push(b"frame".to_vec());
        assert_eq!(client.read().await.unwrap(), b"frame");
    }
}
