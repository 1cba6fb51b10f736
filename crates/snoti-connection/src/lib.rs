//! Connection to the SNOTI push broker.
//!
//! This crate provides:
//! - TLS transport to the broker (certificate verification on by default)
//! - Login, heartbeat and automatic redial with a fixed delay
//! - Bounded drop-oldest queues between the socket and its callers
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────── session (one per socket) ────────────┐
//! broker ──TLS──► │ reader ──► ingress queue ──► Connection::read()  │
//!        ◄─────── │ writer ◄── egress queue  ◄── Connection::write() │
//!                 │ heartbeat: ping every 15s, drop after 60s silent │
//!                 └──────────────────────────────────────────────────┘
//!                        ▲ redial loop: Connection::connect()
//! ```

mod client;
mod error;
mod framing;
mod heartbeat;
mod queue;
mod settings;
mod transport;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

#[cfg(test)]
mod tests;

pub use client::{ClientTimings, Connection, ConnectionState, SnotiClient, QUEUE_CAPACITY};
pub use error::{ConnectionError, ConnectionResult};
pub use framing::{FrameReader, MAX_FRAME_LEN};
pub use heartbeat::Heartbeat;
pub use queue::DropOldestQueue;
pub use settings::{CertificateVerification, Settings, SettingsBuilder};
pub use transport::{TlsTransport, Transport};
