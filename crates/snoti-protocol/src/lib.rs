//! SNOTI push protocol.
//!
//! This crate provides:
//! - Frame types exchanged with the broker (login, heartbeat, events, acks)
//! - Newline-delimited JSON codec
//! - The catalogue of subscribed event types and their typed payloads

mod codec;
mod events;
mod messages;

pub use codec::{build_ack, decode, display_frame, encode, FRAME_DELIMITER};
pub use events::{AttrReport, EventType};
pub use messages::{
    AckRequest, DeliveryId, Envelope, EventPush, LoginCredentials, LoginRequest, LoginResponse,
    LoginResult, PingRequest, CMD_EVENT_ACK, CMD_EVENT_PUSH, CMD_INVALID_MSG, CMD_LOGIN_REQ,
    CMD_LOGIN_RES, CMD_PING, CMD_PONG, DEFAULT_PREFETCH_COUNT,
};
