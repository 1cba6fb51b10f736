//! SNOTI protocol frames.

use crate::events::{AttrReport, EventType};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

pub const CMD_LOGIN_REQ: &str = "login_req";
pub const CMD_LOGIN_RES: &str = "login_res";
pub const CMD_PING: &str = "ping";
pub const CMD_PONG: &str = "pong";
pub const CMD_EVENT_PUSH: &str = "event_push";
pub const CMD_EVENT_ACK: &str = "event_ack";
pub const CMD_INVALID_MSG: &str = "invalid_msg";

/// Unacknowledged events the broker may push before it waits for acks.
pub const DEFAULT_PREFETCH_COUNT: u32 = 100;

/// Read one field, falling back to its default when it is null or of the
/// wrong type. A bad field never blanks the rest of the frame.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

/// Generic view of any inbound frame.
///
/// Every field defaults when absent, null or mistyped. The command is empty
/// only when the frame carries no string `cmd`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Envelope {
    #[serde(deserialize_with = "lenient")]
    pub cmd: String,
    #[serde(deserialize_with = "lenient")]
    pub event_type: String,
    #[serde(deserialize_with = "lenient")]
    pub error_code: i64,
    #[serde(rename = "msg", deserialize_with = "lenient")]
    pub message: String,
}

impl Envelope {
    /// True when no command could be read from the frame.
    pub fn is_empty(&self) -> bool {
        self.cmd.is_empty()
    }
}

/// Credentials and subscriptions for one product.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub product_key: String,
    pub auth_id: String,
    pub auth_secret: String,
    #[serde(rename = "subkey")]
    pub sub_key: String,
    pub events: Vec<String>,
}

impl LoginCredentials {
    /// Credentials subscribed to every category in [`EventType::SUBSCRIBED`].
    pub fn new(
        product_key: impl Into<String>,
        auth_id: impl Into<String>,
        auth_secret: impl Into<String>,
        sub_key: impl Into<String>,
    ) -> Self {
        Self {
            product_key: product_key.into(),
            auth_id: auth_id.into(),
            auth_secret: auth_secret.into(),
            sub_key: sub_key.into(),
            events: EventType::SUBSCRIBED
                .iter()
                .map(|t| t.as_str().to_string())
                .collect(),
        }
    }
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("product_key", &self.product_key)
            .field("auth_id", &self.auth_id)
            .field("auth_secret", &"<redacted>")
            .field("sub_key", &self.sub_key)
            .field("events", &self.events)
            .finish()
    }
}

/// First frame of every session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub cmd: String,
    pub prefetch_count: u32,
    pub data: Vec<LoginCredentials>,
}

impl LoginRequest {
    pub fn new(credentials: LoginCredentials) -> Self {
        Self {
            cmd: CMD_LOGIN_REQ.to_string(),
            prefetch_count: DEFAULT_PREFETCH_COUNT,
            data: vec![credentials],
        }
    }
}

/// Broker reply to a [`LoginRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(default, deserialize_with = "lenient")]
    pub cmd: String,
    pub data: LoginResult,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResult {
    pub result: bool,
    #[serde(default, rename = "msg", deserialize_with = "lenient")]
    pub message: String,
}

/// Heartbeat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingRequest {
    pub cmd: String,
}

impl Default for PingRequest {
    fn default() -> Self {
        Self {
            cmd: CMD_PING.to_string(),
        }
    }
}

/// Broker-assigned delivery identifier.
///
/// Status events carry it as an integer, fault and alert events as a
/// string. Whatever form arrives is echoed back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeliveryId {
    Number(i64),
    Text(String),
    Other(serde_json::Value),
}

impl Default for DeliveryId {
    fn default() -> Self {
        DeliveryId::Number(0)
    }
}

impl From<i64> for DeliveryId {
    fn from(id: i64) -> Self {
        DeliveryId::Number(id)
    }
}

impl From<&str> for DeliveryId {
    fn from(id: &str) -> Self {
        DeliveryId::Text(id.to_string())
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryId::Number(n) => write!(f, "{n}"),
            DeliveryId::Text(s) => f.write_str(s),
            DeliveryId::Other(v) => write!(f, "{v}"),
        }
    }
}

/// Acknowledgment of one delivered event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AckRequest {
    #[serde(default, deserialize_with = "lenient")]
    pub cmd: String,
    #[serde(default, deserialize_with = "lenient")]
    pub msg_id: String,
    #[serde(default)]
    pub delivery_id: DeliveryId,
}

impl AckRequest {
    pub fn new(msg_id: impl Into<String>, delivery_id: DeliveryId) -> Self {
        Self {
            cmd: CMD_EVENT_ACK.to_string(),
            msg_id: msg_id.into(),
            delivery_id,
        }
    }
}

/// An event pushed by the broker.
///
/// Fields are read one by one: a null or mistyped field takes its default
/// and the others keep their values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventPush {
    #[serde(deserialize_with = "lenient")]
    pub cmd: String,
    #[serde(deserialize_with = "lenient")]
    pub msg_id: String,
    pub delivery_id: DeliveryId,
    #[serde(deserialize_with = "lenient")]
    pub event_type: String,
    #[serde(deserialize_with = "lenient")]
    pub product_key: String,
    #[serde(rename = "did", deserialize_with = "lenient")]
    pub device_id: String,
    #[serde(rename = "mac", deserialize_with = "lenient")]
    pub device_mac: String,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub created_at: Option<f64>,
}

impl EventPush {
    /// The event category, if it is one of the subscribed ones.
    pub fn kind(&self) -> Option<EventType> {
        EventType::from_wire(&self.event_type)
    }

    /// Attribute values of a `device.status.kv` event.
    pub fn attributes(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        match self.kind() {
            Some(EventType::DeviceStatusKv) => self.data.as_object(),
            _ => None,
        }
    }

    /// Fault or alert details of a `device.attrs_fault` / `device.attr_alert` event.
    pub fn attr_report(&self) -> Option<AttrReport> {
        if !self.kind()?.carries_attr_report() {
            return None;
        }
        serde_json::from_value(self.data.clone()).ok()
    }

    /// Broker timestamp of the event.
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        let secs = self.created_at?;
        if !secs.is_finite() {
            return None;
        }
        DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
    }
}
