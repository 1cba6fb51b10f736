//! Handler capability and registry.

use crate::{TriggerError, TriggerResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use snoti_protocol::{DeliveryId, EventPush, EventType};
use std::sync::Arc;

/// A delivered broker message as handed to handlers.
///
/// `message` is the frame's JSON text, unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerOutput {
    pub message: String,
}

impl TriggerOutput {
    /// Wrap a frame that holds a JSON object. Anything else yields `None`.
    pub fn from_frame(frame: &[u8]) -> Option<Self> {
        let value: Value = serde_json::from_slice(frame).ok()?;
        value.is_object().then(|| Self {
            message: String::from_utf8_lossy(frame).trim().to_string(),
        })
    }

    /// The message as a JSON object. Empty if it is not one.
    pub fn to_map(&self) -> Map<String, Value> {
        serde_json::from_str(&self.message).unwrap_or_default()
    }

    /// Build a message from a JSON object.
    pub fn from_map(values: &Map<String, Value>) -> TriggerResult<Self> {
        Ok(Self {
            message: serde_json::to_string(values)?,
        })
    }

    /// Typed view of the message. A field that is null or mistyped takes its
    /// default without affecting the others.
    pub fn event(&self) -> EventPush {
        serde_json::from_str(&self.message).unwrap_or_default()
    }
}

/// Identity of the message a handler is working on.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerContext {
    pub msg_id: String,
    pub delivery_id: DeliveryId,
    pub event_type: String,
    pub product_key: String,
    pub device_id: String,
    pub received_at: DateTime<Utc>,
}

impl HandlerContext {
    pub fn new(event: &EventPush, received_at: DateTime<Utc>) -> Self {
        Self {
            msg_id: event.msg_id.clone(),
            delivery_id: event.delivery_id.clone(),
            event_type: event.event_type.clone(),
            product_key: event.product_key.clone(),
            device_id: event.device_id.clone(),
            received_at,
        }
    }

    /// The event category, if it is a subscribed one.
    pub fn event_kind(&self) -> Option<EventType> {
        EventType::from_wire(&self.event_type)
    }
}

/// What a handler did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandlerOutcome {
    #[default]
    Handled,
    /// The message was not relevant to this handler.
    Skipped,
}

/// Consumer of delivered messages.
///
/// Every registered handler sees every message. Errors are logged and the
/// message is still acknowledged, so a handler must not rely on redelivery.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Unique name used in logs.
    fn name(&self) -> &str;

    async fn handle(
        &self,
        ctx: &HandlerContext,
        message: &TriggerOutput,
    ) -> anyhow::Result<HandlerOutcome>;
}

/// Ordered set of uniquely named handlers.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::DuplicateHandler`] if the name is taken.
    pub fn register(&mut self, handler: impl Handler) -> TriggerResult<()> {
        self.register_arc(Arc::new(handler))
    }

    pub fn register_arc(&mut self, handler: Arc<dyn Handler>) -> TriggerResult<()> {
        if self.handlers.iter().any(|h| h.name() == handler.name()) {
            return Err(TriggerError::DuplicateHandler(handler.name().to_string()));
        }
        self.handlers.push(handler);
        Ok(())
    }

    /// Builder-style [`HandlerRegistry::register`].
    pub fn with(mut self, handler: impl Handler) -> TriggerResult<Self> {
        self.register(handler)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Handler>> {
        self.handlers.iter()
    }
}
