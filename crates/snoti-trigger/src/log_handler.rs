//! Built-in handler that logs every delivered event.

use crate::{Handler, HandlerContext, HandlerOutcome, TriggerOutput};
use async_trait::async_trait;
use snoti_protocol::EventType;
use tracing::info;

/// Logs each event with its type, device and payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEventHandler;

#[async_trait]
impl Handler for LogEventHandler {
    fn name(&self) -> &str {
        "log"
    }

    async fn handle(
        &self,
        ctx: &HandlerContext,
        message: &TriggerOutput,
    ) -> anyhow::Result<HandlerOutcome> {
        let event = message.event();
        let created_at = event.created_at_utc().map(|t| t.to_rfc3339());

        match ctx.event_kind() {
            Some(EventType::DeviceStatusKv) => {
                let attributes = event
                    .attributes()
                    .map(|a| serde_json::Value::Object(a.clone()).to_string())
                    .unwrap_or_default();
                info!(
                    msg_id = %ctx.msg_id,
                    device_id = %ctx.device_id,
                    product_key = %ctx.product_key,
                    created_at = ?created_at,
                    attributes = %attributes,
                    "Device status"
                );
            }
            Some(kind) if kind.carries_attr_report() => {
                let report = event.attr_report().unwrap_or_default();
                info!(
                    msg_id = %ctx.msg_id,
                    device_id = %ctx.device_id,
                    event_type = %kind,
                    attr = %report.attr_name,
                    display_name = %report.display_name,
                    raised = report.value != 0,
                    "Device attribute report"
                );
            }
            Some(kind) => {
                info!(
                    msg_id = %ctx.msg_id,
                    device_id = %ctx.device_id,
                    mac = %event.device_mac,
                    event_type = %kind,
                    created_at = ?created_at,
                    "Device presence"
                );
            }
            None => {
                info!(
                    msg_id = %ctx.msg_id,
                    event_type = %ctx.event_type,
                    content = %message.message,
                    "Unrecognised event"
                );
                return Ok(HandlerOutcome::Skipped);
            }
        }
        Ok(HandlerOutcome::Handled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    async fn run(frame: serde_json::Value) -> HandlerOutcome {
        let message = TriggerOutput::from_frame(frame.to_string().as_bytes()).unwrap();
        let ctx = HandlerContext::new(&message.event(), Utc::now());
        LogEventHandler.handle(&ctx, &message).await.unwrap()
    }

    #[tokio::test]
    async fn test_known_events_are_handled() {
        let kv = json!({"event_type": "device.status.kv", "data": {"Switch": 1}});
        assert_eq!(run(kv).await, HandlerOutcome::Handled);

        let fault = json!({
            "event_type": "device.attrs_fault",
            "data": {"attr_name": "overheat", "attr_displayname": "Overheat", "value": 1}
        });
        assert_eq!(run(fault).await, HandlerOutcome::Handled);

        let online = json!({"event_type": "device.online", "mac": "aabbcc"});
        assert_eq!(run(online).await, HandlerOutcome::Handled);
    }

    #[tokio::test]
    async fn test_unknown_event_is_skipped() {
        let other = json!({"event_type": "device.bound"});
        assert_eq!(run(other).await, HandlerOutcome::Skipped);
    }
}
