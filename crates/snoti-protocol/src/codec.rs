//! Newline-delimited JSON framing.
//!
//! Encoding and decoding never fail. A value that cannot be serialized
//! encodes to a bare delimiter. Bytes that are not a JSON object decode to an
//! [`Envelope`] with an empty command, which callers treat as "ignore this
//! frame". Inside an object, a null or mistyped field only loses that field.

use crate::messages::{AckRequest, Envelope};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;

/// Terminates every frame on the wire.
pub const FRAME_DELIMITER: u8 = b'\n';

/// Serialize `value` and append the frame delimiter.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Vec<u8> {
    let mut buf = serde_json::to_vec(value).unwrap_or_default();
    buf.push(FRAME_DELIMITER);
    buf
}

/// Best-effort parse of an inbound frame.
pub fn decode(frame: &[u8]) -> Envelope {
    decode_object(frame)
}

/// Parse `frame` as a JSON object into `T`, or `T::default()` for anything else.
fn decode_object<T: DeserializeOwned + Default>(frame: &[u8]) -> T {
    match serde_json::from_slice::<Value>(frame) {
        Ok(object @ Value::Object(_)) => T::deserialize(object).unwrap_or_default(),
        _ => T::default(),
    }
}

/// Build the `event_ack` frame for a delivered event frame.
///
/// `msg_id` and `delivery_id` are copied verbatim; missing ids fall back to
/// `""` and `0`.
pub fn build_ack(frame: &[u8]) -> Vec<u8> {
    let delivered: AckRequest = decode_object(frame);
    encode(&AckRequest::new(delivered.msg_id, delivered.delivery_id))
}

/// Frame content as a single log-friendly line.
pub fn display_frame(frame: &[u8]) -> Cow<'_, str> {
    let text = String::from_utf8_lossy(frame);
    if text.contains(['\n', '\r']) {
        Cow::Owned(text.replace(['\n', '\r'], ""))
    } else {
        text
    }
}
