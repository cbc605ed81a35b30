//! Server-sent event frames produced by the relay itself.

use bytes::Bytes;
use serde_json::json;

/// Media type of server-push streams.
pub const EVENT_STREAM: &str = "text/event-stream";

/// Event name of the notice sent to unauthenticated callers.
pub const UNAUTHENTICATED_EVENT: &str = "error";

/// Event name of the frame appended when the upstream stream breaks.
pub const RELAY_ERROR_EVENT: &str = "relay-error";

/// Encode one event frame. `data` is serialized on a single line.
pub fn event_frame(event: &str, data: &serde_json::Value) -> Bytes {
    Bytes::from(format!("event: {event}\ndata: {data}\n\n"))
}

/// The single frame sent to callers without an access credential.
pub fn unauthenticated_notice() -> Bytes {
    event_frame(
        UNAUTHENTICATED_EVENT,
        &json!({"code": "UNAUTHENTICATED", "message": "Not authenticated"}),
    )
}

/// Frame appended when the upstream stream fails after bytes were sent.
pub fn relay_error_frame(code: &str, message: &str) -> Bytes {
    event_frame(RELAY_ERROR_EVENT, &json!({"code": code, "message": message}))
}
