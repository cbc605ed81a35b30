//! Error body decoding.
//!
//! A failed response body is run through an ordered list of decoders; the
//! first one that produces a result wins:
//!
//! 1. [`decode_json`]: a JSON object with a `message`, `detail` or `error` string
//! 2. [`decode_text`]: any non-empty plain text
//! 3. [`status_line`]: `"<code> <reason>"`, which always succeeds

use reqwest::StatusCode;

use crate::error::GatewayError;

/// Message (and optional structured details) extracted from an error body.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedError {
    pub message: String,
    pub details: Option<serde_json::Value>,
}

type Decoder = fn(&str) -> Option<DecodedError>;

const DECODERS: &[Decoder] = &[decode_json, decode_text];

const MESSAGE_FIELDS: &[&str] = &["message", "detail", "error"];

/// Decode a structured JSON error body.
pub fn decode_json(body: &str) -> Option<DecodedError> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let object = value.as_object()?;

    let message = MESSAGE_FIELDS
        .iter()
        .find_map(|field| object.get(*field).and_then(|v| v.as_str()))
        .map(str::trim)
        .filter(|m| !m.is_empty())?
        .to_string();

    Some(DecodedError {
        message,
        details: Some(value),
    })
}

/// Use the raw body text as the message.
pub fn decode_text(body: &str) -> Option<DecodedError> {
    let text = body.trim();
    if text.is_empty() {
        return None;
    }

    Some(DecodedError {
        message: text.to_string(),
        details: None,
    })
}

/// Generic message built from the status line alone.
pub fn status_line(status: StatusCode) -> DecodedError {
    let message = match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => format!("Request failed with status {}", status.as_u16()),
    };

    DecodedError {
        message,
        details: None,
    }
}

/// Run the decoder chain over `body`.
pub fn decode_error_body(status: StatusCode, body: &str) -> DecodedError {
    DECODERS
        .iter()
        .find_map(|decode| decode(body))
        .unwrap_or_else(|| status_line(status))
}

/// Build the [`GatewayError`] for a non-success response.
pub fn backend_error(status: StatusCode, body: &str) -> GatewayError {
    let decoded = decode_error_body(status, body);
    let error = GatewayError::backend(status, decoded.message);
    match decoded.details {
        Some(details) => error.with_details(details),
        None => error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_message_field_is_preferred() {
        let decoded = decode_error_body(
            StatusCode::BAD_REQUEST,
            r#"{"message": "Title is required", "field": "title"}"#,
        );
        assert_eq!(decoded.message, "Title is required");
        assert_eq!(decoded.details.unwrap()["field"], "title");
    }

    #[test]
    fn json_detail_field_is_accepted() {
        let decoded = decode_error_body(StatusCode::NOT_FOUND, r#"{"detail": "Badge not found"}"#);
        assert_eq!(decoded.message, "Badge not found");
    }

    #[test]
    fn json_without_message_falls_back_to_text() {
        let body = r#"{"detail": [{"loc": ["body"], "msg": "field required"}]}"#;
        let decoded = decode_error_body(StatusCode::UNPROCESSABLE_ENTITY, body);
        assert_eq!(decoded.message, body);
        assert!(decoded.details.is_none());
    }

    #[test]
    fn plain_text_is_used_verbatim() {
        let decoded = decode_error_body(StatusCode::BAD_GATEWAY, "  upstream exploded \n");
        assert_eq!(decoded.message, "upstream exploded");
    }

    #[test]
    fn empty_body_uses_status_line() {
        let decoded = decode_error_body(StatusCode::SERVICE_UNAVAILABLE, "");
        assert_eq!(decoded.message, "503 Service Unavailable");

        let unknown = StatusCode::from_u16(599).unwrap();
        assert_eq!(
            decode_error_body(unknown, " ").message,
            "Request failed with status 599"
        );
    }

    #[test]
    fn backend_error_keeps_status() {
        let err = backend_error(StatusCode::FORBIDDEN, r#"{"error": "Admins only"}"#);
        assert_eq!(err.status, 403);
        assert_eq!(err.message, "Admins only");
        assert!(err.details.is_some());
    }
}
