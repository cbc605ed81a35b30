//! AI content stream relay.
//!
//! Authenticates the caller by cookie, opens the upstream stream with the
//! caller's cookies and pipes the upstream bytes back unmodified, one
//! complete event frame at a time. Failures before the first byte are JSON
//! errors; failures after it are reported as a trailing `relay-error` frame.

use std::convert::Infallible;

use axum::{
    Router,
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, Uri, header},
    response::Response,
    routing::get,
};
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt, future, stream};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::sse;

/// Blank-line sequences that end an event frame, longest first.
const FRAME_TERMINATORS: [&[u8]; 4] = [b"\r\n\r\n", b"\n\r\n", b"\n\n", b"\r\r"];

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(relay_stream))
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub content_type: Option<String>,
    pub audience_group: Option<String>,
    pub prompt: Option<String>,
}

/// Why an upstream stream ended early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayFailure {
    Timeout,
    Interrupted(String),
}

impl RelayFailure {
    fn code(&self) -> &'static str {
        match self {
            Self::Timeout => "UPSTREAM_TIMEOUT",
            Self::Interrupted(_) => "UPSTREAM_INTERRUPTED",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Self::Timeout => "The content stream timed out",
            Self::Interrupted(_) => "The content stream was interrupted",
        }
    }
}

impl From<reqwest::Error> for RelayFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Interrupted(err.to_string())
        }
    }
}

async fn relay_stream(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let config = &state.config;

    let Some(cookie_header) = forwarded_cookies(&headers, &config.auth_cookie) else {
        info!("Rejecting stream request without access credential");
        return Ok(unauthenticated_response());
    };

    let Query(query) = Query::<StreamQuery>::try_from_uri(&uri)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;

    let content_type = required(query.content_type.as_deref(), "content_type")?;
    let audience_group = required(query.audience_group.as_deref(), "audience_group")?;

    let mut target = url::Url::parse(&config.upstream_url).map_err(|e| {
        error!(error = %e, "Configured upstream url is invalid");
        ApiError::internal("Stream relay is misconfigured")
    })?;
    {
        let mut pairs = target.query_pairs_mut();
        pairs.append_pair("content_type", content_type);
        pairs.append_pair("audience_group", audience_group);
        if let Some(prompt) = query.prompt.as_deref().filter(|p| !p.is_empty()) {
            pairs.append_pair("prompt", prompt);
        }
    }

    debug!(content_type, audience_group, "Opening upstream stream");

    let upstream = state
        .upstream
        .get(target)
        .header(header::COOKIE, cookie_header)
        .header(header::ACCEPT, sse::EVENT_STREAM)
        .send()
        .await
        .map_err(|e| {
            error!(error = %e, timeout = e.is_timeout(), "Failed to open upstream stream");
            ApiError::internal("Failed to open the content stream")
        })?;

    let status = upstream.status();
    if !status.is_success() {
        return Err(upstream_error(upstream).await);
    }

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(sse::EVENT_STREAM));

    let mut response = Response::new(Body::from_stream(relay_body(upstream.bytes_stream())));
    *response.headers_mut() = streaming_headers(content_type);
    Ok(response)
}

/// Cookie header to forward, if the access cookie is present and non-empty.
fn forwarded_cookies(headers: &HeaderMap, auth_cookie: &str) -> Option<String> {
    let raw: Vec<&str> = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect();

    let authenticated = raw
        .iter()
        .flat_map(|line| line.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .any(|(name, value)| name.trim() == auth_cookie && !value.trim().is_empty());

    authenticated.then(|| raw.join("; "))
}

fn required<'a>(value: Option<&'a str>, name: &str) -> ApiResult<&'a str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("{name} is required")))
}

fn streaming_headers(content_type: HeaderValue) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-transform"),
    );
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    headers
}

fn unauthenticated_response() -> Response {
    let mut response = Response::new(Body::from(sse::unauthenticated_notice()));
    *response.headers_mut() = streaming_headers(HeaderValue::from_static(sse::EVENT_STREAM));
    response
}

async fn upstream_error(upstream: reqwest::Response) -> ApiError {
    let status = upstream.status();
    let body = upstream.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), "Upstream refused stream request");

    let details = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .filter(|v| v.is_object());
    let message = details
        .as_ref()
        .and_then(|d| {
            ["detail", "message", "error"]
                .iter()
                .find_map(|key| d.get(*key).and_then(|v| v.as_str()))
        })
        .map(String::from)
        .unwrap_or_else(|| format!("Upstream responded with status {}", status.as_u16()));

    let err = ApiError::upstream(status, message);
    match details {
        Some(details) => err.with_details(details),
        None => err,
    }
}

#[derive(Debug, Default)]
struct RelayProgress {
    finished: bool,
    /// Bytes of a frame whose terminating blank line has not arrived yet.
    partial: BytesMut,
}

/// Length of the prefix of `buf` made of complete event frames.
fn complete_frames_len(buf: &[u8]) -> usize {
    let mut end = 0;
    let mut i = 0;
    while i < buf.len() {
        match FRAME_TERMINATORS.iter().find(|t| buf[i..].starts_with(**t)) {
            Some(terminator) => {
                i += terminator.len();
                end = i;
            }
            None => i += 1,
        }
    }
    end
}

/// Pass upstream frames through untouched.
///
/// Bytes are released only up to the last complete frame; a trailing partial
/// frame is held until its blank line arrives or the upstream ends cleanly.
/// The first upstream error drops any held partial frame and ends the stream
/// with one `relay-error` frame.
pub fn relay_body<S, E>(upstream: S) -> impl Stream<Item = Result<Bytes, Infallible>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: Into<RelayFailure> + Send,
{
    upstream
        .map(Some)
        .chain(stream::once(future::ready(None)))
        .scan(RelayProgress::default(), |progress, item| {
            if progress.finished {
                return future::ready(None);
            }

            let bytes = match item {
                Some(Ok(chunk)) => {
                    progress.partial.extend_from_slice(&chunk);
                    let complete = complete_frames_len(&progress.partial);
                    progress.partial.split_to(complete).freeze()
                }
                Some(Err(err)) => {
                    progress.finished = true;
                    let failure: RelayFailure = err.into();
                    warn!(
                        failure = ?failure,
                        discarded = progress.partial.len(),
                        "Upstream stream ended early"
                    );
                    progress.partial.clear();
                    sse::relay_error_frame(failure.code(), failure.message())
                }
                None => {
                    progress.finished = true;
                    progress.partial.split().freeze()
                }
            };

            future::ready(Some(Ok(bytes)))
        })
        .filter(|chunk| future::ready(chunk.as_ref().map_or(true, |bytes| !bytes.is_empty())))
}
