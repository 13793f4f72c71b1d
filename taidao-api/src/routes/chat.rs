/// Streaming chat relay
///
/// `POST /chat/` (form `message`) answers with `text/event-stream`:
///
/// ```text
/// event: message
/// data: 你好
///
/// event: message
/// data: 你好，請問
///
/// event: done
/// data:
/// ```
///
/// Each `message` event carries the whole reply so far, so a client can
/// swap its content in place. An upstream failure ends the stream with an
/// `error` event. When the client disconnects the response stream is
/// dropped, which drops the upstream request with it.

use crate::{
    app::AppState,
    clients::openai::{ChatMessage, ChatUpstream, DeltaStream},
    error::{ApiError, ApiResult},
};
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Form,
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::{convert::Infallible, sync::Arc, time::Duration};

/// Interval between keep-alive comments on idle streams
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(25);

/// Chat form
#[derive(Debug, Deserialize)]
pub struct ChatForm {
    #[serde(default)]
    pub message: String,
}

/// Turns upstream deltas into client events
pub fn relay(mut deltas: DeltaStream) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let mut reply = String::new();

        while let Some(delta) = deltas.next().await {
            match delta {
                Ok(delta) => {
                    // SSE fields cannot carry carriage returns
                    reply.extend(delta.chars().filter(|c| *c != '\r'));
                    yield Ok(Event::default().event("message").data(reply.as_str()));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Chat upstream failed mid-stream");
                    yield Ok(Event::default().event("error").data("upstream error"));
                    return;
                }
            }
        }

        tracing::debug!(length = reply.len(), "Chat reply complete");
        yield Ok(Event::default().event("done").data(""));
    }
}

/// Wraps relayed events in an SSE response
pub(crate) fn sse_response(
    deltas: DeltaStream,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    Sse::new(relay(deltas)).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}

pub(crate) fn chat_upstream(state: &AppState) -> ApiResult<Arc<dyn ChatUpstream>> {
    state
        .chat
        .clone()
        .ok_or_else(|| ApiError::ServiceUnavailable("Chat is not configured".to_string()))
}

/// Trims `message`, rejecting empty input
pub(crate) fn require_message(message: &str) -> ApiResult<&str> {
    let message = message.trim();
    if message.is_empty() {
        return Err(ApiError::BadRequest("Message must not be empty".to_string()));
    }
    Ok(message)
}

/// Relays a single-turn chat
///
/// # Errors
///
/// - `400 Bad Request`: Empty message
/// - `500 Internal Server Error`: The upstream refused the request
/// - `503 Service Unavailable`: Chat is not configured
pub async fn chat(
    State(state): State<AppState>,
    Form(form): Form<ChatForm>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let message = require_message(&form.message)?;
    let upstream = chat_upstream(&state)?;

    let deltas = upstream
        .stream(vec![ChatMessage::user(message)])
        .await
        .map_err(|e| ApiError::internal("Failed to start chat completion", e))?;

    Ok(sse_response(deltas))
}
