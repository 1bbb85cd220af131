//! Server-sent event streaming of chat replies.

use axum::{
    extract::State,
    response::{
        Json,
        sse::{Event, KeepAlive, Sse},
    },
};
use campus_core::END_SENTINEL;
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use std::{convert::Infallible, sync::Arc};
use tracing::{debug, error};

use crate::{
    models::{ChatRequest, StreamErrorFrame, StreamFrame},
    state::AppState,
};

fn frame_event<T: Serialize>(frame: &T) -> Event {
    Event::default().json_data(frame).unwrap_or_else(|e| {
        error!(error = %e, "Failed to encode stream frame");
        let fallback = StreamErrorFrame {
            error: e.to_string(),
        };
        Event::default().data(serde_json::to_string(&fallback).unwrap_or_default())
    })
}

/// Stream the assistant's reply as server-sent events.
///
/// Each event carries `{"content": ..., "complete": false}`; the last one is
/// `{"content": "", "complete": true}`.
#[utoipa::path(
    post,
    path = "/chat/stream",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Reply fragments as server-sent events", body = StreamFrame, content_type = "text/event-stream")
    )
)]
pub async fn chat_stream(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let agent = state.agent.clone();
    let ChatRequest {
        session_id,
        message,
    } = payload;

    let events = async_stream::stream! {
        let mut chunks = agent.async_stream_handle_message(&session_id, &message);
        while let Some(chunk) = chunks.next().await {
            if chunk == END_SENTINEL {
                debug!(session_id = %session_id, "Chat stream complete");
                yield Ok::<_, Infallible>(frame_event(&StreamFrame::done()));
                break;
            }
            yield Ok::<_, Infallible>(frame_event(&StreamFrame::chunk(chunk)));
        }
    };

    Sse::new(events).keep_alive(KeepAlive::default())
}
