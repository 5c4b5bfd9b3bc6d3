//! Streaming upload route
//!
//! GET /chunks/stream-turbo upgrades to a WebSocket. The client sends
//! binary messages carrying `[u16 LE size][size bytes]` frames, split or
//! merged across messages in any way. Each chunk is stored before the next
//! one is decoded, and acknowledged with a binary `ack` once durable.

use std::borrow::Cow;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use crate::error::AppError;
use crate::protocol::{FrameDecoder, FrameLayout, ProtocolError, ACK};
use crate::state::AppState;
use crate::upload::UploadContext;

/// Close reasons are limited to 123 bytes by the WebSocket protocol
const MAX_CLOSE_REASON: usize = 120;

/// GET /chunks/stream-turbo
pub async fn stream_turbo(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    let Some(ws) = ws else {
        return (StatusCode::BAD_REQUEST, "Expected a WebSocket request").into_response();
    };

    let context = match UploadContext::from_headers(&headers) {
        Ok(context) => context,
        Err(e) => return AppError::from(e).into_response(),
    };

    let max_message = state.config().stream.max_buffer_bytes;
    ws.max_message_size(max_message)
        .on_upgrade(move |socket| handle_stream(socket, state, context))
}

/// How a stream session ends
enum StreamEnd {
    /// Transport gone without a close handshake
    Disconnected,
    /// Client sent a close frame
    ClientClosed,
    /// All declared frames received
    Completed,
    Protocol(String),
    Failure(String),
}

impl From<ProtocolError> for StreamEnd {
    fn from(err: ProtocolError) -> Self {
        StreamEnd::Protocol(err.to_string())
    }
}

async fn handle_stream(mut socket: WebSocket, state: AppState, context: UploadContext) {
    let stream_config = &state.config().stream;
    let mut decoder = FrameDecoder::new(
        FrameLayout::streaming(stream_config.frame_count_prefix),
        stream_config.max_buffer_bytes,
    );

    tracing::info!(batch = %context.batch_id, tag = ?context.tag_id, "Stream upload opened");

    let end = run_stream(&mut socket, &mut decoder, &state, &context).await;

    let close = match &end {
        StreamEnd::Disconnected => None,
        StreamEnd::ClientClosed => Some(close_frame(close_code::NORMAL, "Closing")),
        StreamEnd::Completed => Some(close_frame(close_code::NORMAL, "Upload complete")),
        StreamEnd::Protocol(reason) => {
            tracing::warn!(reason = %reason, "Closing stream on protocol error");
            Some(close_frame(close_code::PROTOCOL, reason))
        }
        StreamEnd::Failure(reason) => {
            tracing::error!(reason = %reason, "Closing stream on failure");
            Some(close_frame(close_code::ERROR, reason))
        }
    };

    if let Some(frame) = close {
        if let Err(e) = socket.send(Message::Close(Some(frame))).await {
            tracing::debug!(error = %e, "Failed to send close frame");
        }
    }

    if decoder.buffered() > 0 {
        tracing::debug!(pending = decoder.buffered(), "Stream ended inside a frame");
    }
    tracing::info!(chunks = decoder.decoded(), "Stream upload closed");
}

async fn run_stream(
    socket: &mut WebSocket,
    decoder: &mut FrameDecoder,
    state: &AppState,
    context: &UploadContext,
) -> StreamEnd {
    while let Some(message) = socket.recv().await {
        let data = match message {
            Ok(Message::Binary(data)) => data,
            Ok(Message::Text(_)) => return StreamEnd::Protocol("Expected binary messages".to_string()),
            Ok(Message::Close(_)) => return StreamEnd::ClientClosed,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Err(e) => {
                tracing::debug!(error = %e, "Stream receive failed");
                return StreamEnd::Disconnected;
            }
        };

        if let Err(e) = decoder.feed(&data) {
            return e.into();
        }

        if let Err(end) = drain_frames(socket, decoder, state, context).await {
            return end;
        }

        if decoder.is_complete() {
            return StreamEnd::Completed;
        }
    }

    StreamEnd::Disconnected
}

/// Store and acknowledge every complete frame buffered so far, in order
async fn drain_frames(
    socket: &mut WebSocket,
    decoder: &mut FrameDecoder,
    state: &AppState,
    context: &UploadContext,
) -> Result<(), StreamEnd> {
    while let Some(frame) = decoder.next_frame()? {
        match state.uploader().accept(frame, context).await {
            Ok(chunk) => tracing::debug!(hash = %chunk.hash(), "Stream chunk stored"),
            Err(e) if e.is_client_error() => return Err(StreamEnd::Protocol(e.to_string())),
            Err(e) => return Err(StreamEnd::Failure(e.to_string())),
        }

        if socket.send(Message::Binary(ACK.to_vec())).await.is_err() {
            return Err(StreamEnd::Disconnected);
        }
    }
    Ok(())
}

fn close_frame(code: u16, reason: &str) -> CloseFrame<'static> {
    let mut end = reason.len().min(MAX_CLOSE_REASON);
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    CloseFrame {
        code,
        reason: Cow::Owned(reason[..end].to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_reason_truncated_on_char_boundary() {
        let reason = "é".repeat(100);
        let frame = close_frame(close_code::PROTOCOL, &reason);
        assert!(frame.reason.len() <= MAX_CLOSE_REASON);
        assert!(frame.reason.chars().all(|c| c == 'é'));

        let frame = close_frame(close_code::NORMAL, "short");
        assert_eq!(frame.reason, "short");
    }
}
