//! Server-Sent Events transport and the `/events` handler.

use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use super::delivery::{Frame, FrameSink, run_session};
use crate::error::TransportError;
use crate::server::AppState;

/// Writes frames into an SSE response body.
///
/// The channel holds a single frame, so `write` returns only once the body
/// stream has taken the previous frame. When the client disconnects, axum
/// drops the body and [`closed`](FrameSink::closed) resolves.
pub struct SseSink {
    tx: mpsc::Sender<Event>,
}

/// Create a sink and the event stream to serve as the response body.
pub fn sse_channel() -> (SseSink, impl Stream<Item = Result<Event, Infallible>>) {
    let (tx, rx) = mpsc::channel(1);
    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    (SseSink { tx }, stream)
}

#[async_trait]
impl FrameSink for SseSink {
    async fn write(&self, frame: Frame) -> Result<(), TransportError> {
        let event = Event::default().event(frame.event.as_str()).data(frame.data);
        self.tx.send(event).await.map_err(|_| TransportError::Closed)
    }

    async fn closed(&self) {
        self.tx.closed().await;
    }
}

/// `GET /events`: open a streaming session for the authenticated caller.
///
/// A caller that already has a session supersedes it.
pub async fn events_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(user_id) = state.identity.resolve(&headers) else {
        debug!("rejected unauthenticated stream request");
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "unauthorized" })),
        )
            .into_response();
    };

    let (session, outbound) = state.registry.register(user_id);
    let (sink, stream) = sse_channel();
    let _ = state.sessions.spawn(run_session(
        session,
        outbound,
        sink,
        Arc::clone(&state.registry),
        state.delivery,
    ));

    Sse::new(stream).into_response()
}
