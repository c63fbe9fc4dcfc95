//! xhr-streaming transport: one long-lived chunked response carrying
//! many frames.
//!
//! The response opens with a 2 KiB `h` prelude (defeats buffering in
//! intermediaries), then streams frames as the session produces them.
//! Once the configured byte limit of frame data has been written the
//! response ends, so the client can drop the accumulated body and
//! reconnect.

use std::convert::Infallible;

use async_stream::stream;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use ferry_core::ids::SessionId;
use metrics::counter;
use tracing::instrument;

use super::{CONTENT_TYPE_JAVASCRIPT, apply_transport_headers};
use crate::engine::Engine;
use crate::metrics::FRAMES_SENT_TOTAL;
use crate::session::AttachOutcome;

/// Bytes of `h` sent before any frame.
const PRELUDE_LEN: usize = 2048;

fn prelude() -> String {
    let mut p = "h".repeat(PRELUDE_LEN);
    p.push('\n');
    p
}

/// Receive path: attach as the session's receiver and stream frames
/// until the session closes, the peer goes away, or the response limit
/// is reached.
#[instrument(skip(engine), fields(transport = "xhr-streaming"))]
pub async fn xhr_streaming(
    State(engine): State<Engine>,
    Path((_server, session_id)): Path<(String, String)>,
) -> Response {
    let id = SessionId::new(session_id);
    let limit = engine.config().streaming_response_limit;

    let body = match engine.begin_receive(&id).await {
        AttachOutcome::Attached(mut receiver) => Body::from_stream(stream! {
            yield Ok::<Bytes, Infallible>(Bytes::from(prelude()));
            // The prelude does not count against the limit; frames do.
            let mut sent = 0usize;
            while let Some(frame) = receiver.recv().await {
                counter!(FRAMES_SENT_TOTAL, "transport" => "xhr-streaming").increment(1);
                let is_close = frame.is_close();
                let line = format!("{}\n", frame.encode());
                sent += line.len();
                yield Ok(Bytes::from(line));
                if is_close || sent >= limit {
                    break;
                }
            }
            // Dropping the receiver here frees the session's slot.
        }),
        AttachOutcome::Rejected(frame) | AttachOutcome::Replay(frame) => {
            counter!(FRAMES_SENT_TOTAL, "transport" => "xhr-streaming").increment(1);
            Body::from(format!("{}{}\n", prelude(), frame.encode()))
        }
    };

    let mut response = (StatusCode::OK, body).into_response();
    apply_transport_headers(&mut response, CONTENT_TYPE_JAVASCRIPT);
    response
}
