//! xhr-polling transport: one receive request per frame batch, plus the
//! separate send path.
//!
//! The receive request (`POST /{server}/{session}/xhr`) becomes the
//! session's receiver, delivers at most one frame, and completes. The
//! send request (`POST /{server}/{session}/xhr_send`) carries a JSON
//! array of client messages and never touches the receive path.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ferry_core::frame::{CLOSE_INTERRUPTED, Frame, decode_client_payload};
use ferry_core::ids::SessionId;
use metrics::counter;
use tracing::{debug, instrument};

use super::{CONTENT_TYPE_JAVASCRIPT, CONTENT_TYPE_PLAIN, apply_transport_headers};
use crate::engine::{Engine, SubmitOutcome};
use crate::metrics::{FRAMES_SENT_TOTAL, SEND_DECODE_ERRORS_TOTAL};
use crate::session::AttachOutcome;

/// One encoded frame + `\n`, with polling headers.
fn frame_response(frame: &Frame) -> Response {
    counter!(FRAMES_SENT_TOTAL, "transport" => "xhr-polling").increment(1);
    let mut response = (StatusCode::OK, format!("{}\n", frame.encode())).into_response();
    apply_transport_headers(&mut response, CONTENT_TYPE_JAVASCRIPT);
    response
}

/// Receive path: attach as the session's receiver and deliver one frame
/// batch.
#[instrument(skip(engine), fields(transport = "xhr-polling"))]
pub async fn xhr_poll(
    State(engine): State<Engine>,
    Path((_server, session_id)): Path<(String, String)>,
) -> Response {
    let id = SessionId::new(session_id);
    match engine.begin_receive(&id).await {
        AttachOutcome::Attached(mut receiver) => {
            // Parks until the session enqueues, heartbeats, or closes.
            let frame = match receiver.recv().await {
                Some(frame) => frame,
                // Receiver slot was revoked without a close frame in the
                // channel; report the stored close state if there is one.
                None => receiver.session().close_frame().unwrap_or_else(|| {
                    let (code, reason) = CLOSE_INTERRUPTED;
                    Frame::close(code, reason)
                }),
            };
            frame_response(&frame)
        }
        AttachOutcome::Rejected(frame) | AttachOutcome::Replay(frame) => frame_response(&frame),
    }
}

/// Send path: decode the client message array and hand it to the
/// application.
#[instrument(skip(engine, body), fields(transport = "xhr-polling"))]
pub async fn xhr_send(
    State(engine): State<Engine>,
    Path((_server, session_id)): Path<(String, String)>,
    body: String,
) -> Response {
    let id = SessionId::new(session_id);
    let messages = match decode_client_payload(&body) {
        Ok(messages) => messages,
        Err(err) => {
            counter!(SEND_DECODE_ERRORS_TOTAL).increment(1);
            debug!(session_id = %id, error = %err, "client framing error");
            let mut response =
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
            apply_transport_headers(&mut response, CONTENT_TYPE_PLAIN);
            return response;
        }
    };

    match engine.submit_client_messages(&id, messages).await {
        SubmitOutcome::Accepted => {
            let mut response = StatusCode::NO_CONTENT.into_response();
            apply_transport_headers(&mut response, CONTENT_TYPE_PLAIN);
            response
        }
        SubmitOutcome::NotFound => StatusCode::NOT_FOUND.into_response(),
        // Submission after close returns the stored close frame instead
        // of accepting the message.
        SubmitOutcome::Closed(frame) => frame_response(&frame),
    }
}
