//! WebSocket transport: full-duplex, one session per connection.
//!
//! Unlike the HTTP transports, a websocket session's lifetime is the
//! connection's: ids may be reused concurrently, so these sessions
//! never enter the registry, and the registry sweeps never see them.
//! Heartbeats run on a connection-local interval through the same
//! `Session::heartbeat` path the sweep uses.
//!
//! Frames carry no terminator here. Empty client frames are ignored; a
//! frame that fails to decode closes the connection without a response.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use ferry_core::frame::{CLOSE_INTERRUPTED, decode_client_payload};
use ferry_core::ids::SessionId;
use futures::{SinkExt, StreamExt};
use metrics::counter;
use tokio::time::{Instant, interval_at};
use tracing::{debug, instrument};

use crate::engine::Engine;
use crate::metrics::FRAMES_SENT_TOTAL;
use crate::session::AttachOutcome;

/// Upgrade handler for `GET /{server}/{session}/websocket`.
///
/// Non-upgrade requests are rejected by the extractor before this body
/// runs.
#[instrument(skip(engine, ws), fields(transport = "websocket"))]
pub async fn ws_upgrade(
    State(engine): State<Engine>,
    Path((_server, session_id)): Path<(String, String)>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| drive_connection(engine, SessionId::new(session_id), socket))
}

async fn drive_connection(engine: Engine, id: SessionId, socket: WebSocket) {
    let (session, outcome) = engine.begin_receive_detached(&id).await;
    let AttachOutcome::Attached(mut receiver) = outcome else {
        // A freshly created session always grants the attach.
        return;
    };

    let (mut sink, mut stream) = socket.split();
    let heartbeat_period = engine.config().heartbeat_interval();
    let mut heartbeat = interval_at(Instant::now() + heartbeat_period, heartbeat_period);

    loop {
        tokio::select! {
            frame = receiver.recv() => {
                let Some(frame) = frame else { break };
                counter!(FRAMES_SENT_TOTAL, "transport" => "websocket").increment(1);
                let is_close = frame.is_close();
                if sink.send(Message::Text(frame.encode().into())).await.is_err() {
                    break;
                }
                if is_close {
                    // The connection ends right after the close frame.
                    let _ = sink.close().await;
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if text.is_empty() {
                            continue;
                        }
                        match decode_client_payload(&text) {
                            Ok(messages) => {
                                let _ = engine.deliver_client_messages(&session, messages).await;
                            }
                            Err(err) => {
                                // Broken framing kills the connection, with
                                // no close frame in reply.
                                debug!(session_id = %id, error = %err, "undecodable frame");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {} // ping/pong/binary: ignored
                }
            }
            _ = heartbeat.tick() => session.heartbeat(),
        }
    }

    drop(receiver);
    // Peer gone or close frame written; either way the session's life
    // ends with the connection. No-op if the application already closed.
    let (code, reason) = CLOSE_INTERRUPTED;
    engine.request_close(&session, code, reason).await;
    debug!(session_id = %id, "websocket connection ended");
}
