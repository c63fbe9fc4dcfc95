//! Wire framing shared by every transport.
//!
//! Four frame kinds travel server → client: `o` (open), `h` (heartbeat),
//! `a[...]` (message batch), `c[code,"reason"]` (close). The one-character
//! sentinel keeps per-frame overhead constant, so polling and streaming
//! transports share one encoder; only the terminator differs per
//! transport (`\n` for line-delimited HTTP bodies, nothing for
//! websocket).
//!
//! Client → server data has no framing of its own: it is always a JSON
//! array of string messages, decoded by [`decode_client_payload`].

use serde::Serialize;
use thiserror::Error;

/// Close code sent to a receiver that attaches while another is active.
pub const CLOSE_ANOTHER_CONNECTION: (u16, &str) = (2010, "Another connection still open");

/// Close code for sessions expired by the idle sweep or an interrupted
/// receiver.
pub const CLOSE_INTERRUPTED: (u16, &str) = (1002, "Connection interrupted");

/// One server → client wire unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Session established. Always the first frame a session ever emits.
    Open,
    /// Liveness keep-alive for intermediaries and client timers.
    Heartbeat,
    /// Batch of application messages, delivered in enqueue order.
    Message(Vec<String>),
    /// Terminal frame; replayed to every receiver until the session is
    /// reaped.
    Close {
        /// Protocol or application close code (e.g. 3000).
        code: u16,
        /// Human-readable reason, passed through verbatim.
        reason: String,
    },
}

impl Frame {
    /// Build a close frame from a `(code, reason)` pair.
    pub fn close(code: u16, reason: &str) -> Self {
        Frame::Close {
            code,
            reason: reason.to_owned(),
        }
    }

    /// Encode the frame body, without any terminator.
    ///
    /// The body is bit-exact across transports; the caller appends the
    /// transport's terminator.
    pub fn encode(&self) -> String {
        match self {
            Frame::Open => "o".to_owned(),
            Frame::Heartbeat => "h".to_owned(),
            Frame::Message(payloads) => {
                let json = serde_json::to_string(payloads).unwrap_or_else(|_| "[]".to_owned());
                format!("a{json}")
            }
            Frame::Close { code, reason } => {
                // Two-element array [code, reason]; serialize the reason
                // through serde_json so quoting and escapes are correct.
                #[derive(Serialize)]
                struct Pair<'a>(u16, &'a str);
                let json = serde_json::to_string(&Pair(*code, reason))
                    .unwrap_or_else(|_| format!("[{code},\"\"]"));
                format!("c{json}")
            }
        }
    }

    /// True for `Close` frames.
    pub fn is_close(&self) -> bool {
        matches!(self, Frame::Close { .. })
    }
}

/// Client payload rejected by [`decode_client_payload`].
///
/// Decode failures are a client framing error reported to the transport;
/// they never alter session state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Request carried no body at all.
    #[error("Payload expected.")]
    EmptyPayload,
    /// Body was not valid JSON, or not an array of strings.
    #[error("Broken JSON encoding.")]
    Invalid,
}

/// Decode a client-sent payload into its message list.
///
/// Client data is always a JSON array of opaque strings; any other
/// shape is a [`DecodeError::Invalid`].
pub fn decode_client_payload(payload: &str) -> Result<Vec<String>, DecodeError> {
    if payload.is_empty() {
        return Err(DecodeError::EmptyPayload);
    }
    serde_json::from_str::<Vec<String>>(payload).map_err(|_| DecodeError::Invalid)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
