//! Per-transport adapters.
//!
//! Every adapter speaks to the engine through the same operations
//! (`begin_receive`, `submit_client_messages`, …); only the wire shape
//! differs. Frame bodies are bit-exact across transports — the
//! adapters add at most a line terminator.
//!
//! | Module | Transport | Terminator |
//! |--------|-----------|------------|
//! | `polling` | `xhr` / `xhr_send` request-response | `\n` |
//! | `streaming` | `xhr_streaming` long-lived response | `\n` |
//! | `websocket` | full-duplex | none |

pub mod polling;
pub mod streaming;
pub mod websocket;

use axum::http::{HeaderValue, header};
use axum::response::Response;

/// Content type for frame-carrying HTTP responses.
pub(crate) const CONTENT_TYPE_JAVASCRIPT: &str = "application/javascript;charset=UTF-8";

/// Content type for send-path acknowledgements.
pub(crate) const CONTENT_TYPE_PLAIN: &str = "text/plain;charset=UTF-8";

/// Cache-busting value for POST-carrying transports (some mobile
/// browsers cache POST responses).
pub(crate) const NO_CACHE: &str = "no-store, no-cache, no-transform, must-revalidate, max-age=0";

/// Apply the content type and no-cache headers shared by the HTTP
/// transports.
pub(crate) fn apply_transport_headers(response: &mut Response, content_type: &'static str) {
    let headers = response.headers_mut();
    let _ = headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    let _ = headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
}
