//! Thin dispatch of `/{server}/{session}/{transport}`.
//!
//! The server id is accepted and ignored (it exists for load
//! balancers); sessions are identified by the session segment alone.
//! Everything else — greeting page, iframe bootstrap, info endpoint —
//! is outside this engine.

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::engine::Engine;
use crate::transport::{polling, streaming, websocket};

/// Build the transport router for one engine.
pub fn router(engine: Engine) -> Router {
    Router::new()
        .route("/{server}/{session}/xhr", post(polling::xhr_poll))
        .route("/{server}/{session}/xhr_send", post(polling::xhr_send))
        .route("/{server}/{session}/xhr_streaming", post(streaming::xhr_streaming))
        .route("/{server}/{session}/websocket", get(websocket::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}
