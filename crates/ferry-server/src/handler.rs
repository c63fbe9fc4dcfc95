//! Application-layer callbacks.
//!
//! The engine is application-agnostic: everything above the session
//! boundary goes through [`SessionHandler`]. Callbacks receive the
//! engine so they can enqueue outbound messages or request a close
//! without holding their own reference cycle.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::engine::Engine;
use crate::session::Session;

/// Application callbacks invoked by the engine.
///
/// `on_open` fires once per session, after the open frame has been
/// handed to the first receiver. `on_close` fires exactly once, whether
/// the close came from the application or from the idle sweep.
#[async_trait]
pub trait SessionHandler: Send + Sync {
    /// A session finished opening.
    async fn on_open(&self, _engine: &Engine, _session: &Arc<Session>) {}

    /// A client message arrived on the send path or a full-duplex
    /// transport.
    async fn on_message(&self, engine: &Engine, session: &Arc<Session>, message: String);

    /// The session transitioned to closed.
    async fn on_close(&self, _engine: &Engine, _session: &Arc<Session>) {}
}

/// Echoes every client message straight back to the session.
pub struct EchoHandler;

#[async_trait]
impl SessionHandler for EchoHandler {
    async fn on_message(&self, engine: &Engine, session: &Arc<Session>, message: String) {
        let _ = engine.enqueue_outbound(session, vec![message]);
    }

    async fn on_close(&self, _engine: &Engine, session: &Arc<Session>) {
        debug!(session_id = %session.id(), "echo session closed");
    }
}

/// Closes every session the moment it opens, with a fixed code and
/// reason. Mirrors the close application used to exercise close-frame
/// replay.
pub struct CloseOnOpenHandler {
    code: u16,
    reason: String,
}

impl CloseOnOpenHandler {
    /// Handler closing with the given code and reason.
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl SessionHandler for CloseOnOpenHandler {
    async fn on_open(&self, engine: &Engine, session: &Arc<Session>) {
        engine.request_close(session, self.code, &self.reason).await;
    }

    async fn on_message(&self, _engine: &Engine, _session: &Arc<Session>, _message: String) {
        // Session is closed before any message can arrive.
    }
}
