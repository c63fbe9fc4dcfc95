//! Engine facade: the single mutation path shared by live traffic and
//! the timer sweeps.
//!
//! Transports never touch sessions directly for lifecycle operations;
//! they go through the engine so that application callbacks
//! (`on_open`/`on_message`/`on_close`) and metrics fire from exactly one
//! place.

use std::sync::Arc;

use ferry_core::config::EngineConfig;
use ferry_core::frame::Frame;
use ferry_core::ids::SessionId;
use metrics::counter;
use tracing::{debug, info};

use crate::handler::SessionHandler;
use crate::metrics::{
    RECEIVER_REJECTIONS_TOTAL, SEND_UNKNOWN_SESSION_TOTAL, SESSIONS_CLOSED_TOTAL,
    SESSIONS_OPENED_TOTAL,
};
use crate::session::registry::SessionRegistry;
use crate::session::{AttachOutcome, EnqueueOutcome, Session};

/// Outcome of a send-path submission.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Messages handed to the application.
    Accepted,
    /// No session with that id; the transport surfaces a not-found
    /// failure.
    NotFound,
    /// The session already closed; the stored close frame is returned
    /// instead of accepting the message.
    Closed(Frame),
}

struct EngineInner {
    registry: SessionRegistry,
    config: EngineConfig,
    handler: Arc<dyn SessionHandler>,
}

/// Cheaply cloneable handle to the protocol engine.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Build an engine with explicit configuration and an application
    /// handler. No background tasks are started here; see
    /// [`crate::scheduler::spawn`].
    pub fn new(config: EngineConfig, handler: Arc<dyn SessionHandler>) -> Self {
        info!(
            heartbeat_ms = config.heartbeat_interval_ms,
            idle_timeout_ms = config.idle_timeout_ms,
            "engine created"
        );
        Self {
            inner: Arc::new(EngineInner {
                registry: SessionRegistry::new(),
                config,
                handler,
            }),
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// The session registry. Sweeps iterate it; transports should use
    /// the engine operations instead.
    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    /// Resolve or create a registered session and try to become its
    /// receiver.
    ///
    /// This is the receive path for polling and streaming transports:
    /// an unseen id creates the session, the attach delivers the open
    /// frame, and `on_open` fires afterwards so the application can
    /// already enqueue or close.
    pub async fn begin_receive(&self, id: &SessionId) -> AttachOutcome {
        let (session, created) = self.inner.registry.open_or_get(id).await;
        let outcome = session.attach();
        if created {
            counter!(SESSIONS_OPENED_TOTAL).increment(1);
            self.inner.handler.on_open(self, &session).await;
        }
        if matches!(outcome, AttachOutcome::Rejected(_)) {
            counter!(RECEIVER_REJECTIONS_TOTAL).increment(1);
            debug!(session_id = %id, "receiver rejected, another connection still open");
        }
        outcome
    }

    /// Create a standalone session for a full-duplex connection.
    ///
    /// Full-duplex sessions live exactly as long as their connection and
    /// ids may be reused concurrently, so they are never registered; the
    /// caller owns the returned session.
    pub async fn begin_receive_detached(&self, id: &SessionId) -> (Arc<Session>, AttachOutcome) {
        let session = Arc::new(Session::new(id.clone()));
        let outcome = session.attach();
        counter!(SESSIONS_OPENED_TOTAL).increment(1);
        self.inner.handler.on_open(self, &session).await;
        (session, outcome)
    }

    /// Send-path entry: hand decoded client messages to the application.
    ///
    /// Never creates a session; an unknown id is a not-found condition.
    pub async fn submit_client_messages(
        &self,
        id: &SessionId,
        messages: Vec<String>,
    ) -> SubmitOutcome {
        let Some(session) = self.inner.registry.get(id).await else {
            counter!(SEND_UNKNOWN_SESSION_TOTAL).increment(1);
            return SubmitOutcome::NotFound;
        };
        self.deliver_client_messages(&session, messages).await
    }

    /// Hand decoded client messages to the application for a session the
    /// caller already holds (full-duplex path).
    pub async fn deliver_client_messages(
        &self,
        session: &Arc<Session>,
        messages: Vec<String>,
    ) -> SubmitOutcome {
        if let Some(frame) = session.close_frame() {
            return SubmitOutcome::Closed(frame);
        }
        for message in messages {
            self.inner.handler.on_message(self, session, message).await;
        }
        SubmitOutcome::Accepted
    }

    /// Queue application messages for delivery to the session's
    /// receiver, in enqueue order.
    pub fn enqueue_outbound(&self, session: &Session, messages: Vec<String>) -> EnqueueOutcome {
        session.enqueue(messages)
    }

    /// Close a session with an application (or protocol) code and
    /// reason. Idempotent; `on_close` fires only for the call that
    /// performed the transition.
    pub async fn request_close(&self, session: &Arc<Session>, code: u16, reason: &str) {
        if session.close(code, reason) {
            counter!(SESSIONS_CLOSED_TOTAL).increment(1);
            self.inner.handler.on_close(self, session).await;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
