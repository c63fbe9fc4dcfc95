//! Heartbeat and idle/reap sweeps.
//!
//! Two independent scheduled tasks iterate a registry snapshot and act
//! through the same session operations live traffic uses, so there is
//! one mutation path. Neither sweep holds a session lock for longer
//! than the single check/mutate step.

use ferry_core::frame::CLOSE_INTERRUPTED;
use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::debug;

use crate::engine::Engine;
use crate::metrics::{IDLE_TIMEOUTS_TOTAL, SESSIONS_REAPED_TOTAL};

/// Handles to the spawned sweep tasks. Aborting them stops the sweeps;
/// sessions and live traffic are unaffected.
pub struct SchedulerHandles {
    /// Heartbeat emitter.
    pub heartbeat: JoinHandle<()>,
    /// Idle-timeout and reap sweep.
    pub idle: JoinHandle<()>,
}

/// Spawn both sweeps with the engine's configured periods.
pub fn spawn(engine: Engine) -> SchedulerHandles {
    let heartbeat = {
        let engine = engine.clone();
        tokio::spawn(async move {
            let mut tick = interval(engine.config().heartbeat_interval());
            loop {
                let _ = tick.tick().await;
                heartbeat_sweep(&engine).await;
            }
        })
    };
    let idle = tokio::spawn(async move {
        let mut tick = interval(engine.config().sweep_interval());
        loop {
            let _ = tick.tick().await;
            idle_sweep(&engine).await;
        }
    });
    SchedulerHandles { heartbeat, idle }
}

/// One heartbeat pass: every session with an attached receiver and no
/// pending traffic gets a single heartbeat frame.
pub async fn heartbeat_sweep(engine: &Engine) {
    for session in engine.registry().snapshot().await {
        session.heartbeat();
    }
}

/// One idle pass: expire sessions without a receiver past the idle
/// threshold, and reap closed sessions past the grace period.
pub async fn idle_sweep(engine: &Engine) {
    let idle_timeout = engine.config().idle_timeout();
    let close_grace = engine.config().close_grace();

    for session in engine.registry().snapshot().await {
        if session.idle_expired(idle_timeout) {
            let (code, reason) = CLOSE_INTERRUPTED;
            debug!(session_id = %session.id(), "idle timeout");
            counter!(IDLE_TIMEOUTS_TOTAL).increment(1);
            engine.request_close(&session, code, reason).await;
        }
        if session.reapable(close_grace) {
            counter!(SESSIONS_REAPED_TOTAL).increment(1);
            let _ = engine.registry().remove(session.id()).await;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{EchoHandler, SessionHandler};
    use crate::session::{AttachOutcome, Session, SessionState};
    use async_trait::async_trait;
    use ferry_core::config::EngineConfig;
    use ferry_core::frame::Frame;
    use ferry_core::ids::SessionId;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CloseCounter {
        closes: AtomicUsize,
    }

    #[async_trait]
    impl SessionHandler for CloseCounter {
        async fn on_message(&self, _e: &Engine, _s: &Arc<Session>, _m: String) {}
        async fn on_close(&self, _e: &Engine, _s: &Arc<Session>) {
            let _ = self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            heartbeat_interval_ms: 25_000,
            idle_timeout_ms: 5_000,
            sweep_interval_ms: 1_000,
            close_grace_ms: 5_000,
            streaming_response_limit: 4096,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_session_closes_exactly_once() {
        let handler = Arc::new(CloseCounter {
            closes: AtomicUsize::new(0),
        });
        let engine = Engine::new(test_config(), Arc::clone(&handler) as Arc<dyn SessionHandler>);
        let id = SessionId::new("s1");
        drop(engine.begin_receive(&id).await);

        // Below the threshold: nothing happens.
        tokio::time::advance(Duration::from_secs(2)).await;
        idle_sweep(&engine).await;
        assert_eq!(handler.closes.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_secs(4)).await;
        idle_sweep(&engine).await;
        assert_eq!(handler.closes.load(Ordering::SeqCst), 1);

        let session = engine.registry().get(&id).await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(
            session.close_frame().unwrap().encode(),
            r#"c[1002,"Connection interrupted"]"#
        );

        // Re-running the sweep does not re-fire the close callback.
        idle_sweep(&engine).await;
        assert_eq!(handler.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_session_replays_until_reaped() {
        let engine = Engine::new(test_config(), Arc::new(EchoHandler));
        let id = SessionId::new("s1");
        drop(engine.begin_receive(&id).await);
        let session = engine.registry().get(&id).await.unwrap();
        engine.request_close(&session, 3000, "Go away!").await;

        // Within the grace period the close frame replays.
        tokio::time::advance(Duration::from_secs(2)).await;
        idle_sweep(&engine).await;
        let AttachOutcome::Replay(frame) = engine.begin_receive(&id).await else {
            panic!("expected replay");
        };
        assert_eq!(frame.encode(), r#"c[3000,"Go away!"]"#);

        // Past the grace period the id is reaped and becomes unseen.
        tokio::time::advance(Duration::from_secs(6)).await;
        idle_sweep(&engine).await;
        assert!(engine.registry().is_empty());
        let AttachOutcome::Attached(mut rx) = engine.begin_receive(&id).await else {
            panic!("expected a fresh session");
        };
        assert_eq!(rx.recv().await, Some(Frame::Open));
    }

    #[tokio::test]
    async fn heartbeat_sweep_feeds_idle_receivers_only() {
        let engine = Engine::new(test_config(), Arc::new(EchoHandler));
        let idle_id = SessionId::new("idle");
        let busy_id = SessionId::new("busy");

        let AttachOutcome::Attached(mut idle_rx) = engine.begin_receive(&idle_id).await else {
            panic!("expected attach");
        };
        assert_eq!(idle_rx.recv().await, Some(Frame::Open));

        // The busy session has queued traffic and no receiver.
        drop(engine.begin_receive(&busy_id).await);
        let busy = engine.registry().get(&busy_id).await.unwrap();
        let _ = engine.enqueue_outbound(&busy, vec!["pending".into()]);

        heartbeat_sweep(&engine).await;
        assert_eq!(idle_rx.recv().await, Some(Frame::Heartbeat));
        assert_eq!(busy.queued_len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn attached_receiver_is_never_idle_closed() {
        let engine = Engine::new(test_config(), Arc::new(EchoHandler));
        let id = SessionId::new("s1");
        let _rx = match engine.begin_receive(&id).await {
            AttachOutcome::Attached(rx) => rx,
            other => panic!("expected attach, got {other:?}"),
        };

        tokio::time::advance(Duration::from_secs(60)).await;
        idle_sweep(&engine).await;
        let session = engine.registry().get(&id).await.unwrap();
        assert_eq!(session.state(), SessionState::Open);
    }
}
