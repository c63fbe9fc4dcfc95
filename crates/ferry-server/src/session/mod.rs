//! Per-session state machine and receiver arbitration.
//!
//! A [`Session`] is one logical client channel, independent of whichever
//! transport currently carries it. It owns the outbound queue, the
//! single active receiver slot, and the stored close frame.
//!
//! State machine: `Connecting → Open → (Closing) → Closed`.
//!
//! - `Connecting` lasts until the first receiver attaches; that attach
//!   delivers the one and only `Open` frame.
//! - `Closing` means the close frame has been handed to a still-draining
//!   receiver; it collapses to `Closed` when that receiver detaches.
//! - Once the close frame is stored, attaches only replay it — no
//!   message delivery ever happens again.
//!
//! Invariants: at most one active receiver; the outbound queue drains in
//! insertion order, batched into a single `Message` frame per flush; the
//! per-session mutex is never held across an `.await`.

pub mod registry;

use std::sync::Arc;

use ferry_core::frame::{CLOSE_ANOTHER_CONNECTION, Frame};
use ferry_core::ids::SessionId;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

/// Frames buffered per receiver. Polling receivers take one frame and
/// leave; streaming/websocket receivers drain continuously, so the
/// channel only fills when the peer stops reading.
const RECEIVER_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Created, open frame not yet delivered.
    Connecting,
    /// Normal message exchange.
    Open,
    /// Close frame handed to a receiver that has not detached yet.
    Closing,
    /// Terminal. Only close-frame replay remains.
    Closed,
}

/// Outcome of an attach attempt.
#[derive(Debug)]
pub enum AttachOutcome {
    /// This connection is now the session's receiver.
    Attached(FrameReceiver),
    /// Another receiver is active; write this close frame (2010) and
    /// terminate the new connection only.
    Rejected(Frame),
    /// The session is closed; write the stored close frame and
    /// terminate.
    Replay(Frame),
}

/// Outcome of enqueueing outbound application messages.
#[derive(Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Messages queued (and flushed if a receiver was attached).
    Queued,
    /// Session already closed; nothing was queued.
    Closed,
}

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    queue: Vec<String>,
    receiver: Option<mpsc::Sender<Frame>>,
    /// Bumped on every attach so a stale receiver's drop cannot detach
    /// its successor.
    epoch: u64,
    last_receiver_seen: Instant,
    close_frame: Option<Frame>,
    closed_at: Option<Instant>,
}

/// One logical client channel.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    inner: Mutex<SessionInner>,
}

impl Session {
    /// Create a session in `Connecting` state.
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            inner: Mutex::new(SessionInner {
                state: SessionState::Connecting,
                queue: Vec::new(),
                receiver: None,
                epoch: 0,
                last_receiver_seen: Instant::now(),
                close_frame: None,
                closed_at: None,
            }),
        }
    }

    /// The session's id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Try to make this connection the session's receiver.
    ///
    /// On success the returned [`FrameReceiver`] already holds the
    /// frames owed to a fresh receiver: the `Open` frame for a
    /// `Connecting` session, or one `Message` batch if outbound
    /// messages were queued while no receiver was attached.
    pub fn attach(self: &Arc<Self>) -> AttachOutcome {
        let mut inner = self.inner.lock();

        if let Some(frame) = inner.close_frame.clone() {
            return AttachOutcome::Replay(frame);
        }
        if inner.receiver.is_some() {
            let (code, reason) = CLOSE_ANOTHER_CONNECTION;
            return AttachOutcome::Rejected(Frame::close(code, reason));
        }

        let (tx, rx) = mpsc::channel(RECEIVER_CHANNEL_CAPACITY);
        inner.epoch += 1;
        let epoch = inner.epoch;

        if inner.state == SessionState::Connecting {
            // First attach ever: the open frame precedes everything.
            let _ = tx.try_send(Frame::Open);
            inner.state = SessionState::Open;
        } else if !inner.queue.is_empty() {
            let batch: Vec<String> = inner.queue.drain(..).collect();
            let _ = tx.try_send(Frame::Message(batch));
        }

        inner.receiver = Some(tx);
        inner.last_receiver_seen = Instant::now();
        debug!(session_id = %self.id, epoch, "receiver attached");

        AttachOutcome::Attached(FrameReceiver {
            rx,
            session: Arc::clone(self),
            epoch,
        })
    }

    /// Queue outbound application messages and flush them to the
    /// attached receiver, if any.
    pub fn enqueue(&self, messages: Vec<String>) -> EnqueueOutcome {
        let mut inner = self.inner.lock();
        if inner.close_frame.is_some() {
            return EnqueueOutcome::Closed;
        }
        inner.queue.extend(messages);
        Self::flush_locked(&mut inner);
        EnqueueOutcome::Queued
    }

    /// Emit one heartbeat frame if a receiver is attached and there is
    /// no pending traffic. Called by the heartbeat sweep and by the
    /// websocket connection task.
    pub fn heartbeat(&self) {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Open || !inner.queue.is_empty() {
            return;
        }
        let Some(tx) = inner.receiver.clone() else {
            return;
        };
        if tx.try_send(Frame::Heartbeat).is_err() {
            inner.receiver = None;
            inner.last_receiver_seen = Instant::now();
        }
    }

    /// Store the close frame and end message exchange.
    ///
    /// Returns `true` when this call performed the transition; `false`
    /// when the session was already closed (the first close wins, the
    /// stored code/reason are immutable).
    pub fn close(&self, code: u16, reason: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.close_frame.is_some() {
            return false;
        }
        let frame = Frame::close(code, reason);
        inner.close_frame = Some(frame.clone());
        inner.closed_at = Some(Instant::now());
        inner.queue.clear();
        match inner.receiver.take() {
            Some(tx) => {
                // Hand the close frame to the live receiver; dropping the
                // sender afterwards ends its stream right after it.
                let _ = tx.try_send(frame);
                inner.state = SessionState::Closing;
            }
            None => inner.state = SessionState::Closed,
        }
        debug!(session_id = %self.id, code, "session closed");
        true
    }

    /// True once the idle threshold has elapsed with no receiver on a
    /// not-yet-closed session.
    pub fn idle_expired(&self, threshold: std::time::Duration) -> bool {
        let inner = self.inner.lock();
        inner.close_frame.is_none()
            && inner.receiver.is_none()
            && inner.last_receiver_seen.elapsed() >= threshold
    }

    /// True once a closed session has outlived its replay grace period.
    pub fn reapable(&self, grace: std::time::Duration) -> bool {
        let inner = self.inner.lock();
        inner.state == SessionState::Closed
            && inner.closed_at.is_some_and(|at| at.elapsed() >= grace)
    }

    /// The stored close frame, if the session has closed.
    pub fn close_frame(&self) -> Option<Frame> {
        self.inner.lock().close_frame.clone()
    }

    /// Number of queued outbound messages (diagnostics only).
    pub fn queued_len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    fn flush_locked(inner: &mut SessionInner) {
        if inner.queue.is_empty() {
            return;
        }
        let Some(tx) = inner.receiver.clone() else {
            return;
        };
        let batch: Vec<String> = inner.queue.drain(..).collect();
        if let Err(err) = tx.try_send(Frame::Message(batch)) {
            // Receiver stalled or gone: put the batch back in order and
            // drop the sender so the idle sweep takes over.
            let batch = match err {
                mpsc::error::TrySendError::Full(Frame::Message(b))
                | mpsc::error::TrySendError::Closed(Frame::Message(b)) => b,
                _ => Vec::new(),
            };
            let _ = inner.queue.splice(0..0, batch);
            inner.receiver = None;
            inner.last_receiver_seen = Instant::now();
        }
    }

    fn detach(&self, epoch: u64) {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch {
            return;
        }
        inner.receiver = None;
        if inner.state == SessionState::Closing {
            inner.state = SessionState::Closed;
        } else {
            inner.last_receiver_seen = Instant::now();
        }
        debug!(session_id = %self.id, epoch, "receiver detached");
    }
}

/// The receiving end held by the one connection currently entitled to
/// read frames from a session. Dropping it detaches the receiver and
/// releases the slot.
#[derive(Debug)]
pub struct FrameReceiver {
    rx: mpsc::Receiver<Frame>,
    session: Arc<Session>,
    epoch: u64,
}

impl FrameReceiver {
    /// Wait for the next frame. `None` means the session dropped this
    /// receiver (after a close frame, or after a flush failure).
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    /// The session this receiver is bound to.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

impl Drop for FrameReceiver {
    fn drop(&mut self) {
        self.session.detach(self.epoch);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::time::Duration;

    fn session(id: &str) -> Arc<Session> {
        Arc::new(Session::new(SessionId::new(id)))
    }

    // ── attach / open ────────────────────────────────────────────────────

    #[tokio::test]
    async fn first_attach_delivers_open_frame_first() {
        let s = session("s1");
        let AttachOutcome::Attached(mut rx) = s.attach() else {
            panic!("expected attach");
        };
        assert_eq!(rx.recv().await, Some(Frame::Open));
        assert_eq!(s.state(), SessionState::Open);
    }

    #[tokio::test]
    async fn open_frame_is_delivered_exactly_once() {
        let s = session("s1");
        {
            let AttachOutcome::Attached(mut rx) = s.attach() else {
                panic!("expected attach");
            };
            assert_eq!(rx.recv().await, Some(Frame::Open));
        }
        // Second receiver on the same session: no second open frame.
        let AttachOutcome::Attached(rx2) = s.attach() else {
            panic!("expected attach");
        };
        assert!(rx2.rx.is_empty());
    }

    #[tokio::test]
    async fn queued_messages_flush_as_one_batch_on_attach() {
        let s = session("s1");
        drop(s.attach()); // consume the open frame slot
        assert_eq!(s.enqueue(vec!["x".into()]), EnqueueOutcome::Queued);
        assert_eq!(s.enqueue(vec!["y".into(), "z".into()]), EnqueueOutcome::Queued);

        let AttachOutcome::Attached(mut rx) = s.attach() else {
            panic!("expected attach");
        };
        assert_eq!(
            rx.recv().await,
            Some(Frame::Message(vec!["x".into(), "y".into(), "z".into()]))
        );
        assert_eq!(s.queued_len(), 0);
    }

    #[tokio::test]
    async fn enqueue_flushes_to_live_receiver() {
        let s = session("s1");
        let AttachOutcome::Attached(mut rx) = s.attach() else {
            panic!("expected attach");
        };
        assert_eq!(rx.recv().await, Some(Frame::Open));

        assert_eq!(s.enqueue(vec!["a".into()]), EnqueueOutcome::Queued);
        assert_eq!(rx.recv().await, Some(Frame::Message(vec!["a".into()])));
        assert_eq!(s.queued_len(), 0);
    }

    // ── receiver arbitration ─────────────────────────────────────────────

    #[tokio::test]
    async fn second_receiver_is_rejected_with_2010() {
        let s = session("s1");
        let AttachOutcome::Attached(mut rx1) = s.attach() else {
            panic!("expected attach");
        };

        let outcome = s.attach();
        let AttachOutcome::Rejected(frame) = outcome else {
            panic!("expected rejection, got {outcome:?}");
        };
        assert_eq!(frame.encode(), r#"c[2010,"Another connection still open"]"#);

        // The original receiver is untouched.
        assert_eq!(rx1.recv().await, Some(Frame::Open));
        assert_eq!(s.enqueue(vec!["still mine".into()]), EnqueueOutcome::Queued);
        assert_eq!(rx1.recv().await, Some(Frame::Message(vec!["still mine".into()])));
    }

    #[tokio::test]
    async fn detach_frees_the_receiver_slot() {
        let s = session("s1");
        let first = s.attach();
        drop(first);
        assert_matches!(s.attach(), AttachOutcome::Attached(_));
    }

    #[tokio::test]
    async fn stale_drop_does_not_detach_successor() {
        let s = session("s1");
        let AttachOutcome::Attached(rx1) = s.attach() else {
            panic!("expected attach");
        };
        // Simulate close racing with the receiver: close clears the slot,
        // a fresh attach happens, then the old handle finally drops.
        assert!(s.close(3000, "Go away!"));
        let replay = s.attach();
        assert_matches!(replay, AttachOutcome::Replay(_));
        drop(rx1);
        // Closing collapsed to Closed via the stale detach; replay still
        // works and the state stays terminal.
        assert_eq!(s.state(), SessionState::Closed);
        assert_matches!(s.attach(), AttachOutcome::Replay(_));
    }

    // ── close ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn close_delivers_frame_to_live_receiver_then_ends_stream() {
        let s = session("s1");
        let AttachOutcome::Attached(mut rx) = s.attach() else {
            panic!("expected attach");
        };
        assert_eq!(rx.recv().await, Some(Frame::Open));

        assert!(s.close(3000, "Go away!"));
        assert_eq!(rx.recv().await, Some(Frame::close(3000, "Go away!")));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn close_replays_forever_to_later_receivers() {
        let s = session("s1");
        drop(s.attach());
        assert!(s.close(3000, "Go away!"));

        for _ in 0..3 {
            let AttachOutcome::Replay(frame) = s.attach() else {
                panic!("expected replay");
            };
            assert_eq!(frame.encode(), r#"c[3000,"Go away!"]"#);
        }
    }

    #[tokio::test]
    async fn first_close_wins() {
        let s = session("s1");
        drop(s.attach());
        assert!(s.close(3000, "Go away!"));
        assert!(!s.close(1002, "Connection interrupted"));

        let AttachOutcome::Replay(frame) = s.attach() else {
            panic!("expected replay");
        };
        assert_eq!(frame.encode(), r#"c[3000,"Go away!"]"#);
    }

    #[tokio::test]
    async fn enqueue_after_close_is_refused() {
        let s = session("s1");
        drop(s.attach());
        assert!(s.close(3000, "Go away!"));
        assert_eq!(s.enqueue(vec!["late".into()]), EnqueueOutcome::Closed);
        assert_eq!(s.queued_len(), 0);
    }

    #[tokio::test]
    async fn close_with_live_receiver_passes_through_closing() {
        let s = session("s1");
        let AttachOutcome::Attached(rx) = s.attach() else {
            panic!("expected attach");
        };
        assert!(s.close(3000, "Go away!"));
        assert_eq!(s.state(), SessionState::Closing);
        drop(rx);
        assert_eq!(s.state(), SessionState::Closed);
    }

    // ── heartbeat ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn heartbeat_reaches_idle_receiver() {
        let s = session("s1");
        let AttachOutcome::Attached(mut rx) = s.attach() else {
            panic!("expected attach");
        };
        assert_eq!(rx.recv().await, Some(Frame::Open));
        s.heartbeat();
        assert_eq!(rx.recv().await, Some(Frame::Heartbeat));
    }

    #[tokio::test]
    async fn heartbeat_skipped_with_pending_traffic() {
        let s = session("s1");
        drop(s.attach());
        assert_eq!(s.enqueue(vec!["pending".into()]), EnqueueOutcome::Queued);
        s.heartbeat();

        let AttachOutcome::Attached(mut rx) = s.attach() else {
            panic!("expected attach");
        };
        // The queued batch comes through; no heartbeat snuck in front.
        assert_eq!(rx.recv().await, Some(Frame::Message(vec!["pending".into()])));
        assert!(rx.rx.is_empty());
    }

    #[tokio::test]
    async fn heartbeat_without_receiver_is_a_no_op() {
        let s = session("s1");
        s.heartbeat();
        assert_eq!(s.state(), SessionState::Connecting);
    }

    // ── timers ───────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn idle_expiry_requires_threshold_without_receiver() {
        let s = session("s1");
        drop(s.attach());
        assert!(!s.idle_expired(Duration::from_secs(5)));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(s.idle_expired(Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn attached_receiver_never_idles_out() {
        let s = session("s1");
        let _rx = match s.attach() {
            AttachOutcome::Attached(rx) => rx,
            other => panic!("expected attach, got {other:?}"),
        };
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!s.idle_expired(Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn closed_session_is_reapable_after_grace() {
        let s = session("s1");
        drop(s.attach());
        assert!(s.close(3000, "Go away!"));
        assert!(!s.reapable(Duration::from_secs(5)));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(s.reapable(Duration::from_secs(5)));
        // Closed sessions do not idle-expire a second time.
        assert!(!s.idle_expired(Duration::from_secs(5)));
    }
}
