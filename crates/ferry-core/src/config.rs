//! Engine configuration.
//!
//! All timing knobs live here and are passed to the engine at
//! construction; there is no process-wide mutable configuration. The
//! defaults match the protocol's conventional values (25 s heartbeat,
//! 5 s idle timeout, 128 KiB streaming window).

use std::time::Duration;

use serde::Deserialize;

/// Timing and sizing knobs for the protocol engine.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Heartbeat period for idle receivers, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// How long a session may sit without a receiver before the idle
    /// sweep closes it, in milliseconds.
    pub idle_timeout_ms: u64,
    /// Idle/reap sweep period, in milliseconds.
    pub sweep_interval_ms: u64,
    /// Grace period a closed session is kept for close-frame replay
    /// before the registry reaps it, in milliseconds.
    pub close_grace_ms: u64,
    /// Bytes of frame data a streaming response may carry before it is
    /// ended so the client can recycle the connection.
    pub streaming_response_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 25_000,
            idle_timeout_ms: 5_000,
            sweep_interval_ms: 1_000,
            close_grace_ms: 5_000,
            streaming_response_limit: 128 * 1024,
        }
    }
}

impl EngineConfig {
    /// Heartbeat period as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Idle threshold as a [`Duration`].
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Sweep period as a [`Duration`].
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Close-replay grace period as a [`Duration`].
    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }
}
