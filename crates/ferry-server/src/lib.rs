//! # ferry-server
//!
//! The Ferry protocol engine: a persistent bidirectional messaging
//! channel multiplexed over plain HTTP (polling, streaming) and
//! WebSocket transports.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `session` | Per-session state machine, outbound queue, receiver arbitration |
//! | `session::registry` | Session id → session map, creation and reaping |
//! | `engine` | Facade tying registry, config, and application handler together |
//! | `handler` | Application callback trait plus stock echo/close handlers |
//! | `scheduler` | Heartbeat and idle/reap sweeps over the registry |
//! | `transport` | Per-transport adapters: xhr polling, xhr streaming, websocket |
//! | `routes` | Thin axum dispatch of `/{server}/{session}/{transport}` |
//! | `metrics` | Prometheus recorder and metric name constants |
//!
//! ## Data Flow
//!
//! inbound request → `routes` → `transport` adapter → `engine`
//! (resolve/create session, attach receiver or submit messages) →
//! `handler` callbacks → `engine::enqueue_outbound` → frames flushed to
//! the active receiver → adapter writes them on the wire.

#![deny(unsafe_code)]

pub mod engine;
pub mod handler;
pub mod metrics;
pub mod routes;
pub mod scheduler;
pub mod session;
pub mod transport;

pub use engine::Engine;
pub use handler::SessionHandler;
