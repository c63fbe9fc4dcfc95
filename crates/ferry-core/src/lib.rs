//! # ferry-core
//!
//! Foundation types for the Ferry protocol engine.
//!
//! This crate provides the shared vocabulary the server crate depends on:
//!
//! - **Frames**: [`frame::Frame`] — the four wire units (`Open`,
//!   `Heartbeat`, `Message`, `Close`) and the client payload decoder
//! - **Branded IDs**: [`ids::SessionId`] as a newtype
//! - **Configuration**: [`config::EngineConfig`] — heartbeat interval,
//!   idle timeout, sweep period, streaming response limit
//!
//! ## Crate Position
//!
//! Foundation crate. No async, no I/O; depended on by `ferry-server`
//! and the `ferry` binary.

#![deny(unsafe_code)]

pub mod config;
pub mod frame;
pub mod ids;
