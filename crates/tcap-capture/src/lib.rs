//! # tcap-capture
//!
//! The capture supervisor: everything between the user's terminal and the
//! recorded artifacts.
//!
//! This crate provides:
//! - PTY allocation and the child-side controlling-terminal setup
//! - An async-signal-safe control plane with a self-pipe wakeup
//! - The single-threaded `poll(2)` event loop that relays bytes in both
//!   directions while committing them to a `tcap_core::SessionWriter`
//! - Lifecycle management: raw-mode entry and restoration, child reaping,
//!   idempotent teardown
//!
//! The loop is deliberately not built on an async runtime: it multiplexes
//! three descriptors, and the only suspension point is the `poll` call, so
//! cooperative scheduling over tasks would add machinery without adding
//! clarity.

mod config;
mod pty;
mod signals;
mod supervisor;
mod term;

pub use config::{CaptureConfig, ConfigError, WsOptions};
pub use pty::PtyError;
pub use supervisor::{CaptureError, run, teardown_has_run};
