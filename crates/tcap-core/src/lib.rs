//! # tcap-core
//!
//! Reading and writing of TCAP capture sessions.
//!
//! This crate provides:
//! - `SessionWriter`: the append-only artifact writer used by the capture
//!   supervisor, with per-commit durability ordering and degrade-and-continue
//!   sidecar handling
//! - `StreamIndex`: parsed `.tidx` sidecars with O(log N) offset/time
//!   queries and crash-recovery tail truncation
//! - `EventLog`: canonicalised resize events with range segmentation
//! - `SessionReader`: whole-session loading for offline consumers
//! - `SessionPlayer`: timed replay of a captured output stream

#![deny(unsafe_code)]

mod events;
mod index;
mod player;
mod reader;
mod writer;

pub use events::{EventLog, Segment};
pub use index::StreamIndex;
pub use player::{PlayerConfig, SessionPlayer};
pub use reader::{ReadError, SessionReader};
pub use writer::{SessionWriter, WriterError};
