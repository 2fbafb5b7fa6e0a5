//! # tcap-proto
//!
//! On-disk format primitives and shared types for TCAP session captures.
//!
//! A capture session with prefix `P` consists of six artifacts:
//! - `P.input`, `P.output`: raw byte streams, append-only
//! - `P.input.tidx`, `P.output.tidx`: binary time-index sidecars
//! - `P.events.jsonl`: line-delimited out-of-band events (resizes)
//! - `P.meta.json`: session metadata written once at startup
//!
//! This crate defines the byte-level encoding of those artifacts and
//! nothing else: no I/O, no clocks. Writers and readers live in
//! `tcap-core`.

#![deny(unsafe_code)]

mod error;
mod event;
mod meta;
mod tidx;
mod varint;

pub use error::FormatError;
pub use event::{EventLine, ResizeEvent, StreamId};
pub use meta::SessionMeta;
pub use tidx::{TIDX_FLAGS_V1, TIDX_HEADER_LEN, TIDX_MAGIC, TidxHeader, decode_record, encode_record};
pub use varint::{VarintError, decode_u64, encode_u64};
