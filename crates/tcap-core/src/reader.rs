//! Whole-session loading for offline consumers.

use std::io;
use std::path::PathBuf;

use tcap_proto::{FormatError, SessionMeta};
use thiserror::Error;
use tracing::debug;

use crate::events::EventLog;
use crate::index::StreamIndex;

/// Failure while loading a session from disk.
#[derive(Debug, Error)]
pub enum ReadError {
    /// A required artifact could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    /// A sidecar is present but corrupt.
    #[error("{}: {source}", path.display())]
    Format { path: PathBuf, source: FormatError },
}

/// A fully loaded capture session.
///
/// Both indices arrive already clamped to their raw-stream lengths, so a
/// session cut short by a crash parses into a consistent prefix. Sidecars
/// the writer had to disable load as empty; the raw streams themselves are
/// required.
#[derive(Debug)]
pub struct SessionReader {
    /// Parsed metadata, if the artifact exists and parses.
    pub meta: Option<SessionMeta>,

    /// Time index of the keystroke stream.
    pub input: StreamIndex,

    /// Time index of the PTY output stream.
    pub output: StreamIndex,

    /// Canonicalised resize events.
    pub events: EventLog,

    /// Length of `P.input` in bytes.
    pub input_len: u64,

    /// Length of `P.output` in bytes.
    pub output_len: u64,
}

impl SessionReader {
    /// Loads every artifact reachable from `prefix`, rejecting unknown
    /// sidecar flags.
    pub fn open(prefix: &str) -> Result<Self, ReadError> {
        Self::open_with(prefix, false)
    }

    /// Loads a session, optionally tolerating sidecar flag bits this reader
    /// does not understand.
    pub fn open_with(prefix: &str, tolerate_unknown_flags: bool) -> Result<Self, ReadError> {
        let input_len = raw_len(format!("{prefix}.input"))?;
        let output_len = raw_len(format!("{prefix}.output"))?;

        let mut input = load_index(format!("{prefix}.input.tidx"), tolerate_unknown_flags)?;
        input.truncate_to_raw_len(input_len);
        let mut output = load_index(format!("{prefix}.output.tidx"), tolerate_unknown_flags)?;
        output.truncate_to_raw_len(output_len);

        let events = match std::fs::read_to_string(format!("{prefix}.events.jsonl")) {
            Ok(text) => EventLog::parse(&text),
            Err(_) => EventLog::default(),
        };

        let meta = std::fs::read(format!("{prefix}.meta.json"))
            .ok()
            .and_then(|bytes| SessionMeta::parse(&bytes).ok());

        debug!(
            prefix,
            input_records = input.len(),
            output_records = output.len(),
            resizes = events.resizes().len(),
            "session loaded"
        );
        Ok(Self {
            meta,
            input,
            output,
            events,
            input_len,
            output_len,
        })
    }

    /// Reads the full output raw stream.
    pub fn read_output(prefix: &str) -> Result<Vec<u8>, ReadError> {
        let path = PathBuf::from(format!("{prefix}.output"));
        std::fs::read(&path).map_err(|source| ReadError::Io { path, source })
    }
}

fn raw_len(path: String) -> Result<u64, ReadError> {
    let path = PathBuf::from(path);
    std::fs::metadata(&path)
        .map(|m| m.len())
        .map_err(|source| ReadError::Io { path, source })
}

fn load_index(path: String, tolerate_unknown_flags: bool) -> Result<StreamIndex, ReadError> {
    let path = PathBuf::from(path);
    match std::fs::read(&path) {
        Ok(bytes) => StreamIndex::parse(&bytes, tolerate_unknown_flags)
            .map_err(|source| ReadError::Format { path, source }),
        // A sidecar the writer disabled at open time simply is not there.
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(StreamIndex::empty()),
        Err(source) => Err(ReadError::Io { path, source }),
    }
}
