//! `.tidx` time-index sidecar layout.
//!
//! Layout: 5-byte ASCII magic `TIDX1`, one flags byte (zero in v1), the
//! session's `started_at_unix_ns` as a little-endian u64, then records to
//! end of file. Each record is two varints, `dt_ns` and `dend`, deltas from
//! the previous record's cumulative `t_ns` and `end_offset` (the first
//! record's deltas are from zero).

use crate::error::FormatError;
use crate::varint::{self, VarintError};

/// ASCII magic at the start of every `.tidx` sidecar.
pub const TIDX_MAGIC: &[u8; 5] = b"TIDX1";

/// The only flags byte this version writes.
pub const TIDX_FLAGS_V1: u8 = 0;

/// Fixed header length: magic + flags + little-endian u64 epoch nanoseconds.
pub const TIDX_HEADER_LEN: usize = 14;

/// Parsed fixed header of a `.tidx` sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TidxHeader {
    /// Format flags; zero in v1.
    pub flags: u8,

    /// Wall-clock session start, nanoseconds since the Unix epoch.
    pub started_at_unix_ns: u64,
}

impl TidxHeader {
    /// Creates a v1 header.
    pub fn new(started_at_unix_ns: u64) -> Self {
        Self {
            flags: TIDX_FLAGS_V1,
            started_at_unix_ns,
        }
    }

    /// Encodes the fixed header.
    pub fn encode(&self) -> [u8; TIDX_HEADER_LEN] {
        let mut out = [0u8; TIDX_HEADER_LEN];
        out[..5].copy_from_slice(TIDX_MAGIC);
        out[5] = self.flags;
        out[6..].copy_from_slice(&self.started_at_unix_ns.to_le_bytes());
        out
    }

    /// Parses the fixed header from the front of `buf`.
    ///
    /// Unknown flag bits are rejected unless `tolerate_unknown_flags` is
    /// set, in which case they are preserved for the caller to inspect.
    pub fn parse(buf: &[u8], tolerate_unknown_flags: bool) -> Result<Self, FormatError> {
        if buf.len() < TIDX_HEADER_LEN {
            if buf.len() >= 5 && &buf[..5] != TIDX_MAGIC {
                return Err(FormatError::BadMagic);
            }
            return Err(FormatError::TruncatedHeader);
        }
        if &buf[..5] != TIDX_MAGIC {
            return Err(FormatError::BadMagic);
        }
        let flags = buf[5];
        if flags != TIDX_FLAGS_V1 && !tolerate_unknown_flags {
            return Err(FormatError::UnknownFlags(flags));
        }
        let mut ns = [0u8; 8];
        ns.copy_from_slice(&buf[6..TIDX_HEADER_LEN]);
        Ok(Self {
            flags,
            started_at_unix_ns: u64::from_le_bytes(ns),
        })
    }
}

/// Appends one (`dt_ns`, `dend`) record to `out`.
pub fn encode_record(dt_ns: u64, dend: u64, out: &mut Vec<u8>) {
    varint::encode_u64(dt_ns, out);
    varint::encode_u64(dend, out);
}

/// Decodes one record from the front of `buf`.
///
/// Returns the deltas and the number of bytes consumed. A `Truncated` error
/// means the buffer ends inside the record; callers recovering a crashed
/// session discard such a tail. `Overflow` is corruption.
pub fn decode_record(buf: &[u8]) -> Result<(u64, u64, usize), VarintError> {
    let (dt_ns, n1) = varint::decode_u64(buf)?;
    let (dend, n2) = varint::decode_u64(&buf[n1..])?;
    Ok((dt_ns, dend, n1 + n2))
}
