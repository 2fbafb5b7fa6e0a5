//! Error types shared by the format parsers.

use crate::varint::VarintError;
use thiserror::Error;

/// Failure while parsing a capture artifact.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The sidecar does not start with the `TIDX1` magic.
    #[error("not a TIDX sidecar (bad magic)")]
    BadMagic,

    /// The flags byte carries bits this reader does not understand.
    #[error("unsupported sidecar flags {0:#04x}")]
    UnknownFlags(u8),

    /// The sidecar is shorter than its fixed header.
    #[error("sidecar header truncated")]
    TruncatedHeader,

    /// A record varint does not fit in 64 bits.
    #[error("corrupt sidecar record: {0}")]
    Varint(#[from] VarintError),

    /// An artifact that must be JSON is not.
    #[error("invalid JSON artifact: {0}")]
    Json(#[from] serde_json::Error),
}
