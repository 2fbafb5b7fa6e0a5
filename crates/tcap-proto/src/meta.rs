//! `.meta.json` session metadata.

use crate::error::FormatError;
use serde::{Deserialize, Serialize};

/// Session metadata, written once at startup.
///
/// Readers ignore unknown keys; the optional build identity fields are only
/// emitted when known at compile time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMeta {
    /// Supervisor process id.
    pub pid: i32,

    /// The capture prefix all artifact paths derive from.
    pub prefix: String,

    /// Wall-clock session start, nanoseconds since the Unix epoch.
    pub started_at_unix_ns: u64,

    /// Git commit the recorder was built from, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_git_sha: Option<String>,

    /// Whether the build tree was dirty, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_git_dirty: Option<bool>,
}

impl SessionMeta {
    /// Serializes as a single-line JSON object.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parses a metadata artifact.
    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let meta = SessionMeta {
            pid: 4321,
            prefix: "/tmp/demo".to_string(),
            started_at_unix_ns: 1_700_000_000_000_000_000,
            build_git_sha: Some("abc123".to_string()),
            build_git_dirty: Some(false),
        };
        let parsed = SessionMeta::parse(meta.to_json().as_bytes()).unwrap();
        assert_eq!(parsed, meta);
    }

    #[test]
    fn test_optional_fields_omitted() {
        let meta = SessionMeta {
            pid: 1,
            prefix: "p".to_string(),
            started_at_unix_ns: 5,
            build_git_sha: None,
            build_git_dirty: None,
        };
        let json = meta.to_json();
        assert!(!json.contains("build_git_sha"));
        assert!(!json.contains("build_git_dirty"));
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let json = r#"{"pid":7,"prefix":"x","started_at_unix_ns":9,"viewer_hint":"dark"}"#;
        let meta = SessionMeta::parse(json.as_bytes()).unwrap();
        assert_eq!(meta.pid, 7);
        assert_eq!(meta.prefix, "x");
    }
}
