//! `.events.jsonl` line schema.
//!
//! One JSON object per line. v1 defines a single event kind, `resize`,
//! carried on the output stream. Readers must tolerate blank lines, lines
//! that are not JSON, unknown `type` values, and unknown keys, so parsing is
//! exposed as an `Option`-returning per-line helper rather than a strict
//! deserializer.

use serde::{Deserialize, Serialize};

/// Which raw stream an event is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamId {
    /// Bytes read from the PTY master (what the user saw).
    Output,
    /// Bytes read from the controlling terminal (what the user typed).
    Input,
}

/// A terminal geometry change.
///
/// `stream_offset` is the absolute byte offset in the output raw stream at
/// which the new geometry applies, immediately before the next output byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeEvent {
    /// Monotonic nanoseconds since session start.
    pub t_ns: u64,

    /// Stream the event is bound to; always `output` in v1.
    pub stream: StreamId,

    /// Absolute byte offset in the bound raw stream.
    pub stream_offset: u64,

    /// Terminal width in columns.
    pub cols: u16,

    /// Terminal height in rows.
    pub rows: u16,
}

impl ResizeEvent {
    /// Creates a resize bound to the output stream.
    pub fn output(t_ns: u64, stream_offset: u64, cols: u16, rows: u16) -> Self {
        Self {
            t_ns,
            stream: StreamId::Output,
            stream_offset,
            cols,
            rows,
        }
    }
}

/// One line of the events sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventLine {
    /// Terminal geometry change.
    Resize(ResizeEvent),
}

impl EventLine {
    /// Serializes the event as a single JSONL line, newline included.
    pub fn to_jsonl(&self) -> String {
        // Serialization of these flat structs cannot fail.
        let mut line = serde_json::to_string(self).unwrap_or_default();
        line.push('\n');
        line
    }

    /// Parses one sidecar line.
    ///
    /// Returns `None` for blank lines, malformed JSON, and unknown event
    /// types; those are tolerated by design so newer writers do not break
    /// older readers.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        serde_json::from_str(line).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_line_shape() {
        let event = EventLine::Resize(ResizeEvent::output(1_500_000, 4096, 120, 30));
        let line = event.to_jsonl();

        assert!(line.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "resize");
        assert_eq!(value["stream"], "output");
        assert_eq!(value["stream_offset"], 4096);
        assert_eq!(value["cols"], 120);
        assert_eq!(value["rows"], 30);
    }

    #[test]
    fn test_parse_roundtrip() {
        let event = EventLine::Resize(ResizeEvent::output(7, 0, 80, 24));
        let parsed = EventLine::parse(&event.to_jsonl()).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_blank_and_garbage_lines_ignored() {
        assert_eq!(EventLine::parse(""), None);
        assert_eq!(EventLine::parse("   "), None);
        assert_eq!(EventLine::parse("not json"), None);
    }

    #[test]
    fn test_unknown_type_ignored() {
        let line = r#"{"type":"cursor_jump","t_ns":1,"stream":"output","stream_offset":0}"#;
        assert_eq!(EventLine::parse(line), None);
    }

    #[test]
    fn test_unknown_keys_tolerated() {
        let line = r#"{"type":"resize","t_ns":9,"stream":"output","stream_offset":3,"cols":10,"rows":5,"pixel_width":0}"#;
        let EventLine::Resize(resize) = EventLine::parse(line).unwrap();
        assert_eq!(resize.t_ns, 9);
        assert_eq!(resize.cols, 10);
    }
}
