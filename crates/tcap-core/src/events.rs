//! Resize-event utilities for readers and renderers.
//!
//! The events sidecar is tolerant text: blank, malformed, and unknown-type
//! lines are skipped. Surviving events are put into a canonical order,
//! `stream_offset` then `t_ns` then original line order (the sort is stable,
//! so line order is the natural tie-break), which gives renderers a
//! deterministic view even when a writer emitted coincident events.

use tcap_proto::{EventLine, ResizeEvent};

/// Canonicalised resize events of one session.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    resizes: Vec<ResizeEvent>,
}

/// One item of a segmented byte range: either a run of raw output bytes or
/// the event that applies before the following run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Contiguous output bytes.
    Bytes(&'a [u8]),
    /// Geometry change taking effect at this exact point.
    Resize(ResizeEvent),
}

impl EventLog {
    /// Parses sidecar text, skipping anything that is not a known event.
    pub fn parse(text: &str) -> Self {
        Self::from_events(
            text.lines()
                .filter_map(EventLine::parse)
                .map(|EventLine::Resize(resize)| resize)
                .collect(),
        )
    }

    /// Builds a log from already-decoded events, normalising the order.
    pub fn from_events(mut resizes: Vec<ResizeEvent>) -> Self {
        resizes.sort_by_key(|e| (e.stream_offset, e.t_ns));
        Self { resizes }
    }

    /// Events in canonical order.
    pub fn resizes(&self) -> &[ResizeEvent] {
        &self.resizes
    }

    /// True when the session recorded no resize at all.
    pub fn is_empty(&self) -> bool {
        self.resizes.is_empty()
    }

    /// The last event strictly before `offset`, used to initialise a
    /// renderer that starts mid-stream.
    pub fn last_resize_before(&self, offset: u64) -> Option<&ResizeEvent> {
        let i = self
            .resizes
            .partition_point(|e| e.stream_offset < offset);
        if i == 0 { None } else { Some(&self.resizes[i - 1]) }
    }

    /// Splits `bytes`, which sit at absolute output offset `base`, into runs
    /// separated by the events that fall inside `[base, base + len)`.
    ///
    /// An event applies before the byte at its `stream_offset`, so an event
    /// at exactly `base + len` belongs to the caller's next range. Emitted
    /// byte runs are never empty and always sum to the input length.
    pub fn segment<'a>(&self, base: u64, bytes: &'a [u8]) -> Vec<Segment<'a>> {
        let end = base + bytes.len() as u64;
        let lo = self.resizes.partition_point(|e| e.stream_offset < base);
        let hi = self.resizes.partition_point(|e| e.stream_offset < end);

        let mut items = Vec::with_capacity(hi - lo + 2);
        let mut cursor = 0usize;
        for event in &self.resizes[lo..hi] {
            let at = (event.stream_offset - base) as usize;
            if at > cursor {
                items.push(Segment::Bytes(&bytes[cursor..at]));
                cursor = at;
            }
            items.push(Segment::Resize(*event));
        }
        if cursor < bytes.len() {
            items.push(Segment::Bytes(&bytes[cursor..]));
        }
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resize(t_ns: u64, offset: u64, cols: u16) -> ResizeEvent {
        ResizeEvent::output(t_ns, offset, cols, 24)
    }

    #[test]
    fn test_parse_tolerates_noise() {
        let text = concat!(
            "\n",
            r#"{"type":"resize","t_ns":5,"stream":"output","stream_offset":0,"cols":80,"rows":24}"#,
            "\n",
            "garbage line\n",
            r#"{"type":"bell","t_ns":6}"#,
            "\n",
            r#"{"type":"resize","t_ns":9,"stream":"output","stream_offset":12,"cols":100,"rows":30}"#,
            "\n",
        );
        let log = EventLog::parse(text);
        assert_eq!(log.resizes().len(), 2);
        assert_eq!(log.resizes()[1].cols, 100);
    }

    #[test]
    fn test_canonical_order_is_stable() {
        let log = EventLog::from_events(vec![
            resize(9, 10, 3),
            resize(5, 10, 1),
            resize(5, 10, 2),
            resize(1, 0, 0),
        ]);
        let cols: Vec<u16> = log.resizes().iter().map(|e| e.cols).collect();
        // Offset first, then time; equal pairs keep insertion order.
        assert_eq!(cols, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_last_resize_before_is_strict() {
        let log = EventLog::from_events(vec![resize(1, 0, 80), resize(2, 10, 100)]);

        assert!(log.last_resize_before(0).is_none());
        assert_eq!(log.last_resize_before(1).unwrap().cols, 80);
        assert_eq!(log.last_resize_before(10).unwrap().cols, 80);
        assert_eq!(log.last_resize_before(11).unwrap().cols, 100);
    }

    #[test]
    fn test_segment_alternates_and_preserves_bytes() {
        let log = EventLog::from_events(vec![resize(1, 0, 80), resize(2, 3, 100)]);
        let items = log.segment(0, b"abcdef");

        assert_eq!(
            items,
            vec![
                Segment::Resize(resize(1, 0, 80)),
                Segment::Bytes(b"abc"),
                Segment::Resize(resize(2, 3, 100)),
                Segment::Bytes(b"def"),
            ]
        );

        let total: usize = items
            .iter()
            .filter_map(|item| match item {
                Segment::Bytes(b) => Some(b.len()),
                Segment::Resize(_) => None,
            })
            .sum();
        assert_eq!(total, 6);
    }

    #[test]
    fn test_segment_respects_base_offset() {
        let log = EventLog::from_events(vec![resize(1, 0, 80), resize(2, 12, 100)]);
        // Bytes for the range [10, 16): only the offset-12 event is inside.
        let items = log.segment(10, b"klmnop");
        assert_eq!(
            items,
            vec![
                Segment::Bytes(b"kl"),
                Segment::Resize(resize(2, 12, 100)),
                Segment::Bytes(b"mnop"),
            ]
        );
    }

    #[test]
    fn test_segment_excludes_event_at_range_end() {
        let log = EventLog::from_events(vec![resize(1, 6, 80)]);
        let items = log.segment(0, b"abcdef");
        assert_eq!(items, vec![Segment::Bytes(b"abcdef".as_slice())]);

        // The next range picks it up.
        let items = log.segment(6, b"gh");
        assert_eq!(
            items,
            vec![Segment::Resize(resize(1, 6, 80)), Segment::Bytes(b"gh")]
        );
    }

    #[test]
    fn test_segment_empty_input() {
        let log = EventLog::from_events(vec![resize(1, 3, 80)]);
        assert!(log.segment(10, b"").is_empty());
    }

    #[test]
    fn test_segment_preserves_bytes_for_generated_schedules() {
        let data = vec![b'x'; 4096];
        let mut state = 0x9e37u64;
        let mut offset = 0u64;
        let mut events = Vec::new();
        for i in 0..24 {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            offset = (offset + (state >> 33) % 400).min(data.len() as u64);
            events.push(resize(i, offset, 80));
        }
        let in_range = events
            .iter()
            .filter(|e| e.stream_offset < data.len() as u64)
            .count();
        let log = EventLog::from_events(events);

        // Whole-buffer segmentation accounts for every byte and every
        // in-range event exactly once.
        let items = log.segment(0, &data);
        let mut bytes = 0usize;
        let mut resizes = 0usize;
        for item in &items {
            match item {
                Segment::Bytes(b) => {
                    assert!(!b.is_empty());
                    bytes += b.len();
                }
                Segment::Resize(_) => resizes += 1,
            }
        }
        assert_eq!(bytes, data.len());
        assert_eq!(resizes, in_range);

        // Chunked segmentation agrees with the whole-buffer pass.
        let mut bytes = 0usize;
        let mut resizes = 0usize;
        for (chunk_no, chunk) in data.chunks(333).enumerate() {
            for item in log.segment(chunk_no as u64 * 333, chunk) {
                match item {
                    Segment::Bytes(b) => bytes += b.len(),
                    Segment::Resize(_) => resizes += 1,
                }
            }
        }
        assert_eq!(bytes, data.len());
        assert_eq!(resizes, in_range);
    }
}
