//! Parsed `.tidx` sidecars and the offset/time queries.
//!
//! Records are decoded once into parallel cumulative arrays; every query is
//! then a binary search. A truncated trailing record (crash mid-write) is
//! discarded during parsing; a varint that overflows 64 bits is corruption
//! and fails the parse.

use tcap_proto::{FormatError, TIDX_HEADER_LEN, TidxHeader, VarintError, decode_record};

/// One stream's time index.
#[derive(Debug, Clone)]
pub struct StreamIndex {
    header: TidxHeader,
    t_ns: Vec<u64>,
    end_offset: Vec<u64>,
}

impl StreamIndex {
    /// An index with no records, as produced when a sidecar was disabled.
    pub fn empty() -> Self {
        Self {
            header: TidxHeader::new(0),
            t_ns: Vec::new(),
            end_offset: Vec::new(),
        }
    }

    /// Parses a whole sidecar.
    ///
    /// `tolerate_unknown_flags` forwards to header validation; records after
    /// a truncated tail are unreachable by construction, so the valid prefix
    /// is returned silently.
    pub fn parse(bytes: &[u8], tolerate_unknown_flags: bool) -> Result<Self, FormatError> {
        let header = TidxHeader::parse(bytes, tolerate_unknown_flags)?;

        let mut t_ns = Vec::new();
        let mut end_offset = Vec::new();
        let mut t_cum: u64 = 0;
        let mut end_cum: u64 = 0;
        let mut pos = TIDX_HEADER_LEN;

        while pos < bytes.len() {
            match decode_record(&bytes[pos..]) {
                Ok((dt, dend, consumed)) => {
                    t_cum = t_cum.saturating_add(dt);
                    end_cum = end_cum.saturating_add(dend);
                    t_ns.push(t_cum);
                    end_offset.push(end_cum);
                    pos += consumed;
                }
                Err(VarintError::Truncated) => break,
                Err(err @ VarintError::Overflow) => return Err(err.into()),
            }
        }

        Ok(Self {
            header,
            t_ns,
            end_offset,
        })
    }

    /// Drops every record whose `end_offset` exceeds the raw stream length.
    ///
    /// This is what makes a crash-recovered session usable: an index record
    /// referencing bytes that never hit the disk is simply forgotten.
    pub fn truncate_to_raw_len(&mut self, raw_len: u64) {
        let keep = self.end_offset.partition_point(|&end| end <= raw_len);
        self.t_ns.truncate(keep);
        self.end_offset.truncate(keep);
    }

    /// Wall-clock session start from the header.
    pub fn started_at_unix_ns(&self) -> u64 {
        self.header.started_at_unix_ns
    }

    /// Header flags byte.
    pub fn flags(&self) -> u8 {
        self.header.flags
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.t_ns.len()
    }

    /// True when no record survived parsing.
    pub fn is_empty(&self) -> bool {
        self.t_ns.is_empty()
    }

    /// Cumulative timestamps, nanoseconds since session start.
    pub fn timestamps(&self) -> &[u64] {
        &self.t_ns
    }

    /// Cumulative raw-stream lengths after each commit.
    pub fn end_offsets(&self) -> &[u64] {
        &self.end_offset
    }

    /// Byte offset reached by time `t_ns`: the `end_offset` of the first
    /// record at or after `t_ns`. Zero for an empty index or `t_ns` zero;
    /// the final length once `t_ns` is past the last record.
    pub fn offset_at_time(&self, t_ns: u64) -> u64 {
        if t_ns == 0 || self.t_ns.is_empty() {
            return 0;
        }
        let i = self.t_ns.partition_point(|&t| t < t_ns);
        match self.end_offset.get(i) {
            Some(&end) => end,
            None => *self.end_offset.last().unwrap_or(&0),
        }
    }

    /// Timestamp of the first record whose `end_offset` reaches `offset`.
    ///
    /// Past the last record this clamps to the final timestamp.
    pub fn time_at_offset(&self, offset: u64) -> u64 {
        let i = self.end_offset.partition_point(|&end| end < offset);
        match self.t_ns.get(i) {
            Some(&t) => t,
            None => *self.t_ns.last().unwrap_or(&0),
        }
    }

    /// Timestamp of the last commit wholly at or before `offset`, or zero if
    /// none is. Monotone non-decreasing in `offset`, which is what
    /// lag-sensitive consumers need when they are mid-segment.
    pub fn rendered_time_at_offset(&self, offset: u64) -> u64 {
        let i = self.end_offset.partition_point(|&end| end <= offset);
        if i == 0 { 0 } else { self.t_ns[i - 1] }
    }
}
