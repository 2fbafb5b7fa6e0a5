//! Timed offline replay of a captured output stream.
//!
//! The player walks the output `.tidx` records, sleeping the recorded gap
//! between commits (scaled by the speed multiplier) and writing each commit's
//! byte range. Seeking is done through the index: everything before the
//! start point is skipped without delay.

use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::index::StreamIndex;
use crate::reader::{ReadError, SessionReader};

/// Playback configuration.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Speed multiplier (1.0 = recorded speed, 2.0 = twice as fast).
    pub speed: f32,

    /// Seek target: replay starts at the offset reached by this timestamp.
    pub start_at_ns: Option<u64>,

    /// Dump without any delay.
    pub instant: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            start_at_ns: None,
            instant: false,
        }
    }
}

impl PlayerConfig {
    /// Sets the speed multiplier, clamped to a 0.1 minimum.
    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed.max(0.1);
        self
    }

    /// Starts playback at the given session-relative time.
    pub fn with_start_at_ns(mut self, start_at_ns: u64) -> Self {
        self.start_at_ns = Some(start_at_ns);
        self
    }

    /// Disables all delays.
    pub fn with_instant(mut self) -> Self {
        self.instant = true;
        self
    }
}

/// Replays one session's output stream.
#[derive(Debug)]
pub struct SessionPlayer {
    index: StreamIndex,
    data: Vec<u8>,
    config: PlayerConfig,
}

impl SessionPlayer {
    /// Loads the output stream and its index for `prefix`.
    pub fn open(prefix: &str) -> Result<Self, ReadError> {
        let session = SessionReader::open_with(prefix, true)?;
        let data = SessionReader::read_output(prefix)?;
        Ok(Self {
            index: session.output,
            data,
            config: PlayerConfig::default(),
        })
    }

    /// Sets the playback configuration.
    pub fn with_config(mut self, config: PlayerConfig) -> Self {
        self.config = config;
        self
    }

    /// Number of replayable commits.
    pub fn record_count(&self) -> usize {
        self.index.len()
    }

    /// Replays to `out`, honouring speed and seek configuration.
    ///
    /// Bytes past the last index record (a crash tail the index never
    /// committed) are not replayed.
    pub fn replay<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let start_offset = self
            .config
            .start_at_ns
            .map_or(0, |t| self.index.offset_at_time(t));
        debug!(
            records = self.index.len(),
            start_offset, "replaying output stream"
        );

        let mut prev_t = self
            .config
            .start_at_ns
            .map_or(0, |t| self.index.rendered_time_at_offset(start_offset));
        let mut prev_end = start_offset;

        for (&t_ns, &end) in self
            .index
            .timestamps()
            .iter()
            .zip(self.index.end_offsets())
        {
            if end <= start_offset {
                continue;
            }
            if !self.config.instant {
                let gap_ns = t_ns.saturating_sub(prev_t);
                let scaled = (gap_ns as f64 / f64::from(self.config.speed)) as u64;
                if scaled > 0 {
                    thread::sleep(Duration::from_nanos(scaled));
                }
            }

            let from = (prev_end as usize).min(self.data.len());
            let to = (end as usize).min(self.data.len());
            out.write_all(&self.data[from..to])?;

            prev_t = t_ns;
            prev_end = end;
        }
        out.flush()
    }

    /// Collects the replayable bytes without timing, for inspection.
    pub fn collect(&self) -> Vec<u8> {
        let end = self.index.end_offsets().last().copied().unwrap_or(0) as usize;
        self.data[..end.min(self.data.len())].to_vec()
    }
}
