//! Append-only writer for the six session artifacts.
//!
//! A `SessionWriter` owns both raw streams, their `.tidx` sidecars, the
//! events sidecar, and writes the metadata file once at creation. Raw-stream
//! failures are fatal; sidecar failures emit one warning and disable that
//! sidecar for the rest of the session so capture keeps going.
//!
//! Durability order per commit: the raw bytes are written (and reach the
//! kernel, these files are unbuffered) before the index record that
//! references them. A crash between the two leaves a raw tail no index
//! record points at, which readers already handle.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tcap_proto::{EventLine, ResizeEvent, SessionMeta, TidxHeader, encode_record};
use thiserror::Error;
use tracing::{debug, warn};

/// Fatal writer failure. Sidecar problems never surface here.
#[derive(Debug, Error)]
pub enum WriterError {
    /// A raw stream could not be opened.
    #[error("cannot open raw stream {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    /// A raw stream append failed.
    #[error("write to raw stream {} failed: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// Emits the single-line degradation warning the capture contract promises,
/// then the structured one.
fn sidecar_warning(path: &Path, err: &io::Error) {
    eprintln!("TCAP: warning: {}: {err}; continuing without it", path.display());
    warn!(path = %path.display(), error = %err, "sidecar disabled");
}

struct TidxSidecar {
    path: PathBuf,
    file: File,
    prev_t_ns: u64,
    prev_end_offset: u64,
}

impl TidxSidecar {
    fn open(path: PathBuf, started_at_unix_ns: u64) -> Option<Self> {
        // Header plus a baseline record at (t 0, offset 0), so even a
        // session that never commits a byte has a seekable origin.
        let mut preamble = TidxHeader::new(started_at_unix_ns).encode().to_vec();
        encode_record(0, 0, &mut preamble);

        let result = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .and_then(|mut file| {
                file.write_all(&preamble)?;
                Ok(file)
            });
        match result {
            Ok(file) => Some(Self {
                path,
                file,
                prev_t_ns: 0,
                prev_end_offset: 0,
            }),
            Err(err) => {
                sidecar_warning(&path, &err);
                None
            }
        }
    }

    /// Appends one record; returns false if the sidecar must be disabled.
    fn append(&mut self, t_ns: u64, end_offset: u64) -> bool {
        let mut record = Vec::with_capacity(20);
        encode_record(
            t_ns - self.prev_t_ns,
            end_offset - self.prev_end_offset,
            &mut record,
        );
        match self.file.write_all(&record) {
            Ok(()) => {
                self.prev_t_ns = t_ns;
                self.prev_end_offset = end_offset;
                true
            }
            Err(err) => {
                sidecar_warning(&self.path, &err);
                false
            }
        }
    }
}

struct StreamWriter {
    path: PathBuf,
    file: File,
    len: u64,
    tidx: Option<TidxSidecar>,
}

impl StreamWriter {
    fn open(path: PathBuf, tidx_path: PathBuf, started_at_unix_ns: u64) -> Result<Self, WriterError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| WriterError::Open {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            path,
            file,
            len: 0,
            tidx: TidxSidecar::open(tidx_path, started_at_unix_ns),
        })
    }

    fn commit(&mut self, bytes: &[u8], t_ns: u64) -> Result<(), WriterError> {
        self.file.write_all(bytes).map_err(|source| WriterError::Write {
            path: self.path.clone(),
            source,
        })?;
        self.len += bytes.len() as u64;

        let index_ok = match &mut self.tidx {
            Some(tidx) => tidx.append(t_ns, self.len),
            None => true,
        };
        if !index_ok {
            self.tidx = None;
        }
        Ok(())
    }
}

/// Writer for one capture session.
///
/// All timestamps handed to the artifacts come from a single monotonic clock
/// whose zero is the moment of creation; the matching wall-clock instant is
/// stamped into every header that carries `started_at_unix_ns`.
pub struct SessionWriter {
    input: StreamWriter,
    output: StreamWriter,
    events: Option<(PathBuf, File)>,
    started_at_unix_ns: u64,
    epoch: Instant,
}

impl SessionWriter {
    /// Opens all artifacts for `prefix`, truncating previous contents.
    ///
    /// Raw-stream failures abort; every sidecar (both `.tidx`, the events
    /// file, and `.meta.json`) degrades individually.
    pub fn create(
        prefix: &str,
        pid: i32,
        build_git_sha: Option<&str>,
        build_git_dirty: Option<bool>,
    ) -> Result<Self, WriterError> {
        let started_at_unix_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos() as u64);
        let epoch = Instant::now();

        let input = StreamWriter::open(
            PathBuf::from(format!("{prefix}.input")),
            PathBuf::from(format!("{prefix}.input.tidx")),
            started_at_unix_ns,
        )?;
        let output = StreamWriter::open(
            PathBuf::from(format!("{prefix}.output")),
            PathBuf::from(format!("{prefix}.output.tidx")),
            started_at_unix_ns,
        )?;

        let events_path = PathBuf::from(format!("{prefix}.events.jsonl"));
        let events = match OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&events_path)
        {
            Ok(file) => Some((events_path, file)),
            Err(err) => {
                sidecar_warning(&events_path, &err);
                None
            }
        };

        let meta = SessionMeta {
            pid,
            prefix: prefix.to_string(),
            started_at_unix_ns,
            build_git_sha: build_git_sha.map(str::to_string),
            build_git_dirty,
        };
        let meta_path = PathBuf::from(format!("{prefix}.meta.json"));
        if let Err(err) = std::fs::write(&meta_path, meta.to_json()) {
            sidecar_warning(&meta_path, &err);
        }

        debug!(prefix, started_at_unix_ns, "session artifacts open");
        Ok(Self {
            input,
            output,
            events,
            started_at_unix_ns,
            epoch,
        })
    }

    /// Monotonic nanoseconds since session start.
    pub fn now_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Wall-clock session start, nanoseconds since the Unix epoch.
    pub fn started_at_unix_ns(&self) -> u64 {
        self.started_at_unix_ns
    }

    /// Bytes committed to the input stream so far.
    pub fn input_len(&self) -> u64 {
        self.input.len
    }

    /// Bytes committed to the output stream so far.
    pub fn output_len(&self) -> u64 {
        self.output.len
    }

    /// Commits one read's worth of keystroke bytes.
    pub fn append_input(&mut self, bytes: &[u8]) -> Result<(), WriterError> {
        let t_ns = self.now_ns();
        self.input.commit(bytes, t_ns)
    }

    /// Commits one read's worth of PTY output bytes.
    pub fn append_output(&mut self, bytes: &[u8]) -> Result<(), WriterError> {
        let t_ns = self.now_ns();
        self.output.commit(bytes, t_ns)
    }

    /// Records a geometry change at the current end of the output stream.
    ///
    /// The caller must have drained and committed all readable output first
    /// so the recorded `stream_offset` names the first post-resize byte.
    pub fn record_resize(&mut self, cols: u16, rows: u16) {
        let event = EventLine::Resize(ResizeEvent::output(
            self.now_ns(),
            self.output.len,
            cols,
            rows,
        ));
        let Some((path, file)) = &mut self.events else {
            return;
        };
        if let Err(err) = file.write_all(event.to_jsonl().as_bytes()) {
            sidecar_warning(path, &err);
            self.events = None;
        }
    }
}
