//! Capture lifecycle and the relay event loop.
//!
//! Single-threaded by design: the only suspension point is the `poll` call
//! over at most three descriptors (controlling terminal, PTY master,
//! self-pipe). Signal handlers communicate with the loop exclusively through
//! the flags in [`crate::signals`]; all file handles and buffered I/O belong
//! to the loop.

use std::io::IsTerminal;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::pty::Winsize;
use nix::sys::signal::{Signal, kill, killpg};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use tcap_core::{SessionWriter, WriterError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{self, CaptureConfig, ConfigError};
use crate::pty::{self, PtyError};
use crate::signals::{self, WakePipe};
use crate::term::{self, RawModeGuard};

/// Keystroke reads are deliberately small; a human cannot outrun this.
const STDIN_READ_MAX: usize = 1024;
const MASTER_READ_MAX: usize = 4096;

/// Build identity baked in by CI, absent for local builds.
const BUILD_GIT_SHA: Option<&str> = option_env!("TCAP_GIT_SHA");

static TEARDOWN_RAN: AtomicBool = AtomicBool::new(false);

/// Observer flag: true once teardown has completed at least once.
pub fn teardown_has_run() -> bool {
    TEARDOWN_RAN.load(Ordering::Acquire)
}

/// Fatal capture failure.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The configuration was rejected before any side effect.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// PTY allocation or fork failed.
    #[error(transparent)]
    Pty(#[from] PtyError),

    /// A raw capture stream failed.
    #[error(transparent)]
    Writer(#[from] WriterError),

    /// The self-pipe could not be created.
    #[error("cannot create self-pipe: {0}")]
    WakePipe(#[source] nix::Error),

    /// Signal handlers could not be installed.
    #[error("cannot install signal handlers: {0}")]
    Signals(#[source] nix::Error),

    /// The multiplexer failed with something other than an interrupt.
    #[error("descriptor multiplexing failed: {0}")]
    Poll(#[source] nix::Error),

    /// Reading the PTY master failed unrecoverably.
    #[error("read from pty master failed: {0}")]
    MasterRead(#[source] nix::Error),

    /// Writing keystrokes to the PTY master failed after retries.
    #[error("write to pty master failed: {0}")]
    MasterWrite(#[source] nix::Error),

    /// Reading the controlling terminal failed unrecoverably.
    #[error("read from terminal failed: {0}")]
    TerminalRead(#[source] nix::Error),

    /// Writing output to the user terminal failed after retries.
    #[error("write to terminal failed: {0}")]
    TerminalWrite(#[source] nix::Error),
}

/// How the child ended, as seen at teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChildDisposition {
    /// Exited on its own with this code.
    Exited(i32),
    /// Killed by this signal, not by us.
    Signaled(i32),
    /// Still alive at teardown; the supervisor ended it.
    Terminated,
}

/// Runs one capture session to completion and returns the process exit code
/// to use: the child's own status when it ended itself, zero when the
/// supervisor shut the session down.
pub fn run(config: &CaptureConfig) -> Result<i32, CaptureError> {
    config.validate()?;

    let tty_fd = term::controlling_tty_fd();
    let initial_size = tty_fd
        .and_then(term::window_size)
        .unwrap_or_else(term::fallback_window_size);

    let session = pty::spawn(&config.argv(), &initial_size)?;
    let mut supervisor = Supervisor {
        master: Some(session.master),
        child: session.child,
        tty_fd,
        last_size: initial_size,
        writer: None,
        wake: None,
        raw_guard: None,
        stdin_open: true,
        exit_code: 0,
    };

    let mut result = supervisor.start(config);
    if result.is_ok() {
        result = supervisor.relay();
    }
    let exit_code = supervisor.teardown();
    result.map(|()| exit_code)
}

struct Supervisor {
    master: Option<OwnedFd>,
    child: Pid,
    tty_fd: Option<RawFd>,
    last_size: Winsize,
    writer: Option<SessionWriter>,
    wake: Option<WakePipe>,
    raw_guard: Option<RawModeGuard>,
    stdin_open: bool,
    exit_code: i32,
}

impl Supervisor {
    /// Opens artifacts, enters raw mode, and arms the control plane. The
    /// child already runs; any failure here flows into teardown.
    fn start(&mut self, config: &CaptureConfig) -> Result<(), CaptureError> {
        let pid = std::process::id() as i32;
        let writer =
            SessionWriter::create(&config.log_prefix, pid, BUILD_GIT_SHA, build_git_dirty())?;
        if config.ws.any_set() {
            config::write_ws_stub(config, pid, writer.started_at_unix_ns());
        }
        self.writer = Some(writer);

        if std::io::stdin().is_terminal() {
            match RawModeGuard::enter(libc::STDIN_FILENO) {
                Ok(guard) => self.raw_guard = Some(guard),
                Err(err) => warn!(error = %err, "cannot enter raw mode, echo stays on"),
            }
        }

        let wake = WakePipe::new().map_err(CaptureError::WakePipe)?;
        signals::install(self.child, &wake).map_err(CaptureError::Signals)?;
        self.wake = Some(wake);

        // The session always opens with a geometry record at offset zero.
        let size = self.last_size;
        if let Some(writer) = &mut self.writer {
            writer.record_resize(size.ws_col, size.ws_row);
        }

        info!(
            child = self.child.as_raw(),
            prefix = %config.log_prefix,
            cols = size.ws_col,
            rows = size.ws_row,
            "capture session started"
        );
        Ok(())
    }

    /// The relay loop. Returns when shutdown is requested or the master
    /// reaches end of file; fatal errors propagate.
    fn relay(&mut self) -> Result<(), CaptureError> {
        loop {
            if signals::shutdown_requested() {
                return Ok(());
            }
            let Some(master_fd) = self.master.as_ref().map(AsRawFd::as_raw_fd) else {
                return Ok(());
            };
            let Some(wake_fd) = self.wake.as_ref().map(WakePipe::read_fd) else {
                return Ok(());
            };

            let mut fds = Vec::with_capacity(3);
            let stdin_idx = if self.stdin_open {
                fds.push(PollFd::new(
                    term::borrow_fd(libc::STDIN_FILENO),
                    PollFlags::POLLIN,
                ));
                Some(fds.len() - 1)
            } else {
                None
            };
            let master_idx = fds.len();
            fds.push(PollFd::new(term::borrow_fd(master_fd), PollFlags::POLLIN));
            let wake_idx = fds.len();
            fds.push(PollFd::new(term::borrow_fd(wake_fd), PollFlags::POLLIN));

            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => {}
                Err(Errno::EINTR) => {
                    if signals::winch_pending() {
                        self.service_winch()?;
                    }
                    continue;
                }
                Err(err) => return Err(CaptureError::Poll(err)),
            }

            let ready = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR;
            let revents =
                |i: usize| fds[i].revents().unwrap_or_else(PollFlags::empty);

            if revents(wake_idx).intersects(ready) {
                if let Some(wake) = &self.wake {
                    wake.drain();
                }
                if signals::winch_pending() {
                    self.service_winch()?;
                }
            }

            if let Some(i) = stdin_idx
                && revents(i).intersects(ready)
            {
                self.pump_stdin(master_fd)?;
            }

            if revents(master_idx).intersects(ready) && !self.pump_master()? {
                signals::request_shutdown();
                return Ok(());
            }
        }
    }

    /// One bounded stdin read, relayed to the master and committed to the
    /// input stream. Zero bytes means the user side is gone for good; the
    /// master keeps draining.
    fn pump_stdin(&mut self, master_fd: RawFd) -> Result<(), CaptureError> {
        let mut buf = [0u8; STDIN_READ_MAX];
        match nix::unistd::read(libc::STDIN_FILENO, &mut buf) {
            Ok(0) => {
                debug!("stdin reached end of file, continuing output-only");
                self.stdin_open = false;
            }
            Ok(n) => {
                write_all_fd(master_fd, &buf[..n]).map_err(CaptureError::MasterWrite)?;
                if let Some(writer) = &mut self.writer {
                    writer.append_input(&buf[..n])?;
                }
            }
            Err(Errno::EINTR | Errno::EAGAIN) => {}
            Err(err) => return Err(CaptureError::TerminalRead(err)),
        }
        Ok(())
    }

    /// One bounded master read, relayed to the user terminal and committed
    /// to the output stream. Returns false once the child's side is gone.
    fn pump_master(&mut self) -> Result<bool, CaptureError> {
        let Some(master_fd) = self.master.as_ref().map(AsRawFd::as_raw_fd) else {
            return Ok(false);
        };
        let mut buf = [0u8; MASTER_READ_MAX];
        match nix::unistd::read(master_fd, &mut buf) {
            Ok(0) => Ok(false),
            Ok(n) => {
                write_all_fd(libc::STDOUT_FILENO, &buf[..n])
                    .map_err(CaptureError::TerminalWrite)?;
                if let Some(writer) = &mut self.writer {
                    writer.append_output(&buf[..n])?;
                }
                Ok(true)
            }
            Err(Errno::EINTR | Errno::EAGAIN) => Ok(true),
            // The slave side closed; Linux reports the drained master as EIO.
            Err(Errno::EIO) => Ok(false),
            Err(err) => Err(CaptureError::MasterRead(err)),
        }
    }

    /// Services a pending window change: commit every byte the child has
    /// already produced, then record the event so its `stream_offset` names
    /// the first post-resize byte, then tell the PTY and the child.
    fn service_winch(&mut self) -> Result<(), CaptureError> {
        if let Some(wake) = &self.wake {
            wake.drain();
        }
        if !signals::take_winch() {
            return Ok(());
        }

        self.drain_readable_output()?;

        if let Some(size) = self.tty_fd.and_then(term::window_size) {
            self.last_size = size;
        }
        let size = self.last_size;
        if let Some(master) = &self.master {
            let _ = term::set_window_size(master.as_raw_fd(), &size);
        }
        if let Some(writer) = &mut self.writer {
            writer.record_resize(size.ws_col, size.ws_row);
        }
        self.signal_resize();
        debug!(cols = size.ws_col, rows = size.ws_row, "window change propagated");
        Ok(())
    }

    /// Delivers SIGWINCH to the PTY's foreground process group, falling back
    /// to the original child.
    fn signal_resize(&self) {
        let Some(master) = &self.master else { return };
        let pgrp = unsafe { libc::tcgetpgrp(master.as_raw_fd()) };
        if pgrp > 0 {
            let _ = killpg(Pid::from_raw(pgrp), Signal::SIGWINCH);
        } else {
            let _ = kill(self.child, Signal::SIGWINCH);
        }
    }

    /// Pumps the master until nothing is readable right now.
    fn drain_readable_output(&mut self) -> Result<(), CaptureError> {
        loop {
            let Some(master_fd) = self.master.as_ref().map(AsRawFd::as_raw_fd) else {
                return Ok(());
            };
            let mut fds = [PollFd::new(term::borrow_fd(master_fd), PollFlags::POLLIN)];
            match poll(&mut fds, PollTimeout::ZERO) {
                Ok(0) => return Ok(()),
                Ok(_) => {
                    let ready = PollFlags::POLLIN | PollFlags::POLLHUP;
                    let readable = fds[0]
                        .revents()
                        .unwrap_or_else(PollFlags::empty)
                        .intersects(ready);
                    if !readable {
                        return Ok(());
                    }
                    if !self.pump_master()? {
                        signals::request_shutdown();
                        return Ok(());
                    }
                }
                Err(Errno::EINTR) => {}
                Err(err) => return Err(CaptureError::Poll(err)),
            }
        }
    }

    /// Tears the session down: drain, restore the terminal, close the
    /// control plane and the master, settle the child, close artifacts,
    /// announce. Safe to call more than once.
    fn teardown(&mut self) -> i32 {
        if TEARDOWN_RAN.swap(true, Ordering::AcqRel) {
            return self.exit_code;
        }

        // Whatever the child managed to write still belongs in the capture.
        let _ = self.drain_readable_output();

        self.raw_guard = None;
        signals::disarm_wake();
        self.wake = None;
        self.master = None;

        let disposition = self.settle_child();

        let (bytes_in, bytes_out) = self
            .writer
            .as_ref()
            .map_or((0, 0), |w| (w.input_len(), w.output_len()));
        self.writer = None;

        self.exit_code = match disposition {
            ChildDisposition::Exited(code) => code,
            ChildDisposition::Signaled(signo) => 128 + signo,
            ChildDisposition::Terminated => 0,
        };

        let child_summary = match disposition {
            ChildDisposition::Exited(code) => format!("child exited {code}"),
            ChildDisposition::Signaled(signo) => format!("child killed by signal {signo}"),
            ChildDisposition::Terminated => "child terminated at shutdown".to_string(),
        };
        eprintln!(
            "TCAP: session complete: {bytes_out} bytes output, {bytes_in} bytes input ({child_summary})"
        );
        self.exit_code
    }

    /// Establishes how the child ended, terminating it if it is still
    /// running. The SIGCHLD handler may have won the reap already.
    fn settle_child(&mut self) -> ChildDisposition {
        if let Some(raw) = signals::child_exit_status() {
            return decode_status(raw);
        }
        match waitpid(self.child, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(_, code)) => return ChildDisposition::Exited(code),
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                return ChildDisposition::Signaled(signal as i32);
            }
            Ok(_) => {}
            Err(_) => {
                // Raced with the handler; it stored what it saw.
                return signals::child_exit_status()
                    .map_or(ChildDisposition::Terminated, decode_status);
            }
        }

        debug!(child = self.child.as_raw(), "terminating still-running child");
        let _ = kill(self.child, Signal::SIGTERM);
        for _ in 0..50 {
            match waitpid(self.child, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => std::thread::sleep(Duration::from_millis(10)),
                Ok(_) | Err(_) => return ChildDisposition::Terminated,
            }
        }
        warn!(child = self.child.as_raw(), "child ignored SIGTERM, killing");
        let _ = kill(self.child, Signal::SIGKILL);
        let _ = waitpid(self.child, None);
        ChildDisposition::Terminated
    }
}

fn build_git_dirty() -> Option<bool> {
    option_env!("TCAP_GIT_DIRTY").map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Decodes a raw `waitpid` status stored by the signal handler.
fn decode_status(raw: i32) -> ChildDisposition {
    if libc::WIFEXITED(raw) {
        ChildDisposition::Exited(libc::WEXITSTATUS(raw))
    } else if libc::WIFSIGNALED(raw) {
        ChildDisposition::Signaled(libc::WTERMSIG(raw))
    } else {
        ChildDisposition::Exited(1)
    }
}

/// Short-write tolerant write: retries interrupts, loops until every byte is
/// consumed or the descriptor fails for real.
fn write_all_fd(fd: RawFd, mut buf: &[u8]) -> nix::Result<()> {
    while !buf.is_empty() {
        match nix::unistd::write(term::borrow_fd(fd), buf) {
            Ok(0) => return Err(Errno::EIO),
            Ok(n) => buf = &buf[n..],
            Err(Errno::EINTR) => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
