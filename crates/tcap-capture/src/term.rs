//! Controlling-terminal plumbing: tty selection, window geometry, raw mode.

use std::io::{IsTerminal, stderr, stdin, stdout};
use std::os::fd::{BorrowedFd, RawFd};

use nix::pty::Winsize;
use nix::sys::termios::{self, SetArg, Termios};
use tracing::debug;

nix::ioctl_read_bad!(tiocgwinsz, libc::TIOCGWINSZ, libc::winsize);
nix::ioctl_write_ptr_bad!(tiocswinsz, libc::TIOCSWINSZ, libc::winsize);

/// Borrows a descriptor the caller knows outlives the call.
pub(crate) fn borrow_fd(fd: RawFd) -> BorrowedFd<'static> {
    unsafe { BorrowedFd::borrow_raw(fd) }
}

/// The supervisor's controlling terminal: the first of stdin, stdout,
/// stderr that is actually a terminal.
pub fn controlling_tty_fd() -> Option<RawFd> {
    if stdin().is_terminal() {
        Some(libc::STDIN_FILENO)
    } else if stdout().is_terminal() {
        Some(libc::STDOUT_FILENO)
    } else if stderr().is_terminal() {
        Some(libc::STDERR_FILENO)
    } else {
        None
    }
}

/// Reads the current window geometry of a terminal descriptor.
pub fn window_size(fd: RawFd) -> Option<Winsize> {
    let mut size = Winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    match unsafe { tiocgwinsz(fd, &raw mut size) } {
        Ok(_) if size.ws_col > 0 && size.ws_row > 0 => Some(size),
        _ => None,
    }
}

/// Applies a window geometry to the PTY master.
pub fn set_window_size(fd: RawFd, size: &Winsize) -> nix::Result<()> {
    unsafe { tiocswinsz(fd, std::ptr::from_ref(size)) }?;
    Ok(())
}

/// Geometry to use when no terminal is available: `COLUMNS`/`LINES` from
/// the environment, then 80×24.
pub fn fallback_window_size() -> Winsize {
    let cols = std::env::var("COLUMNS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(80);
    let rows = std::env::var("LINES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(24);
    Winsize {
        ws_row: rows,
        ws_col: cols,
        ws_xpixel: 0,
        ws_ypixel: 0,
    }
}

/// Scoped raw mode: captures the terminal attributes on entry and restores
/// them when dropped, on every exit path including panics.
pub struct RawModeGuard {
    fd: RawFd,
    saved: Termios,
}

impl RawModeGuard {
    /// Switches `fd` to raw mode.
    pub fn enter(fd: RawFd) -> nix::Result<Self> {
        let saved = termios::tcgetattr(borrow_fd(fd))?;
        let mut raw = saved.clone();
        termios::cfmakeraw(&mut raw);
        termios::tcsetattr(borrow_fd(fd), SetArg::TCSANOW, &raw)?;
        debug!(fd, "terminal switched to raw mode");
        Ok(Self { fd, saved })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = termios::tcsetattr(borrow_fd(self.fd), SetArg::TCSANOW, &self.saved);
        debug!(fd = self.fd, "terminal attributes restored");
    }
}
