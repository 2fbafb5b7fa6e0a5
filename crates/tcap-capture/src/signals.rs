//! Async-signal-safe control plane.
//!
//! Handlers do the minimum a handler may do: store into a static record of
//! atomics and, where the loop could be parked in `poll`, write one byte to
//! a non-blocking self-pipe so the suspension completes. Everything else is
//! deferred to the event loop. `SA_RESTART` is intentionally not set; an
//! interrupted `poll` is how a resize delivered mid-suspension gets serviced
//! before the next read.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use nix::fcntl::OFlag;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use nix::unistd::{Pid, pipe2};
use tracing::debug;

struct SignalState {
    shutdown: AtomicBool,
    winch_pending: AtomicBool,
    child_exited: AtomicBool,
    child_status: AtomicI32,
    child_pid: AtomicI32,
    wake_fd: AtomicI32,
}

static STATE: SignalState = SignalState {
    shutdown: AtomicBool::new(false),
    winch_pending: AtomicBool::new(false),
    child_exited: AtomicBool::new(false),
    child_status: AtomicI32::new(0),
    child_pid: AtomicI32::new(-1),
    wake_fd: AtomicI32::new(-1),
};

/// Writes the wake byte. Only async-signal-safe calls.
fn wake() {
    let fd = STATE.wake_fd.load(Ordering::Acquire);
    if fd >= 0 {
        let byte = 1u8;
        unsafe { libc::write(fd, std::ptr::from_ref(&byte).cast(), 1) };
    }
}

extern "C" fn on_signal(signo: libc::c_int) {
    match signo {
        libc::SIGWINCH => {
            STATE.winch_pending.store(true, Ordering::Release);
            wake();
        }
        libc::SIGCHLD => {
            let pid = STATE.child_pid.load(Ordering::Acquire);
            if pid > 0 {
                let mut status: libc::c_int = 0;
                let reaped = unsafe { libc::waitpid(pid, &raw mut status, libc::WNOHANG) };
                if reaped == pid {
                    STATE.child_status.store(status, Ordering::Release);
                    STATE.child_exited.store(true, Ordering::Release);
                    STATE.shutdown.store(true, Ordering::Release);
                    wake();
                }
            }
        }
        _ => {
            // SIGINT, SIGTERM, SIGQUIT.
            STATE.shutdown.store(true, Ordering::Release);
            wake();
        }
    }
}

/// The self-pipe whose read end sits in the poll set.
pub struct WakePipe {
    read: OwnedFd,
    write: OwnedFd,
}

impl WakePipe {
    /// Creates the pipe, non-blocking on both ends.
    pub fn new() -> nix::Result<Self> {
        let (read, write) = pipe2(OFlag::O_NONBLOCK | OFlag::O_CLOEXEC)?;
        Ok(Self { read, write })
    }

    pub fn read_fd(&self) -> RawFd {
        self.read.as_raw_fd()
    }

    pub fn write_fd(&self) -> RawFd {
        self.write.as_raw_fd()
    }

    /// Empties the pipe after a wakeup.
    pub fn drain(&self) {
        let mut buf = [0u8; 64];
        while matches!(
            nix::unistd::read(self.read.as_raw_fd(), &mut buf),
            Ok(1..)
        ) {}
    }
}

/// Installs the handlers and publishes the child pid and wake descriptor to
/// them. Call once, after the fork and the pipe exist.
pub fn install(child: Pid, wake: &WakePipe) -> nix::Result<()> {
    STATE.child_pid.store(child.as_raw(), Ordering::Release);
    STATE.wake_fd.store(wake.write_fd(), Ordering::Release);

    let action = SigAction::new(
        SigHandler::Handler(on_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for signal in [
        Signal::SIGINT,
        Signal::SIGTERM,
        Signal::SIGQUIT,
        Signal::SIGCHLD,
        Signal::SIGWINCH,
    ] {
        unsafe { sigaction(signal, &action)? };
    }
    debug!(child = child.as_raw(), "signal handlers installed");
    Ok(())
}

/// True once any handler has requested shutdown.
pub fn shutdown_requested() -> bool {
    STATE.shutdown.load(Ordering::Acquire)
}

/// Lets the loop itself initiate shutdown (master EOF, fatal write).
pub fn request_shutdown() {
    STATE.shutdown.store(true, Ordering::Release);
}

/// Detaches the self-pipe from the handlers. Must happen before the pipe
/// closes, or a late signal could write into a reused descriptor.
pub fn disarm_wake() {
    STATE.wake_fd.store(-1, Ordering::Release);
}

/// Consumes a pending window-change notification.
pub fn take_winch() -> bool {
    STATE.winch_pending.swap(false, Ordering::AcqRel)
}

/// True when a window-change notification is pending.
pub fn winch_pending() -> bool {
    STATE.winch_pending.load(Ordering::Acquire)
}

/// Raw `waitpid` status stored by the SIGCHLD handler, if it won the reap.
pub fn child_exit_status() -> Option<i32> {
    if STATE.child_exited.load(Ordering::Acquire) {
        Some(STATE.child_status.load(Ordering::Acquire))
    } else {
        None
    }
}

/// Resets all control-plane state. Test support; a capture process installs
/// exactly one session.
#[cfg(test)]
pub fn reset_for_tests() {
    STATE.shutdown.store(false, Ordering::Release);
    STATE.winch_pending.store(false, Ordering::Release);
    STATE.child_exited.store(false, Ordering::Release);
    STATE.child_status.store(0, Ordering::Release);
    STATE.child_pid.store(-1, Ordering::Release);
    STATE.wake_fd.store(-1, Ordering::Release);
}
