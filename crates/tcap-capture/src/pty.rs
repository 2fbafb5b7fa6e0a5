//! PTY allocation and the child side of the bridge.
//!
//! The parent allocates the master, performs the grant/unlock handshake,
//! learns the slave path, and forks. The child builds itself a controlling
//! terminal out of the slave: new session, open, `TIOCSCTTY`, dup onto the
//! standard descriptors, exec. Nothing in the child path returns; on any
//! failure it `_exit(1)`s, which the parent observes as an immediately dead
//! child.

use std::ffi::CString;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};

use nix::fcntl::OFlag;
use nix::pty::{Winsize, grantpt, posix_openpt, ptsname_r, unlockpt};
use nix::unistd::{ForkResult, Pid, dup2, execvp, fork, setsid};
use thiserror::Error;
use tracing::debug;

use crate::term;

nix::ioctl_write_int_bad!(tiocsctty, libc::TIOCSCTTY);

/// PTY setup failure, observed in the parent.
#[derive(Debug, Error)]
pub enum PtyError {
    /// `posix_openpt` failed.
    #[error("cannot allocate pty master: {0}")]
    Allocate(#[source] nix::Error),

    /// Grant/unlock/name lookup failed.
    #[error("pty handshake failed: {0}")]
    Handshake(#[source] nix::Error),

    /// `fork` failed.
    #[error("cannot fork child: {0}")]
    Fork(#[source] nix::Error),

    /// An argv element contains a NUL byte and cannot be exec'd.
    #[error("command contains a NUL byte")]
    NulInCommand,
}

/// A live PTY bridge: the supervisor's master descriptor and the child
/// running on the slave side.
pub struct PtySession {
    /// Master descriptor; the only handle the parent keeps.
    pub master: OwnedFd,

    /// The child's process id.
    pub child: Pid,

    /// Slave device path, kept for diagnostics.
    pub slave_path: PathBuf,
}

/// Allocates a PTY sized to `size`, forks, and execs `argv` on the slave.
pub fn spawn(argv: &[String], size: &Winsize) -> Result<PtySession, PtyError> {
    let master = posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY).map_err(PtyError::Allocate)?;
    grantpt(&master).map_err(PtyError::Handshake)?;
    unlockpt(&master).map_err(PtyError::Handshake)?;
    let slave_path = PathBuf::from(ptsname_r(&master).map_err(PtyError::Handshake)?);

    let master_fd = master.as_raw_fd();
    let _ = term::set_window_size(master_fd, size);

    // Exec arguments are prepared before the fork; the child must not
    // allocate.
    let c_argv: Vec<CString> = argv
        .iter()
        .map(|arg| CString::new(arg.as_str()))
        .collect::<Result<_, _>>()
        .map_err(|_| PtyError::NulInCommand)?;

    match unsafe { fork() }.map_err(PtyError::Fork)? {
        ForkResult::Child => child_main(master_fd, &slave_path, &c_argv),
        ForkResult::Parent { child } => {
            debug!(
                child = child.as_raw(),
                slave = %slave_path.display(),
                "pty bridge established"
            );
            let master = unsafe { OwnedFd::from_raw_fd(master.into_raw_fd()) };
            Ok(PtySession {
                master,
                child,
                slave_path,
            })
        }
    }
}

fn child_main(master_fd: RawFd, slave_path: &Path, argv: &[CString]) -> ! {
    let _ = child_setup(master_fd, slave_path, argv);
    // Reached only when setup or exec failed.
    unsafe { libc::_exit(1) }
}

fn child_setup(master_fd: RawFd, slave_path: &Path, argv: &[CString]) -> nix::Result<()> {
    // The master belongs to the supervisor.
    let _ = nix::unistd::close(master_fd);

    setsid()?;

    let slave = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(slave_path)
        .map_err(|_| nix::Error::EIO)?;
    let slave_fd = slave.as_raw_fd();

    // Adopt the slave as the controlling terminal of the new session.
    unsafe { tiocsctty(slave_fd, 0) }?;

    dup2(slave_fd, libc::STDIN_FILENO)?;
    dup2(slave_fd, libc::STDOUT_FILENO)?;
    dup2(slave_fd, libc::STDERR_FILENO)?;
    if slave_fd > libc::STDERR_FILENO {
        drop(slave);
    } else {
        // The descriptor is one of the standard trio now; release ownership
        // without closing it.
        let _ = slave.into_raw_fd();
    }

    if std::env::var_os("TERM").is_none() {
        unsafe { std::env::set_var("TERM", "xterm-256color") };
    }

    execvp(&argv[0], argv)?;
    Ok(())
}
