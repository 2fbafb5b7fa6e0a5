//! Configuration intake for a capture run.
//!
//! The supervisor takes an already-parsed configuration record; argument
//! parsing lives with the binary. Validation happens before any side effect,
//! so a bad configuration never forks, opens, or truncates anything.

use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

/// Rejected configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The capture prefix is empty.
    #[error("capture prefix must not be empty")]
    EmptyPrefix,

    /// A transport buffer size of zero can never carry a frame.
    #[error("send buffer size must be positive")]
    ZeroSendBuffer,
}

/// Placeholders for the planned streaming transport.
///
/// The supervisor only checks whether any of these is present; when one is,
/// it writes the `P.ws.json` stub next to the other artifacts so an external
/// server can pick the session up. No server runs here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WsOptions {
    /// `HOST:PORT` to eventually bind.
    pub listen: Option<String>,

    /// Access token for remote viewers.
    pub token: Option<String>,

    /// Whether non-loopback clients would be allowed.
    pub allow_remote: bool,

    /// Per-client send buffer, in bytes.
    pub send_buffer: Option<u64>,
}

impl WsOptions {
    /// True when any transport flag was given.
    pub fn any_set(&self) -> bool {
        self.listen.is_some()
            || self.token.is_some()
            || self.allow_remote
            || self.send_buffer.is_some()
    }
}

/// Everything a capture run needs to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Path base for all artifacts (`<prefix>.output`, `<prefix>.meta.json`, …).
    pub log_prefix: String,

    /// Command to run under the PTY; empty means the user's shell.
    pub command_and_args: Vec<String>,

    /// Transport placeholders.
    pub ws: WsOptions,
}

impl CaptureConfig {
    /// Creates a configuration with no transport options.
    pub fn new(log_prefix: impl Into<String>, command_and_args: Vec<String>) -> Self {
        Self {
            log_prefix: log_prefix.into(),
            command_and_args,
            ws: WsOptions::default(),
        }
    }

    /// Checks the record without touching the filesystem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_prefix.is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }
        if self.ws.send_buffer == Some(0) {
            return Err(ConfigError::ZeroSendBuffer);
        }
        Ok(())
    }

    /// The command argv, falling back to the configured interactive shell.
    pub fn argv(&self) -> Vec<String> {
        if self.command_and_args.is_empty() {
            let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
            vec![shell]
        } else {
            self.command_and_args.clone()
        }
    }
}

/// Writes the `P.ws.json` stub advertising this session to the (external)
/// transport server. Failure degrades like any other sidecar.
pub(crate) fn write_ws_stub(config: &CaptureConfig, pid: i32, started_at_unix_ns: u64) {
    let path = PathBuf::from(format!("{}.ws.json", config.log_prefix));
    let stub = serde_json::json!({
        "id": format!("{pid}-{started_at_unix_ns}"),
        "pid": pid,
        "prefix": config.log_prefix,
        "started_at_unix_ns": started_at_unix_ns,
        "listen": config.ws.listen,
        "allow_remote": config.ws.allow_remote,
        "send_buffer": config.ws.send_buffer,
        "has_token": config.ws.token.is_some(),
    });
    match std::fs::write(&path, stub.to_string()) {
        Ok(()) => debug!(path = %path.display(), "transport stub written"),
        Err(err) => {
            eprintln!("TCAP: warning: {}: {err}; continuing without it", path.display());
        }
    }
}
