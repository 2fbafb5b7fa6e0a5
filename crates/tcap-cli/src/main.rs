//! # tcap
//!
//! Binary entry point for the terminal session recorder.
//!
//! This crate provides:
//! - CLI argument parsing using `clap`
//! - Logging initialisation
//! - Exit-status mapping: the child's status on natural exit, zero on
//!   supervisor-initiated shutdown, one on configuration or startup errors

#![deny(unsafe_code)]

use clap::{CommandFactory, Parser};
use tcap_capture::{CaptureConfig, CaptureError, WsOptions};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Record a terminal session to time-indexed capture logs.
///
/// Runs COMMAND (or your shell) under a pseudo-terminal, relaying your
/// keystrokes and its output while recording both to `<PREFIX>.input` and
/// `<PREFIX>.output` with seekable time indices alongside.
#[derive(Parser, Debug)]
#[command(name = "tcap", version, about)]
struct Args {
    /// Advertised bind address for the planned streaming server
    #[arg(long = "ws-listen", value_name = "HOST:PORT", overrides_with = "ws_listen")]
    ws_listen: Option<String>,

    /// Access token the streaming server would require
    #[arg(long = "ws-token", value_name = "TOKEN", overrides_with = "ws_token")]
    ws_token: Option<String>,

    /// Whether the streaming server would accept non-loopback clients
    #[arg(long = "ws-allow-remote", overrides_with = "ws_allow_remote")]
    ws_allow_remote: bool,

    /// Per-client send buffer of the streaming server, in bytes
    #[arg(long = "ws-send-buffer", value_name = "BYTES", overrides_with = "ws_send_buffer")]
    ws_send_buffer: Option<u64>,

    /// Path base for all capture artifacts
    prefix: String,

    /// Command to run under the PTY; defaults to $SHELL
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    // Configuration errors exit 1, so clap's default exit code 2 is
    // remapped here.
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return 1;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = CaptureConfig::new(args.prefix, args.command);
    config.ws = WsOptions {
        listen: args.ws_listen,
        token: args.ws_token,
        allow_remote: args.ws_allow_remote,
        send_buffer: args.ws_send_buffer,
    };
    debug!(?config, "starting capture");

    match tcap_capture::run(&config) {
        Ok(code) => code,
        Err(err @ CaptureError::Config(_)) => {
            eprintln!("tcap: {err}");
            eprintln!("{}", Args::command().render_usage());
            1
        }
        Err(err) => {
            eprintln!("tcap: {err}");
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_value_and_equals_forms() {
        let by_space =
            Args::try_parse_from(["tcap", "--ws-listen", "127.0.0.1:9000", "p"]).unwrap();
        let by_equals =
            Args::try_parse_from(["tcap", "--ws-listen=127.0.0.1:9000", "p"]).unwrap();
        assert_eq!(by_space.ws_listen, by_equals.ws_listen);
        assert_eq!(by_space.prefix, "p");
    }

    #[test]
    fn test_duplicate_flags_last_wins() {
        let args = Args::try_parse_from([
            "tcap",
            "--ws-listen",
            "127.0.0.1:1111",
            "--ws-listen",
            "127.0.0.1:2222",
            "p",
        ])
        .unwrap();
        assert_eq!(args.ws_listen.as_deref(), Some("127.0.0.1:2222"));
    }

    #[test]
    fn test_double_dash_ends_flags() {
        let args =
            Args::try_parse_from(["tcap", "--", "p", "sh", "-c", "echo hi"]).unwrap();
        assert_eq!(args.prefix, "p");
        assert_eq!(args.command, vec!["sh", "-c", "echo hi"]);
        assert!(args.ws_listen.is_none());
    }

    #[test]
    fn test_command_after_prefix() {
        let args = Args::try_parse_from(["tcap", "p", "echo", "hello"]).unwrap();
        assert_eq!(args.prefix, "p");
        assert_eq!(args.command, vec!["echo", "hello"]);
    }

    #[test]
    fn test_missing_prefix_rejected() {
        assert!(Args::try_parse_from(["tcap"]).is_err());
    }

    #[test]
    fn test_bad_numeric_value_rejected() {
        assert!(Args::try_parse_from(["tcap", "--ws-send-buffer", "lots", "p"]).is_err());
    }

    #[test]
    fn test_unknown_flag_rejected() {
        assert!(Args::try_parse_from(["tcap", "--ws-compress", "p"]).is_err());
    }
}
