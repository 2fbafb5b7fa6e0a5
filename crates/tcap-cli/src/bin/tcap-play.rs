//! Offline playback of a recorded session's output stream.

#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use tcap_core::{PlayerConfig, SessionPlayer};
use tracing_subscriber::EnvFilter;

/// Replay a capture recorded by `tcap`.
#[derive(Parser, Debug)]
#[command(name = "tcap-play", version, about)]
struct Args {
    /// Capture prefix the session was recorded under
    prefix: String,

    /// Speed multiplier (2.0 plays twice as fast)
    #[arg(long, default_value_t = 1.0)]
    speed: f32,

    /// Start playback this many milliseconds into the session
    #[arg(long, value_name = "MS")]
    start_at_ms: Option<u64>,

    /// Dump the whole stream without timing
    #[arg(long)]
    no_delay: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = PlayerConfig::default().with_speed(args.speed);
    if let Some(ms) = args.start_at_ms {
        config = config.with_start_at_ns(ms.saturating_mul(1_000_000));
    }
    if args.no_delay {
        config = config.with_instant();
    }

    let player = SessionPlayer::open(&args.prefix)
        .with_context(|| format!("cannot open capture '{}'", args.prefix))?
        .with_config(config);

    let stdout = std::io::stdout();
    player
        .replay(&mut stdout.lock())
        .context("replay interrupted")?;
    Ok(())
}
