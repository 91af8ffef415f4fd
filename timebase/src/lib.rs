//! # Timebase
//!
//! Record timestamped sensor frames and replay them in step with wall-clock
//! time.
//!
//! The file format, reader and playback state machine live in
//! [`timebase_core`]; this crate adds the runtime around them:
//!
//! - [`recording::FrameRecorder`] - writer thread fed through a single-slot
//!   mailbox, so producers never wait on disk I/O
//! - [`recording::run_playback`] - tokio driver ticking a
//!   [`timebase_core::PlaybackController`]
//! - [`recording::RecordingManager`] - the recordings directory
//! - [`config::Settings`] - persistent defaults
//!
//! ## Example: Record and Replay
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use timebase::recording::{run_playback, FrameRecorder};
//! use timebase_core::{MonotonicClock, PacketLayout, PlaybackController};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut recorder = FrameRecorder::passthrough();
//!     recorder.start("capture.tbs").unwrap();
//!     for i in 0..100u8 {
//!         recorder.submit_frame(&[i; 64]);
//!         tokio::time::sleep(Duration::from_millis(20)).await;
//!     }
//!     recorder.stop().unwrap();
//!
//!     let sink = |t: f32, frame: &[u8]| println!("{t:.3}s {} bytes", frame.len());
//!     let mut player =
//!         PlaybackController::open("capture.tbs", PacketLayout::Portable, sink, MonotonicClock::shared())
//!             .unwrap();
//!     player.play();
//!     run_playback(&mut player, Duration::from_millis(16), CancellationToken::new()).await;
//! }
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

pub mod config;
pub mod recording;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Clone, Debug)]
#[command(version, about)]
pub struct Cli {
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    /// Recordings directory (overrides settings)
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Settings file (default: per-user config directory)
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Use the host's native packet layout, for legacy captures
    #[arg(long, global = true, default_value_t = false)]
    pub native: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// List recordings, newest first
    List {
        /// Print as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Summarise a stream file
    Info {
        /// File name in the recordings directory, or a path
        file: PathBuf,
    },

    /// Play a stream, logging each delivered frame
    Play {
        /// File name in the recordings directory, or a path
        file: PathBuf,

        /// Playback rate (default from settings)
        #[arg(short, long)]
        rate: Option<f32>,

        /// Restart from the beginning at end of data
        #[arg(short, long = "loop", default_value_t = false)]
        loop_playback: bool,
    },

    /// Record synthetic frames through the recorder
    Record {
        /// Recording length in seconds
        #[arg(short, long, default_value = "5", value_parser = parse_seconds)]
        seconds: Duration,

        /// Frames per second submitted by the producer
        #[arg(short, long, default_value_t = 30.0)]
        fps: f32,

        /// Frame size in bytes
        #[arg(long, default_value_t = 1024)]
        size: usize,

        /// File name prefix
        #[arg(short, long)]
        name: Option<String>,
    },
}

/// Parse a positive number of seconds that fits in a [`Duration`].
pub fn parse_seconds(arg: &str) -> Result<Duration, String> {
    let seconds: f32 = arg.parse().map_err(|e| format!("{}", e))?;
    if seconds <= 0.0 {
        return Err(format!("must be positive, got {}", seconds));
    }
    Duration::try_from_secs_f32(seconds).map_err(|e| format!("{}", e))
}
