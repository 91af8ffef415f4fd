//! # Timebase Core
//!
//! Timestamped packet streams: an append-only binary format, a forward-only
//! reader with one packet of read-ahead, and a playback state machine that
//! keeps a recording in step with wall-clock time.
//!
//! This crate is synchronous and has **no runtime dependencies**: no threads,
//! no async executor, no logging backend. The recording pipeline (writer
//! thread, single-slot mailbox) and the async playback driver live in the
//! `timebase` crate.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  timebase-core (synchronous, single-threaded)                │
//! │  ├── packet     (header layout & codec)                      │
//! │  ├── writer     (StreamWriter, append-only)                  │
//! │  ├── reader     (StreamReader, peek + rewind, scan)          │
//! │  ├── playback   (PlaybackController, catch-up scan)          │
//! │  └── clock      (Clock trait, injectable time)               │
//! └──────────────────────────────────────────────────────────────┘
//!                              ▲
//!               ┌──────────────┴──────────────┐
//!               │  timebase                   │
//!               │  (FrameRecorder, Mailbox,   │
//!               │   tokio playback driver)    │
//!               └─────────────────────────────┘
//! ```
//!
//! ## Example: Write and Read Back
//!
//! ```rust
//! use std::io::Cursor;
//! use timebase_core::{PacketLayout, StreamReader, StreamWriter};
//!
//! let mut writer = StreamWriter::new(Vec::new(), PacketLayout::Portable);
//! writer.write(0.0, b"a").unwrap();
//! writer.write(1.0, b"bb").unwrap();
//! let bytes = writer.into_inner().unwrap().unwrap();
//!
//! let mut reader = StreamReader::new(Cursor::new(bytes), PacketLayout::Portable).unwrap();
//! let mut payload = Vec::new();
//! assert_eq!(reader.timestamp(), 0.0);
//! assert!(reader.next_frame(&mut payload));
//! assert_eq!(payload, b"a");
//! ```
//!
//! ## Example: Playback
//!
//! ```rust,no_run
//! use timebase_core::{MonotonicClock, PacketLayout, PlaybackController};
//!
//! let sink = |timestamp: f32, payload: &[u8]| {
//!     println!("{timestamp:.3}s: {} bytes", payload.len());
//! };
//! let mut player = PlaybackController::open(
//!     "capture.tbs",
//!     PacketLayout::Portable,
//!     sink,
//!     MonotonicClock::shared(),
//! )
//! .unwrap();
//!
//! player.set_loop(true);
//! player.play();
//! loop {
//!     player.tick();
//!     std::thread::sleep(std::time::Duration::from_millis(16));
//! }
//! ```

pub mod clock;
pub mod error;
pub mod packet;
pub mod playback;
pub mod reader;
pub mod writer;

pub use clock::{Clock, ManualClock, MonotonicClock, SharedClock};
pub use error::{Result, StreamError};
pub use packet::{Packet, PacketHeader, PacketLayout};
pub use playback::{FrameSink, PlaybackController, PlaybackState, PlaybackStatus};
pub use reader::{scan, scan_reader, StreamEnd, StreamReader, StreamSummary};
pub use writer::StreamWriter;
