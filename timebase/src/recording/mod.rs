//! Recording pipeline, playback driver and recordings directory.
//!
//! This module provides functionality to:
//! - Record frames from a producer to `.tbs` packet streams without blocking it
//! - Play streams back in step with wall-clock time on a tokio interval
//! - Manage recording files (list, rename, delete)
//!
//! ## Recording
//!
//! ```text
//! ┌──────────┐ submit_frame ┌─────────────┐ poll ┌───────────────┐
//! │ producer │─────────────▶│ Mailbox     │─────▶│ writer thread │──▶ FrameEncoder ──▶ StreamWriter
//! │ (any     │  never waits │ (one slot,  │      │ (wakes every  │
//! │  thread) │              │  overwrite) │      │ poll_interval)│
//! └──────────┘              └─────────────┘      └───────────────┘
//! ```

pub mod mailbox;
pub mod manager;
pub mod player;
pub mod recorder;
pub mod synthetic;

pub use mailbox::{Frame, Mailbox, PostOutcome};
pub use manager::{recordings_dir, ManagerError, RecordingInfo, RecordingManager};
pub use player::{run_playback, PlaybackOutcome, DEFAULT_TICK};
pub use recorder::{
    FrameEncoder, FrameProducer, FrameRecorder, Passthrough, RecorderConfig, RecorderError,
    RecordingState, RecordingStatus,
};
pub use synthetic::{run_synthetic, SyntheticStats};
