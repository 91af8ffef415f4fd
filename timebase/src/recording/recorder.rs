//! Frame recorder - decouples a frame producer from a serial stream writer.
//!
//! ```text
//!  producer ──submit_frame──▶ Mailbox (1 slot) ──▶ writer thread ──▶ encoder ──▶ StreamWriter
//! ```
//!
//! The producer never waits on I/O. The writer thread wakes every
//! `poll_interval`, drains the slot and appends the encoded frame. Frames
//! submitted faster than the writer drains them overwrite each other.

use log::{debug, error, info, warn};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use thiserror::Error;
use timebase_core::{MonotonicClock, PacketLayout, SharedClock, StreamError, StreamWriter};

use super::mailbox::{Frame, Mailbox, PostOutcome};

/// Default writer poll interval, also the upper bound on stop latency
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Errors kept for `errors()`; further ones are only counted in the status
pub const ERROR_CHANNEL_CAPACITY: usize = 16;

/// Errors from the recording pipeline
#[derive(Error, Debug)]
pub enum RecorderError {
    /// Opening, writing or closing the stream failed
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// The encoder rejected a frame; the frame was skipped
    #[error("Failed to encode frame at {timestamp}s: {source}")]
    Encode {
        timestamp: f32,
        #[source]
        source: io::Error,
    },

    /// The writer thread could not be started
    #[error("Failed to spawn writer thread: {0}")]
    Spawn(#[source] io::Error),

    /// The writer thread panicked; the stream was not closed cleanly
    #[error("Writer thread panicked")]
    WriterPanicked,
}

/// Turns a raw frame into the payload bytes stored in the stream.
pub trait FrameEncoder: Send + 'static {
    fn encode(&mut self, frame: &[u8], out: &mut Vec<u8>) -> io::Result<()>;
}

impl<F> FrameEncoder for F
where
    F: FnMut(&[u8], &mut Vec<u8>) -> io::Result<()> + Send + 'static,
{
    fn encode(&mut self, frame: &[u8], out: &mut Vec<u8>) -> io::Result<()> {
        self(frame, out)
    }
}

/// Stores frames unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl FrameEncoder for Passthrough {
    fn encode(&mut self, frame: &[u8], out: &mut Vec<u8>) -> io::Result<()> {
        out.extend_from_slice(frame);
        Ok(())
    }
}

/// Recorder settings
#[derive(Debug, Clone, Copy)]
pub struct RecorderConfig {
    /// How often the writer thread checks the mailbox
    pub poll_interval: Duration,
    /// Header layout for new stream files
    pub layout: PacketLayout,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            layout: PacketLayout::Portable,
        }
    }
}

/// Recording state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordingState {
    Idle,
    Recording,
    /// The writer thread hit a write error and exited; `stop()` to reset
    Failed,
}

impl std::fmt::Display for RecordingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordingState::Idle => write!(f, "idle"),
            RecordingState::Recording => write!(f, "recording"),
            RecordingState::Failed => write!(f, "failed"),
        }
    }
}

/// Recording status information
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStatus {
    pub state: RecordingState,
    /// File being written (if any)
    pub path: Option<PathBuf>,
    /// Frames appended to the stream
    pub frames_written: u64,
    /// Frames lost to overwrite or lock contention
    pub frames_dropped: u64,
    /// Encode and write failures
    pub failures: u64,
    /// Seconds since `start`
    pub elapsed_seconds: f32,
}

/// State shared between the recorder, its producers and the writer thread
#[derive(Debug, Default)]
struct Shared {
    mailbox: Mailbox,
    recording: AtomicBool,
    failed: AtomicBool,
    /// Clock reading at `start`, in nanoseconds
    start_nanos: AtomicU64,
    frames_written: AtomicU64,
    failures: AtomicU64,
}

impl Shared {
    fn submit(&self, clock: &SharedClock, data: &[u8]) -> bool {
        if !self.recording.load(Ordering::SeqCst) {
            return false;
        }

        let start = Duration::from_nanos(self.start_nanos.load(Ordering::SeqCst));
        let timestamp = clock.elapsed().saturating_sub(start).as_secs_f32();

        match self.mailbox.post(timestamp, data) {
            PostOutcome::Stored => true,
            PostOutcome::Overwrote => {
                debug!("Frame at {:.3}s replaced an unwritten frame", timestamp);
                true
            }
            PostOutcome::Contended => {
                debug!("Frame at {:.3}s skipped, writer busy", timestamp);
                false
            }
        }
    }
}

/// Cloneable, `Send` handle for submitting frames from a producer thread.
#[derive(Clone)]
pub struct FrameProducer {
    shared: Arc<Shared>,
    clock: SharedClock,
}

impl FrameProducer {
    /// See [`FrameRecorder::submit_frame`].
    pub fn submit_frame(&self, data: &[u8]) -> bool {
        self.shared.submit(&self.clock, data)
    }

    pub fn is_recording(&self) -> bool {
        self.shared.recording.load(Ordering::SeqCst)
    }
}

type WriterOutput<E> = (StreamWriter<BufWriter<File>>, E);

struct WriterTask<E> {
    handle: JoinHandle<WriterOutput<E>>,
    stop_tx: Sender<()>,
    path: PathBuf,
}

/// Records frames from an asynchronous producer to a stream file.
pub struct FrameRecorder<E: FrameEncoder = Passthrough> {
    shared: Arc<Shared>,
    clock: SharedClock,
    config: RecorderConfig,
    /// Parked here while no writer thread owns it
    encoder: Option<E>,
    task: Option<WriterTask<E>>,
    error_tx: Sender<RecorderError>,
    error_rx: Receiver<RecorderError>,
}

impl FrameRecorder<Passthrough> {
    /// Recorder storing frames unchanged, on the wall clock.
    pub fn passthrough() -> Self {
        Self::new(Passthrough, MonotonicClock::shared(), RecorderConfig::default())
    }
}

impl<E: FrameEncoder> FrameRecorder<E> {
    pub fn new(encoder: E, clock: SharedClock, config: RecorderConfig) -> Self {
        let (error_tx, error_rx) = channel::bounded(ERROR_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared::default()),
            clock,
            config,
            encoder: Some(encoder),
            task: None,
            error_tx,
            error_rx,
        }
    }

    /// Open `path` and start the writer thread.
    ///
    /// An active recording is stopped first. Open failures are returned
    /// synchronously and leave the recorder idle.
    pub fn start(&mut self, path: impl AsRef<Path>) -> Result<(), RecorderError> {
        self.stop()?;

        let path = path.as_ref().to_path_buf();
        let writer = StreamWriter::open(&path, self.config.layout)?;
        let Some(encoder) = self.encoder.take() else {
            // Only a panicked writer thread loses the encoder
            return Err(RecorderError::WriterPanicked);
        };

        self.shared.mailbox.reset();
        self.shared.frames_written.store(0, Ordering::SeqCst);
        self.shared.failures.store(0, Ordering::SeqCst);
        self.shared.failed.store(false, Ordering::SeqCst);
        self.shared
            .start_nanos
            .store(self.clock.elapsed().as_nanos() as u64, Ordering::SeqCst);

        let (stop_tx, stop_rx) = channel::bounded(1);
        let shared = self.shared.clone();
        let errors = self.error_tx.clone();
        let poll_interval = self.config.poll_interval;

        // The flag must be up before the thread can observe a failure and clear it
        self.shared.recording.store(true, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name("timebase-writer".to_string())
            .spawn(move || writer_task(writer, encoder, shared, stop_rx, errors, poll_interval));

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.recording.store(false, Ordering::SeqCst);
                return Err(RecorderError::Spawn(e));
            }
        };

        info!("Started recording to {}", path.display());
        self.task = Some(WriterTask {
            handle,
            stop_tx,
            path,
        });
        Ok(())
    }

    /// Stop accepting frames, wait for the writer thread to drain and exit,
    /// then close the stream. A no-op when idle.
    pub fn stop(&mut self) -> Result<(), RecorderError> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };

        self.shared.recording.store(false, Ordering::SeqCst);
        // Disconnection also stops the thread, so a failed send is harmless
        let _ = task.stop_tx.send(());

        let (mut writer, encoder) = task.handle.join().map_err(|_| {
            error!("Writer thread for {} panicked", task.path.display());
            RecorderError::WriterPanicked
        })?;
        self.encoder = Some(encoder);

        // A failed writer has already reported its error; flushing the torn
        // buffer again would only repeat it
        if self.shared.failed.swap(false, Ordering::SeqCst) {
            if let Err(e) = writer.close() {
                debug!("Ignoring close error after write failure: {}", e);
            }
        } else {
            writer.close()?;
        }

        info!(
            "Recording finished: {} frames written, {} dropped, {} failures ({})",
            self.shared.frames_written.load(Ordering::SeqCst),
            self.shared.mailbox.dropped(),
            self.shared.failures.load(Ordering::SeqCst),
            task.path.display()
        );
        Ok(())
    }

    /// Start when `recording` is true, stop otherwise.
    pub fn set_recording(
        &mut self,
        recording: bool,
        path: impl AsRef<Path>,
    ) -> Result<(), RecorderError> {
        if recording {
            self.start(path)
        } else {
            self.stop()
        }
    }

    /// Hand a raw frame to the writer thread.
    ///
    /// Returns immediately. A no-op returning `false` when not recording.
    /// A frame still waiting in the slot is overwritten; if the writer is
    /// mid-swap this frame is skipped and `false` is returned.
    pub fn submit_frame(&self, data: &[u8]) -> bool {
        self.shared.submit(&self.clock, data)
    }

    /// Handle for producers on other threads.
    pub fn producer(&self) -> FrameProducer {
        FrameProducer {
            shared: self.shared.clone(),
            clock: self.clock.clone(),
        }
    }

    /// Whether frames are currently accepted.
    pub fn is_recording(&self) -> bool {
        self.shared.recording.load(Ordering::SeqCst)
    }

    /// Receiver of writer-thread failures.
    ///
    /// Holds at most [`ERROR_CHANNEL_CAPACITY`] undrained errors; the
    /// `failures` count in [`status`](Self::status) includes dropped ones.
    pub fn errors(&self) -> &Receiver<RecorderError> {
        &self.error_rx
    }

    pub fn frames_written(&self) -> u64 {
        self.shared.frames_written.load(Ordering::SeqCst)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.shared.mailbox.dropped()
    }

    pub fn status(&self) -> RecordingStatus {
        let state = if self.shared.failed.load(Ordering::SeqCst) {
            RecordingState::Failed
        } else if self.is_recording() {
            RecordingState::Recording
        } else {
            RecordingState::Idle
        };

        let start = Duration::from_nanos(self.shared.start_nanos.load(Ordering::SeqCst));
        let elapsed_seconds = match self.task {
            Some(_) => self.clock.elapsed().saturating_sub(start).as_secs_f32(),
            None => 0.0,
        };

        RecordingStatus {
            state,
            path: self.task.as_ref().map(|t| t.path.clone()),
            frames_written: self.frames_written(),
            frames_dropped: self.frames_dropped(),
            failures: self.shared.failures.load(Ordering::SeqCst),
            elapsed_seconds,
        }
    }
}

impl<E: FrameEncoder> Drop for FrameRecorder<E> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("Failed to stop recording: {}", e);
        }
    }
}

enum Drain {
    Idle,
    Written,
    Skipped,
    Fatal,
}

/// Writer thread body. Returns the writer and encoder for reuse.
fn writer_task<E: FrameEncoder>(
    mut writer: StreamWriter<BufWriter<File>>,
    mut encoder: E,
    shared: Arc<Shared>,
    stop_rx: Receiver<()>,
    errors: Sender<RecorderError>,
    poll_interval: Duration,
) -> WriterOutput<E> {
    let mut frame = Frame::default();
    let mut encoded = Vec::new();

    debug!("Writer thread started");

    loop {
        match stop_rx.recv_timeout(poll_interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        let drained = drain_once(
            &mut writer,
            &mut encoder,
            &shared,
            &errors,
            &mut frame,
            &mut encoded,
        );
        if let Drain::Fatal = drained {
            return (writer, encoder);
        }
    }

    // A frame posted just before stop() is still written
    if let Drain::Written = drain_once(
        &mut writer,
        &mut encoder,
        &shared,
        &errors,
        &mut frame,
        &mut encoded,
    ) {
        debug!("Drained final frame on stop");
    }

    debug!("Writer thread exiting");
    (writer, encoder)
}

fn drain_once<E: FrameEncoder>(
    writer: &mut StreamWriter<BufWriter<File>>,
    encoder: &mut E,
    shared: &Shared,
    errors: &Sender<RecorderError>,
    frame: &mut Frame,
    encoded: &mut Vec<u8>,
) -> Drain {
    if !shared.mailbox.take_into(frame) {
        return Drain::Idle;
    }

    encoded.clear();
    if let Err(source) = encoder.encode(&frame.data, encoded) {
        warn!("Skipping frame at {:.3}s: encode failed: {}", frame.timestamp, source);
        shared.failures.fetch_add(1, Ordering::SeqCst);
        let _ = errors.try_send(RecorderError::Encode {
            timestamp: frame.timestamp,
            source,
        });
        return Drain::Skipped;
    }

    if let Err(e) = writer.write(frame.timestamp, encoded) {
        // The stream may now end in a torn packet; readers treat it as a truncated tail
        error!("Failed to write frame at {:.3}s: {}", frame.timestamp, e);
        shared.failures.fetch_add(1, Ordering::SeqCst);
        shared.failed.store(true, Ordering::SeqCst);
        shared.recording.store(false, Ordering::SeqCst);
        let _ = errors.try_send(RecorderError::Stream(e));
        return Drain::Fatal;
    }

    shared.frames_written.fetch_add(1, Ordering::SeqCst);
    Drain::Written
}
