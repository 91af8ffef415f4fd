//! Wall-clock synchronised playback of a packet stream.
//!
//! # Catch-up scan
//!
//! Each [`PlaybackController::update`] advances the playhead and consumes
//! every packet whose timestamp it has passed, but hands only the most recent
//! one to the sink. Playback therefore never builds a backlog: a slow host
//! skips frames instead of falling behind.
//!
//! ```text
//!   packets:   0.0    1.0    2.0    3.0
//!   update(3.5) ─────────────────────────▶ playhead 3.5
//!              read   read   read   read+deliver
//! ```

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::SharedClock;
use crate::error::Result;
use crate::packet::PacketLayout;
use crate::reader::StreamReader;
use crate::Packet;

/// Receives decoded-ready payloads during playback.
pub trait FrameSink {
    fn deliver(&mut self, timestamp: f32, payload: &[u8]);
}

impl<F> FrameSink for F
where
    F: FnMut(f32, &[u8]),
{
    fn deliver(&mut self, timestamp: f32, payload: &[u8]) {
        self(timestamp, payload)
    }
}

/// Collects every delivered frame.
impl FrameSink for Vec<Packet> {
    fn deliver(&mut self, timestamp: f32, payload: &[u8]) {
        self.push(Packet::new(timestamp, payload));
    }
}

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackState {
    /// Rate forced to 0, playhead does not advance
    #[default]
    Stopped,
    Playing,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Stopped => write!(f, "stopped"),
            PlaybackState::Playing => write!(f, "playing"),
        }
    }
}

/// Playback status information
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackStatus {
    pub state: PlaybackState,
    /// Playhead in seconds
    pub play_head: f32,
    pub rate: f32,
    pub loop_playback: bool,
    /// Frames delivered since the last rewind
    pub frame_count: u64,
    /// Timestamp of the next packet, `None` at end of data
    pub next_timestamp: Option<f32>,
}

/// Drives a [`StreamReader`] with a virtual playhead and delivers at most
/// one payload per update to a [`FrameSink`].
pub struct PlaybackController<S, R: Read + Seek = BufReader<File>> {
    reader: StreamReader<R>,
    sink: S,
    clock: SharedClock,
    state: PlaybackState,
    play_head: f32,
    rate: f32,
    loop_playback: bool,
    frame_count: u64,
    /// Clock reading at the previous tick
    last_tick: Option<Duration>,
    /// Scan buffer and most recent payload of the current scan, swapped
    scratch: Vec<u8>,
    retained: Vec<u8>,
}

impl<S: FrameSink> PlaybackController<S, BufReader<File>> {
    /// Open a stream file for playback, initially stopped.
    pub fn open(
        path: impl AsRef<Path>,
        layout: PacketLayout,
        sink: S,
        clock: SharedClock,
    ) -> Result<Self> {
        Ok(Self::new(StreamReader::open(path, layout)?, sink, clock))
    }
}

impl<S: FrameSink, R: Read + Seek> PlaybackController<S, R> {
    pub fn new(reader: StreamReader<R>, sink: S, clock: SharedClock) -> Self {
        Self {
            reader,
            sink,
            clock,
            state: PlaybackState::Stopped,
            play_head: 0.0,
            rate: 0.0,
            loop_playback: false,
            frame_count: 0,
            last_tick: None,
            scratch: Vec::new(),
            retained: Vec::new(),
        }
    }

    /// Start (or keep) playing at rate 1.
    pub fn play(&mut self) {
        self.state = PlaybackState::Playing;
        self.rate = 1.0;
        self.last_tick = Some(self.clock.elapsed());
    }

    /// Stop; the playhead stays where it is.
    pub fn stop(&mut self) {
        self.state = PlaybackState::Stopped;
        self.rate = 0.0;
    }

    /// Back to the first packet without changing the playing state.
    pub fn rewind(&mut self) {
        self.play_head = 0.0;
        self.frame_count = 0;
        self.reader.rewind();
    }

    /// Move the playhead. Moving backwards (or to 0) rescans from the start.
    pub fn set_play_head(&mut self, time: f32) {
        let time = time.max(0.0);
        if time == 0.0 || time < self.play_head {
            self.rewind();
        }
        self.play_head = time;
    }

    /// Change the rate while playing. Returns `false` if ignored: the
    /// controller is stopped, or the rate is negative or not finite.
    pub fn set_rate(&mut self, rate: f32) -> bool {
        if self.state != PlaybackState::Playing || !rate.is_finite() || rate < 0.0 {
            return false;
        }
        self.rate = rate;
        true
    }

    pub fn set_loop(&mut self, loop_playback: bool) {
        self.loop_playback = loop_playback;
    }

    /// Advance by the clock time since the previous tick (or since `play`).
    pub fn tick(&mut self) {
        let now = self.clock.elapsed();
        let dt = now.saturating_sub(self.last_tick.unwrap_or(now));
        self.last_tick = Some(now);
        self.update(dt.as_secs_f32());
    }

    /// Advance the playhead by `dt * rate` and deliver the newest due packet.
    ///
    /// Never blocks beyond synchronous reads from the underlying stream.
    pub fn update(&mut self, dt: f32) {
        if self.state == PlaybackState::Playing && dt.is_finite() && dt > 0.0 {
            self.play_head += dt * self.rate;
        }

        let mut due = None;
        while self.play_head > self.reader.timestamp() {
            let timestamp = self.reader.timestamp();
            if self.reader.next_frame(&mut self.scratch) {
                std::mem::swap(&mut self.scratch, &mut self.retained);
                due = Some(timestamp);
                continue;
            }

            // End of data, truncated tail or read failure
            if !self.loop_playback {
                self.stop();
            }
            self.rewind();
            break;
        }

        if let Some(timestamp) = due {
            self.sink.deliver(timestamp, &self.retained);
            self.frame_count += 1;
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn is_looping(&self) -> bool {
        self.loop_playback
    }

    pub fn play_head(&self) -> f32 {
        self.play_head
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn status(&self) -> PlaybackStatus {
        PlaybackStatus {
            state: self.state,
            play_head: self.play_head,
            rate: self.rate,
            loop_playback: self.loop_playback,
            frame_count: self.frame_count,
            next_timestamp: self.reader.peek_timestamp(),
        }
    }

    pub fn reader(&self) -> &StreamReader<R> {
        &self.reader
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::StreamWriter;
    use std::io::Cursor;
    use std::sync::Arc;

    type TestController = PlaybackController<Vec<Packet>, Cursor<Vec<u8>>>;

    fn controller(packets: &[(f32, &[u8])]) -> (TestController, Arc<ManualClock>) {
        let mut writer = StreamWriter::new(Vec::new(), PacketLayout::Portable);
        for (timestamp, payload) in packets {
            writer.write(*timestamp, payload).unwrap();
        }
        let bytes = writer.into_inner().unwrap().unwrap();
        let reader = StreamReader::new(Cursor::new(bytes), PacketLayout::Portable).unwrap();

        let clock = Arc::new(ManualClock::new());
        let controller = PlaybackController::new(reader, Vec::new(), clock.clone());
        (controller, clock)
    }

    fn four_packets() -> (TestController, Arc<ManualClock>) {
        controller(&[(0.0, b"t0"), (1.0, b"t1"), (2.0, b"t2"), (3.0, b"t3")])
    }

    #[test]
    fn test_initial_state() {
        let (controller, _) = four_packets();
        assert_eq!(controller.state(), PlaybackState::Stopped);
        assert_eq!(controller.rate(), 0.0);
        assert_eq!(controller.play_head(), 0.0);
        assert_eq!(controller.frame_count(), 0);
    }

    #[test]
    fn test_play_and_stop_transitions() {
        let (mut controller, _) = four_packets();

        controller.play();
        assert!(controller.is_playing());
        assert_eq!(controller.rate(), 1.0);

        assert!(controller.set_rate(2.0));
        controller.play();
        assert_eq!(controller.rate(), 1.0);

        controller.stop();
        assert_eq!(controller.state(), PlaybackState::Stopped);
        assert_eq!(controller.rate(), 0.0);
        assert!(!controller.set_rate(2.0));
        assert_eq!(controller.rate(), 0.0);
    }

    #[test]
    fn test_stopped_playhead_does_not_advance() {
        let (mut controller, _) = four_packets();
        controller.update(1.5);

        assert_eq!(controller.play_head(), 0.0);
        assert!(controller.sink().is_empty());
    }

    #[test]
    fn test_catch_up_delivers_only_latest() {
        let (mut controller, _) = four_packets();
        controller.rewind();
        controller.play();
        controller.update(3.5);

        assert_eq!(controller.sink(), &vec![Packet::new(3.0, b"t3".to_vec())]);
    }

    #[test]
    fn test_one_delivery_per_tick() {
        let (mut controller, _) = four_packets();
        controller.play();

        controller.update(0.5);
        controller.update(1.0);
        controller.update(1.0);

        let timestamps: Vec<f32> = controller.sink().iter().map(|p| p.timestamp).collect();
        assert_eq!(timestamps, vec![0.0, 1.0, 2.0]);
        assert_eq!(controller.frame_count(), 3);
    }

    #[test]
    fn test_no_delivery_when_nothing_due() {
        let (mut controller, _) = four_packets();
        controller.play();
        controller.update(0.5);
        controller.update(0.25);

        assert_eq!(controller.sink().len(), 1);
        assert_eq!(controller.frame_count(), 1);
    }

    #[test]
    fn test_rate_scales_playhead() {
        let (mut controller, _) = four_packets();
        controller.play();
        assert!(controller.set_rate(2.0));
        controller.update(0.75);

        assert_eq!(controller.play_head(), 1.5);
        assert_eq!(controller.sink().last().unwrap().timestamp, 1.0);

        assert!(!controller.set_rate(-1.0));
        assert!(!controller.set_rate(f32::NAN));
        assert_eq!(controller.rate(), 2.0);
    }

    #[test]
    fn test_exhaustion_without_loop_stops_once() {
        let (mut controller, _) = four_packets();
        controller.play();

        for _ in 0..3 {
            controller.update(1.0);
        }
        assert!(controller.is_playing());

        controller.update(1.0);
        assert_eq!(controller.state(), PlaybackState::Stopped);
        assert_eq!(controller.play_head(), 0.0);
        assert_eq!(controller.sink().last().unwrap().timestamp, 3.0);

        let delivered = controller.sink().len();
        controller.update(1.0);
        controller.update(1.0);
        assert_eq!(controller.state(), PlaybackState::Stopped);
        assert_eq!(controller.play_head(), 0.0);
        assert_eq!(controller.sink().len(), delivered);
    }

    #[test]
    fn test_loop_wraps_and_keeps_playing() {
        let (mut controller, _) = four_packets();
        controller.set_loop(true);
        controller.play();

        for _ in 0..4 {
            controller.update(1.0);
        }
        assert!(controller.is_playing());
        assert_eq!(controller.play_head(), 0.0);
        assert_eq!(controller.reader().peek_timestamp(), Some(0.0));
        // The wrap tick still delivers the last packet it consumed
        assert_eq!(controller.sink().last().unwrap().timestamp, 3.0);
        assert_eq!(controller.frame_count(), 1);

        controller.update(0.5);
        assert!(controller.is_playing());
        let last = controller.sink().last().unwrap();
        assert_eq!(last.timestamp, 0.0);
        assert_eq!(last.payload, b"t0");
        assert_eq!(controller.frame_count(), 2);
    }

    #[test]
    fn test_rewind_resets_counters() {
        let (mut controller, _) = four_packets();
        controller.play();
        controller.update(2.5);
        assert_eq!(controller.frame_count(), 1);

        controller.rewind();
        assert!(controller.is_playing());
        assert_eq!(controller.play_head(), 0.0);
        assert_eq!(controller.frame_count(), 0);
        assert_eq!(controller.reader().peek_timestamp(), Some(0.0));
    }

    #[test]
    fn test_seek_backwards_rescans() {
        let (mut controller, _) = four_packets();
        controller.play();
        controller.update(2.5);
        assert_eq!(controller.reader().peek_timestamp(), Some(3.0));

        controller.set_play_head(1.5);
        assert_eq!(controller.play_head(), 1.5);
        assert_eq!(controller.reader().peek_timestamp(), Some(0.0));

        controller.update(0.0);
        assert_eq!(controller.sink().last().unwrap().timestamp, 1.0);
    }

    #[test]
    fn test_seek_forward_while_stopped() {
        let (mut controller, _) = four_packets();
        controller.set_play_head(2.5);
        controller.update(0.0);

        assert_eq!(controller.state(), PlaybackState::Stopped);
        assert_eq!(controller.sink(), &vec![Packet::new(2.0, b"t2".to_vec())]);
    }

    #[test]
    fn test_tick_uses_injected_clock() {
        let (mut controller, clock) = four_packets();
        clock.advance_secs(10.0);
        controller.play();

        clock.advance_secs(1.5);
        controller.tick();
        assert_eq!(controller.play_head(), 1.5);
        assert_eq!(controller.sink().last().unwrap().timestamp, 1.0);

        controller.tick();
        assert_eq!(controller.play_head(), 1.5);
    }

    #[test]
    fn test_empty_stream_stops() {
        let (mut controller, _) = controller(&[]);
        controller.play();
        controller.update(1.0);

        assert_eq!(controller.state(), PlaybackState::Stopped);
        assert!(controller.sink().is_empty());
    }

    #[test]
    fn test_closure_sink() {
        let (controller, _) = four_packets();
        let reader = controller.reader;
        let mut seen = Vec::new();
        let sink = |ts: f32, payload: &[u8]| seen.push((ts, payload.len()));
        {
            let mut controller = PlaybackController::new(reader, sink, Arc::new(ManualClock::new()));
            controller.play();
            controller.update(1.5);
        }
        assert_eq!(seen, vec![(1.0, 2)]);
    }

    #[test]
    fn test_status_snapshot() {
        let (mut controller, _) = four_packets();
        controller.set_loop(true);
        controller.play();
        controller.update(0.5);

        let status = controller.status();
        assert_eq!(status.state, PlaybackState::Playing);
        assert_eq!(status.play_head, 0.5);
        assert!(status.loop_playback);
        assert_eq!(status.frame_count, 1);
        assert_eq!(status.next_timestamp, Some(1.0));
    }
}
