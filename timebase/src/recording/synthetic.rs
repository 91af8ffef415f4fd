//! Synthetic frame source for exercising the recorder without a sensor.

use log::{debug, trace};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::recorder::FrameProducer;

/// Totals reported by [`run_synthetic`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyntheticStats {
    /// Frames generated
    pub generated: u64,
    /// Frames the recorder accepted into its slot
    pub accepted: u64,
}

/// Fill `frame` with the counter pattern for frame `index`.
///
/// Byte `i` is `(index + i) mod 256`, so any frame can be checked for
/// corruption on its own.
pub fn fill_frame(index: u64, frame: &mut [u8]) {
    for (i, byte) in frame.iter_mut().enumerate() {
        *byte = index.wrapping_add(i as u64) as u8;
    }
}

/// Submit `size`-byte frames at `fps` until `duration` elapses or `cancel`
/// fires.
pub async fn run_synthetic(
    producer: FrameProducer,
    fps: f32,
    size: usize,
    duration: Duration,
    cancel: CancellationToken,
) -> SyntheticStats {
    let fps = if fps.is_finite() { fps.clamp(0.1, 10_000.0) } else { 30.0 };
    let period = Duration::from_secs_f32(1.0 / fps);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Saturates instead of overflowing for huge durations
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);

    debug!(
        "Synthetic producer: {} byte frames every {:?} for {:?}",
        size, period, duration
    );

    let mut stats = SyntheticStats::default();
    let mut frame = vec![0u8; size];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = &mut deadline => break,
            _ = interval.tick() => {
                fill_frame(stats.generated, &mut frame);
                if producer.submit_frame(&frame) {
                    stats.accepted += 1;
                } else if !producer.is_recording() {
                    debug!("Recorder stopped accepting frames");
                    break;
                } else {
                    trace!("Frame {} skipped", stats.generated);
                }
                stats.generated += 1;
            }
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::FrameRecorder;
    use tempfile::TempDir;
    use timebase_core::{PacketLayout, StreamReader};

    #[test]
    fn test_fill_frame_counter_pattern() {
        let mut frame = [0u8; 4];
        fill_frame(254, &mut frame);
        assert_eq!(frame, [254, 255, 0, 1]);
    }

    #[tokio::test]
    async fn test_records_counter_frames() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("synthetic.tbs");
        let mut recorder = FrameRecorder::passthrough();
        recorder.start(&path).unwrap();

        let stats = run_synthetic(
            recorder.producer(),
            200.0,
            16,
            Duration::from_millis(100),
            CancellationToken::new(),
        )
        .await;
        recorder.stop().unwrap();

        assert!(stats.generated > 0);
        assert!(stats.accepted <= stats.generated);

        let mut reader = StreamReader::open(&path, PacketLayout::Portable).unwrap();
        let mut previous = -1.0;
        let mut packets = 0;
        while let Some(packet) = reader.read_packet().unwrap() {
            assert_eq!(packet.payload.len(), 16);
            let mut expected = [0u8; 16];
            fill_frame(packet.payload[0] as u64, &mut expected);
            assert_eq!(packet.payload, expected);
            assert!(packet.timestamp >= previous);
            previous = packet.timestamp;
            packets += 1;
        }
        assert!(packets > 0);
        assert_eq!(packets, recorder.status().frames_written);
    }

    #[tokio::test]
    async fn test_extreme_arguments_do_not_panic() {
        let recorder = FrameRecorder::passthrough();
        let stats = run_synthetic(
            recorder.producer(),
            f32::NAN,
            1,
            Duration::MAX,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(stats, SyntheticStats::default());
    }

    #[tokio::test]
    async fn test_stops_when_recorder_is_idle() {
        let recorder = FrameRecorder::passthrough();
        let stats = run_synthetic(
            recorder.producer(),
            1000.0,
            8,
            Duration::from_secs(10),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(stats, SyntheticStats::default());
    }
}
