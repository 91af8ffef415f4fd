//! Playback driver - ticks a [`PlaybackController`] on a tokio interval.

use log::{debug, info};
use std::io::{Read, Seek};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use timebase_core::{FrameSink, PlaybackController};

/// Default tick interval (~60 Hz)
pub const DEFAULT_TICK: Duration = Duration::from_millis(16);

/// Why [`run_playback`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// The controller stopped on its own (end of a non-looping stream)
    Finished,
    /// The cancellation token fired
    Cancelled,
}

/// Tick `controller` every `tick` until it stops or `cancel` fires.
///
/// The controller should already be playing; a stopped controller returns
/// [`PlaybackOutcome::Finished`] after one tick.
pub async fn run_playback<S, R>(
    controller: &mut PlaybackController<S, R>,
    tick: Duration,
    cancel: CancellationToken,
) -> PlaybackOutcome
where
    S: FrameSink,
    R: Read + Seek,
{
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        "Playback started at {:.3}s, rate {}, loop {}",
        controller.play_head(),
        controller.rate(),
        controller.is_looping()
    );

    let outcome = loop {
        tokio::select! {
            _ = cancel.cancelled() => break PlaybackOutcome::Cancelled,
            _ = interval.tick() => {
                let before = controller.play_head();
                controller.tick();

                if !controller.is_playing() {
                    break PlaybackOutcome::Finished;
                }
                if controller.play_head() < before {
                    debug!("Playback wrapped to start after {:.3}s", before);
                }
            }
        }
    };

    info!(
        "Playback {}: {} frames delivered",
        match outcome {
            PlaybackOutcome::Finished => "finished",
            PlaybackOutcome::Cancelled => "cancelled",
        },
        controller.frame_count()
    );
    outcome
}
