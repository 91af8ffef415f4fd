//! Single-slot, overwrite-on-full frame buffer.
//!
//! The mailbox is the only state shared between the producer and the writer
//! thread. It holds at most one undrained frame: posting while a frame is
//! pending replaces it, and the replaced frame is counted as dropped. Buffers
//! are swapped rather than reallocated, so a steady stream of frames of the
//! same size does not allocate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

/// A raw frame waiting to be encoded and written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    /// Seconds since the recording started
    pub timestamp: f32,
    pub data: Vec<u8>,
}

/// Result of [`Mailbox::post`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    /// The slot was empty
    Stored,
    /// An undrained frame was replaced and is lost
    Overwrote,
    /// The writer held the slot; this frame was skipped
    Contended,
}

impl PostOutcome {
    /// Whether some frame was lost by this post.
    pub fn dropped(&self) -> bool {
        !matches!(self, PostOutcome::Stored)
    }
}

#[derive(Debug, Default)]
struct Slot {
    frame: Frame,
    pending: bool,
}

/// Single-slot mailbox between one producer and one consumer.
#[derive(Debug, Default)]
pub struct Mailbox {
    slot: Mutex<Slot>,
    posted: AtomicU64,
    overwritten: AtomicU64,
    contended: AtomicU64,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `data` into the slot without waiting for the consumer.
    ///
    /// If the consumer currently holds the lock the frame is skipped
    /// instead of waiting.
    pub fn post(&self, timestamp: f32, data: &[u8]) -> PostOutcome {
        let mut slot = match self.slot.try_lock() {
            Ok(slot) => slot,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                self.contended.fetch_add(1, Ordering::Relaxed);
                return PostOutcome::Contended;
            }
        };

        let outcome = if slot.pending {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
            PostOutcome::Overwrote
        } else {
            PostOutcome::Stored
        };

        slot.frame.timestamp = timestamp;
        slot.frame.data.clear();
        slot.frame.data.extend_from_slice(data);
        slot.pending = true;
        self.posted.fetch_add(1, Ordering::Relaxed);

        outcome
    }

    /// Swap the pending frame into `frame`, returning `false` if none.
    ///
    /// `frame`'s old buffer goes back into the slot for reuse.
    pub fn take_into(&self, frame: &mut Frame) -> bool {
        let mut slot = self.lock();
        if !slot.pending {
            return false;
        }
        std::mem::swap(&mut slot.frame, frame);
        slot.pending = false;
        true
    }

    pub fn is_pending(&self) -> bool {
        self.lock().pending
    }

    /// Discard any pending frame and reset the counters.
    pub fn reset(&self) {
        self.lock().pending = false;
        self.posted.store(0, Ordering::Relaxed);
        self.overwritten.store(0, Ordering::Relaxed);
        self.contended.store(0, Ordering::Relaxed);
    }

    /// Frames accepted into the slot
    pub fn posted(&self) -> u64 {
        self.posted.load(Ordering::Relaxed)
    }

    /// Frames replaced before the consumer drained them
    pub fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }

    /// Frames skipped because the consumer held the slot
    pub fn contended(&self) -> u64 {
        self.contended.load(Ordering::Relaxed)
    }

    /// Total frames lost, overwritten or skipped.
    pub fn dropped(&self) -> u64 {
        self.overwritten() + self.contended()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hold the slot lock, simulating a consumer mid-drain.
    #[cfg(test)]
    pub(crate) fn hold(&self) -> impl Drop + '_ {
        self.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_post_and_take() {
        let mailbox = Mailbox::new();
        assert_eq!(mailbox.post(0.5, b"frame"), PostOutcome::Stored);
        assert!(mailbox.is_pending());

        let mut frame = Frame::default();
        assert!(mailbox.take_into(&mut frame));
        assert_eq!(frame.timestamp, 0.5);
        assert_eq!(frame.data, b"frame");
        assert!(!mailbox.is_pending());
        assert!(!mailbox.take_into(&mut frame));
    }

    #[test]
    fn test_second_post_overwrites() {
        let mailbox = Mailbox::new();
        mailbox.post(1.0, b"first");
        assert_eq!(mailbox.post(2.0, b"second"), PostOutcome::Overwrote);

        let mut frame = Frame::default();
        assert!(mailbox.take_into(&mut frame));
        assert_eq!(frame, Frame {
            timestamp: 2.0,
            data: b"second".to_vec()
        });
        assert!(!mailbox.take_into(&mut frame));
        assert_eq!(mailbox.posted(), 2);
        assert_eq!(mailbox.overwritten(), 1);
        assert_eq!(mailbox.dropped(), 1);
    }

    #[test]
    fn test_buffers_are_recycled() {
        let mailbox = Mailbox::new();
        let mut frame = Frame {
            timestamp: 0.0,
            data: Vec::with_capacity(4096),
        };
        let recycled = frame.data.as_ptr();

        mailbox.post(0.0, b"abc");
        assert!(mailbox.take_into(&mut frame));
        mailbox.post(1.0, b"def");

        let slot = mailbox.lock();
        assert_eq!(slot.frame.data.as_ptr(), recycled);
        assert_eq!(slot.frame.data, b"def");
    }

    #[test]
    fn test_post_skips_when_consumer_holds_slot() {
        let mailbox = Arc::new(Mailbox::new());
        mailbox.post(0.0, b"pending");

        let guard = mailbox.hold();
        let producer = {
            let mailbox = mailbox.clone();
            thread::spawn(move || mailbox.post(1.0, b"skipped"))
        };
        // Returns while the lock is still held
        assert_eq!(producer.join().unwrap(), PostOutcome::Contended);
        drop(guard);

        assert_eq!(mailbox.contended(), 1);
        let mut frame = Frame::default();
        assert!(mailbox.take_into(&mut frame));
        assert_eq!(frame.data, b"pending");
    }

    #[test]
    fn test_reset() {
        let mailbox = Mailbox::new();
        mailbox.post(0.0, b"a");
        mailbox.post(0.1, b"b");
        mailbox.reset();

        assert!(!mailbox.is_pending());
        assert_eq!(mailbox.posted(), 0);
        assert_eq!(mailbox.dropped(), 0);
    }
}
