//! Frame types and the shared latest-frame slot.
//!
//! The capture thread and the detection loop never share a queue. They share
//! a single slot:
//!
//! - `Frame`: one decoded RGB8 image sample plus capture metadata.
//! - `FrameSlot`: mutex-protected single-slot buffer with overwrite-on-write
//!   and copy-on-read semantics. The newest frame always wins; readers get a
//!   clone and hold no lock while processing.

use std::sync::Mutex;
use std::time::Instant;

/// One decoded frame. Pixel data is tightly packed RGB8, row-major.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Raw pixel data, `width * height * 3` bytes.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonically increasing capture sequence number.
    pub seq: u64,
    /// Monotonic capture instant.
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, seq: u64) -> Self {
        debug_assert_eq!(data.len(), (width as usize) * (height as usize) * 3);
        Self {
            data,
            width,
            height,
            seq,
            captured_at: Instant::now(),
        }
    }

    /// Byte length of the pixel buffer.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Age of this frame relative to now.
    pub fn age(&self) -> std::time::Duration {
        self.captured_at.elapsed()
    }
}

// ----------------------------------------------------------------------------
// FrameSlot: single-slot latest-frame buffer
// ----------------------------------------------------------------------------

/// Single-slot buffer holding the most recent frame.
///
/// `publish` replaces the current frame unconditionally; there is no backlog
/// and no queue. `snapshot` clones the current frame out from under the lock,
/// so a reader never observes a partially written frame and never blocks the
/// writer beyond the clone.
#[derive(Default)]
pub struct FrameSlot {
    slot: Mutex<Option<Frame>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Publish a frame, replacing whatever was there. Newest frame wins.
    pub fn publish(&self, frame: Frame) {
        let mut guard = self.lock();
        *guard = Some(frame);
    }

    /// Clone out the most recent frame, or `None` before the first capture.
    pub fn snapshot(&self) -> Option<Frame> {
        self.lock().clone()
    }

    /// Sequence number of the current frame, if any.
    pub fn latest_seq(&self) -> Option<u64> {
        self.lock().as_ref().map(|frame| frame.seq)
    }

    /// Drop the current frame, returning the slot to its pre-capture state.
    pub fn clear(&self) {
        let mut guard = self.lock();
        *guard = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Frame>> {
        // The slot only ever holds a fully constructed frame, so a poisoned
        // lock still guards a coherent value.
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
