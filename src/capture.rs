// Bounded hand-off between the camera and the compositor

use chrono::{DateTime, Utc};
use image::RgbImage;
use std::collections::VecDeque;
use tracing::{info, warn};

/// One frame from the camera. `sequence` is the capture order within the
/// session.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub sequence: u32,
    pub image: RgbImage,
    pub captured_at: DateTime<Utc>,
}

impl CapturedFrame {
    pub fn new(sequence: u32, image: RgbImage) -> Self {
        Self {
            sequence,
            image,
            captured_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum PushOutcome {
    Queued { now_full: bool },
    /// The buffer was already full; the item was discarded.
    Dropped,
}

/// Fixed-capacity FIFO. Neither push nor pop ever blocks or grows the
/// buffer.
#[derive(Debug)]
pub struct CaptureBuffer<T = CapturedFrame> {
    items: VecDeque<T>,
    capacity: usize,
    pushed: u64,
    popped: u64,
}

impl<T> CaptureBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            pushed: 0,
            popped: 0,
        }
    }

    pub fn push(&mut self, item: T) -> PushOutcome {
        if self.items.len() >= self.capacity {
            warn!(
                "Capture buffer is full [{}], drain it before capturing more; frame dropped",
                self.capacity
            );
            return PushOutcome::Dropped;
        }

        self.items.push_back(item);
        self.pushed += 1;

        let now_full = self.items.len() == self.capacity;
        if now_full {
            info!(
                "Capture buffer reached full capacity [{}], process it to avoid dropped frames",
                self.capacity
            );
        }
        PushOutcome::Queued { now_full }
    }

    pub fn pop(&mut self) -> Option<T> {
        match self.items.pop_front() {
            Some(item) => {
                self.popped += 1;
                Some(item)
            }
            None => {
                warn!("Capture buffer is empty, nothing to pop");
                None
            }
        }
    }

    /// Discard everything still queued, returning how many items were lost.
    pub fn clear(&mut self) -> usize {
        let dropped = self.items.len();
        self.items.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn total_pushed(&self) -> u64 {
        self.pushed
    }

    pub fn total_popped(&self) -> u64 {
        self.popped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_drops_newest() {
        let mut buffer = CaptureBuffer::new(3);
        assert_eq!(buffer.push(1), PushOutcome::Queued { now_full: false });
        assert_eq!(buffer.push(2), PushOutcome::Queued { now_full: false });
        assert_eq!(buffer.push(3), PushOutcome::Queued { now_full: true });
        assert_eq!(buffer.push(4), PushOutcome::Dropped);

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.pop(), Some(1));
        assert_eq!(buffer.pop(), Some(2));
        assert_eq!(buffer.pop(), Some(3));
        assert_eq!(buffer.pop(), None);
    }

    #[test]
    fn test_empty_pop_is_none() {
        let mut buffer: CaptureBuffer<u8> = CaptureBuffer::new(1);
        assert_eq!(buffer.pop(), None);
        assert_eq!(buffer.total_popped(), 0);
    }

    #[test]
    fn test_pops_never_exceed_pushes() {
        let mut buffer = CaptureBuffer::new(2);
        for round in 0..5u32 {
            let _ = buffer.push(round);
            let _ = buffer.push(round + 100);
            let _ = buffer.push(round + 200);
            while buffer.pop().is_some() {}
            assert!(buffer.total_popped() <= buffer.total_pushed());
        }
        assert_eq!(buffer.total_pushed(), 10);
        assert_eq!(buffer.total_popped(), 10);
    }

    #[test]
    fn test_clear_after_aborted_session() {
        let mut buffer = CaptureBuffer::new(3);
        let _ = buffer.push(CapturedFrame::new(1, RgbImage::new(2, 2)));
        let _ = buffer.push(CapturedFrame::new(2, RgbImage::new(2, 2)));
        assert_eq!(buffer.clear(), 2);
        assert!(buffer.is_empty());
        assert!(!buffer.is_full());
    }

    #[test]
    fn test_frames_keep_capture_order() {
        let mut buffer = CaptureBuffer::new(4);
        for seq in 1..=4 {
            let _ = buffer.push(CapturedFrame::new(seq, RgbImage::new(1, 1)));
        }
        let order: Vec<u32> = std::iter::from_fn(|| buffer.pop())
            .map(|f| f.sequence)
            .collect();
        assert_eq!(order, vec![1, 2, 3, 4]);
    }
}
