//! Lock-free block queue between the synthesis worker and the callback
//!
//! A single-producer single-consumer sample ring addressed in whole
//! blocks. The consumer side is wait-free and safe to call from the
//! real-time callback; the producer side offers both a non-blocking push
//! and a cancellable blocking push for worker backpressure.
//!
//! All storage is allocated when the queue is created. Push and pop move
//! samples through the pre-allocated ring and never allocate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::types::Sample;

/// Default queue depth in blocks
///
/// Sized to absorb inference-time jitter: at 16 blocks of 512 frames and
/// 22.05kHz this is ~370ms of audio ahead of the playhead, so a single
/// slow `generate` call does not starve the callback.
pub const DEFAULT_QUEUE_BLOCKS: usize = 16;

/// Poll interval for the blocking push while the queue is full
///
/// Short enough that a cancel request is observed well inside any
/// shutdown deadline, long enough not to busy-spin.
const BACKPRESSURE_POLL: Duration = Duration::from_millis(1);

/// Create a block queue (producer/consumer pair)
///
/// `blocks` is the queue depth and `block_frames` the frame count of one
/// block. Both sides report length and capacity in blocks.
pub fn block_queue(blocks: usize, block_frames: usize) -> (BlockProducer, BlockConsumer) {
    assert!(blocks > 0, "block queue needs at least one block");
    assert!(block_frames > 0, "block queue needs a positive block size");

    let (producer, consumer) = rtrb::RingBuffer::new(blocks * block_frames);
    (
        BlockProducer {
            inner: producer,
            block_frames,
        },
        BlockConsumer {
            inner: consumer,
            block_frames,
        },
    )
}

/// Producer side of the block queue (owned by the synthesis worker)
pub struct BlockProducer {
    inner: rtrb::Producer<Sample>,
    block_frames: usize,
}

impl BlockProducer {
    /// Frame count of one block
    pub fn block_frames(&self) -> usize {
        self.block_frames
    }

    /// Queue capacity in blocks
    pub fn capacity_blocks(&self) -> usize {
        self.inner.buffer().capacity() / self.block_frames
    }

    /// Occupied depth in whole blocks
    pub fn len_blocks(&self) -> usize {
        (self.inner.buffer().capacity() - self.inner.slots()) / self.block_frames
    }

    /// Whether another full block would not fit right now
    pub fn is_full(&self) -> bool {
        self.inner.slots() < self.block_frames
    }

    /// Push one block without blocking
    ///
    /// Returns false and leaves the queue untouched when there is not
    /// enough space for the whole block.
    pub fn push(&mut self, block: &[Sample]) -> bool {
        if self.inner.slots() < block.len() {
            return false;
        }
        for &sample in block {
            // Space was checked above, the push cannot fail
            let _ = self.inner.push(sample);
        }
        true
    }

    /// Push one block, waiting for space while the queue is full
    ///
    /// The wait is a bounded poll that re-checks `cancel` every interval.
    /// Returns false (block not enqueued) when cancelled.
    pub fn push_blocking(&mut self, block: &[Sample], cancel: &AtomicBool) -> bool {
        loop {
            if cancel.load(Ordering::Relaxed) {
                return false;
            }
            if self.push(block) {
                return true;
            }
            thread::sleep(BACKPRESSURE_POLL);
        }
    }
}

/// Consumer side of the block queue (owned by the real-time callback)
pub struct BlockConsumer {
    inner: rtrb::Consumer<Sample>,
    block_frames: usize,
}

impl BlockConsumer {
    /// Frame count of one block
    pub fn block_frames(&self) -> usize {
        self.block_frames
    }

    /// Queue capacity in blocks
    pub fn capacity_blocks(&self) -> usize {
        self.inner.buffer().capacity() / self.block_frames
    }

    /// Readable depth in whole blocks
    pub fn len_blocks(&self) -> usize {
        self.inner.slots() / self.block_frames
    }

    /// Whether nothing is readable
    pub fn is_empty(&self) -> bool {
        self.inner.slots() == 0
    }

    /// Pop up to `out.len()` samples into `out`, wait-free
    ///
    /// Returns the number of samples actually written; the caller decides
    /// what to do with the uncovered tail.
    pub fn pop_into(&mut self, out: &mut [Sample]) -> usize {
        let mut written = 0;
        for slot in out.iter_mut() {
            match self.inner.pop() {
                Ok(sample) => {
                    *slot = sample;
                    written += 1;
                }
                Err(_) => break,
            }
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_fifo_order() {
        let (mut producer, mut consumer) = block_queue(4, 4);

        producer.push(&[1.0, 2.0, 3.0, 4.0]);
        producer.push(&[5.0, 6.0, 7.0, 8.0]);

        let mut out = [0.0f32; 4];
        assert_eq!(consumer.pop_into(&mut out), 4);
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(consumer.pop_into(&mut out), 4);
        assert_eq!(out, [5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_capacity_bound() {
        let (mut producer, consumer) = block_queue(2, 4);
        let block = [0.5f32; 4];

        assert!(producer.push(&block));
        assert!(producer.push(&block));
        // Full: a third block is refused and the queue stays consistent
        assert!(!producer.push(&block));
        assert!(producer.is_full());
        assert_eq!(producer.len_blocks(), 2);
        assert_eq!(consumer.len_blocks(), 2);
        assert_eq!(consumer.capacity_blocks(), 2);
    }

    #[test]
    fn test_pop_from_empty() {
        let (_producer, mut consumer) = block_queue(2, 4);
        let mut out = [1.0f32; 4];
        assert_eq!(consumer.pop_into(&mut out), 0);
        assert!(consumer.is_empty());
        // Untouched output is the caller's responsibility
        assert_eq!(out, [1.0; 4]);
    }

    #[test]
    fn test_interleaved_push_pop_preserves_order() {
        let (mut producer, mut consumer) = block_queue(2, 2);
        let mut out = [0.0f32; 2];

        assert!(producer.push(&[1.0, 2.0]));
        assert!(producer.push(&[3.0, 4.0]));
        assert_eq!(consumer.pop_into(&mut out), 2);
        assert_eq!(out, [1.0, 2.0]);
        assert!(producer.push(&[5.0, 6.0]));
        assert_eq!(consumer.pop_into(&mut out), 2);
        assert_eq!(out, [3.0, 4.0]);
        assert_eq!(consumer.pop_into(&mut out), 2);
        assert_eq!(out, [5.0, 6.0]);
    }

    #[test]
    fn test_push_blocking_waits_for_space() {
        let (mut producer, mut consumer) = block_queue(1, 4);
        let cancel = Arc::new(AtomicBool::new(false));

        assert!(producer.push(&[1.0; 4]));

        let drainer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            let mut out = [0.0f32; 4];
            consumer.pop_into(&mut out);
            consumer
        });

        // Blocks until the drainer frees a slot, then succeeds
        assert!(producer.push_blocking(&[2.0; 4], &cancel));

        let mut consumer = drainer.join().unwrap();
        let mut out = [0.0f32; 4];
        assert_eq!(consumer.pop_into(&mut out), 4);
        assert_eq!(out, [2.0; 4]);
    }

    #[test]
    fn test_push_blocking_cancelled_promptly() {
        let (mut producer, _consumer) = block_queue(1, 4);
        let cancel = Arc::new(AtomicBool::new(false));

        assert!(producer.push(&[1.0; 4]));

        let cancel_flag = Arc::clone(&cancel);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            cancel_flag.store(true, Ordering::Relaxed);
        });

        let started = Instant::now();
        assert!(!producer.push_blocking(&[2.0; 4], &cancel));
        assert!(started.elapsed() < Duration::from_millis(200));
    }
}
