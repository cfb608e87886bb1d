//! # Sample Ring Buffer
//!
//! Fixed-capacity circular store for the incoming mono sample stream.
//!
//! ## Features
//! - Wrap-around writes; overflow overwrites the oldest samples instead of failing
//! - "Latest N samples" extraction in at most two contiguous copies
//! - Non-blocking warm-up check
//! - [`SharedRingBuffer`]: the producer/consumer handoff, one short-held mutex
//!   around each call plus an overrun counter

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Single-threaded circular sample store.
///
/// `write_cursor == total_written % capacity` holds after every call.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    storage: Vec<f32>,
    write_cursor: usize,
    total_written: u64,
}

impl RingBuffer {
    /// Creates an empty buffer holding `capacity` samples.
    ///
    /// # Panics
    /// * If `capacity` is zero
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            storage: vec![0.0; capacity],
            write_cursor: 0,
            total_written: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Total number of samples ever written.
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Appends `samples`, wrapping at capacity.
    ///
    /// When more samples arrive than fit, only the last `capacity` of them are
    /// kept; everything older is overwritten.
    pub fn write(&mut self, samples: &[f32]) {
        let capacity = self.storage.len();
        let count = samples.len();
        if count == 0 {
            return;
        }

        // Only the tail of an oversized write can survive.
        let kept = if count > capacity {
            &samples[count - capacity..]
        } else {
            samples
        };
        let cursor = (self.write_cursor + (count - kept.len())) % capacity;

        let first = kept.len().min(capacity - cursor);
        self.storage[cursor..cursor + first].copy_from_slice(&kept[..first]);
        let rest = kept.len() - first;
        if rest > 0 {
            self.storage[..rest].copy_from_slice(&kept[first..]);
        }

        self.total_written += count as u64;
        self.write_cursor = (self.total_written % capacity as u64) as usize;
    }

    /// Whether at least `size` samples have been written and fit in the buffer.
    pub fn has_enough_data(&self, size: usize) -> bool {
        size <= self.storage.len() && self.total_written >= size as u64
    }

    /// Copies the most recent `dest.len()` samples into `dest`, oldest first.
    ///
    /// # Returns
    /// * `true` - `dest` holds the latest samples
    /// * `false` - warm-up (or `dest` longer than the capacity); `dest` is zero-filled
    pub fn extract_latest(&self, dest: &mut [f32]) -> bool {
        let size = dest.len();
        if !self.has_enough_data(size) {
            dest.fill(0.0);
            return false;
        }
        if size == 0 {
            return true;
        }

        let capacity = self.storage.len();
        let start = (self.write_cursor + capacity - size) % capacity;
        let first = size.min(capacity - start);
        dest[..first].copy_from_slice(&self.storage[start..start + first]);
        if first < size {
            dest[first..].copy_from_slice(&self.storage[..size - first]);
        }
        true
    }
}

/// Ring buffer shared between the capture producer and the analysis consumer.
///
/// Each call takes the lock for the duration of one copy and nothing else.
#[derive(Debug)]
pub struct SharedRingBuffer {
    inner: Mutex<RingBuffer>,
    read_mark: AtomicU64,
    overrun_samples: AtomicU64,
}

impl SharedRingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RingBuffer::new(capacity)),
            read_mark: AtomicU64::new(0),
            overrun_samples: AtomicU64::new(0),
        }
    }

    // A panic while holding the lock cannot leave the buffer half-copied in a way
    // that matters for audio, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, RingBuffer> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inbound contract for the capture collaborator.
    ///
    /// Never fails. Samples overwritten before any extraction saw them are
    /// added to [`overrun_samples`](Self::overrun_samples).
    pub fn push_samples(&self, samples: &[f32]) {
        let mut ring = self.lock();
        let unread = ring.total_written() - self.read_mark.load(Ordering::Relaxed);
        let overflow = (unread + samples.len() as u64).saturating_sub(ring.capacity() as u64);
        if overflow > 0 {
            self.overrun_samples.fetch_add(overflow, Ordering::Relaxed);
        }
        ring.write(samples);
    }

    /// See [`RingBuffer::extract_latest`].
    ///
    /// # Returns
    /// * `Some(position)` - samples written when the copy was taken, read under the same lock
    /// * `None` - warm-up; `dest` is zero-filled
    pub fn extract_latest(&self, dest: &mut [f32]) -> Option<u64> {
        let ring = self.lock();
        if !ring.extract_latest(dest) {
            return None;
        }
        let position = ring.total_written();
        self.read_mark.store(position, Ordering::Relaxed);
        Some(position)
    }

    pub fn has_enough_data(&self, size: usize) -> bool {
        self.lock().has_enough_data(size)
    }

    pub fn total_written(&self) -> u64 {
        self.lock().total_written()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    /// Samples lost to overflow since construction.
    pub fn overrun_samples(&self) -> u64 {
        self.overrun_samples.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(start: usize, len: usize) -> Vec<f32> {
        (start..start + len).map(|i| i as f32).collect()
    }

    #[test]
    fn test_round_trip_full_window() {
        let mut ring = RingBuffer::new(16);
        let input = ramp(0, 16);
        ring.write(&input);

        let mut out = vec![0.0; 16];
        assert!(ring.extract_latest(&mut out));
        assert_eq!(out, input);
    }

    #[test]
    fn test_latest_k_after_several_writes() {
        let mut ring = RingBuffer::new(32);
        ring.write(&ramp(0, 5));
        ring.write(&ramp(5, 7));
        ring.write(&ramp(12, 3));

        for k in 1..=15 {
            let mut out = vec![0.0; k];
            assert!(ring.extract_latest(&mut out));
            assert_eq!(out, ramp(15 - k, k), "k = {}", k);
        }
    }

    #[test]
    fn test_warm_up_zero_fills() {
        let mut ring = RingBuffer::new(32);
        ring.write(&[1.0; 10]);

        let mut out = vec![7.0; 11];
        assert!(!ring.extract_latest(&mut out));
        assert!(out.iter().all(|&s| s == 0.0));
        assert!(!ring.has_enough_data(11));
        assert!(ring.has_enough_data(10));
    }

    #[test]
    fn test_wrap_around() {
        let capacity = 10;
        let mut ring = RingBuffer::new(capacity);
        // capacity + m samples in uneven chunks
        let stream = ramp(0, capacity + 7);
        for chunk in stream.chunks(3) {
            ring.write(chunk);
        }
        assert_eq!(ring.total_written(), 17);

        let mut out = vec![0.0; capacity];
        assert!(ring.extract_latest(&mut out));
        assert_eq!(out, ramp(7, capacity));
    }

    #[test]
    fn test_oversized_write_keeps_tail() {
        let mut ring = RingBuffer::new(8);
        ring.write(&ramp(0, 3));
        ring.write(&ramp(3, 20));

        let mut out = vec![0.0; 8];
        assert!(ring.extract_latest(&mut out));
        assert_eq!(out, ramp(15, 8));
        assert_eq!(ring.total_written(), 23);
    }

    #[test]
    fn test_request_larger_than_capacity() {
        let mut ring = RingBuffer::new(4);
        ring.write(&ramp(0, 100));
        let mut out = vec![1.0; 5];
        assert!(!ring.extract_latest(&mut out));
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_shared_counts_overruns() {
        let shared = SharedRingBuffer::new(8);
        shared.push_samples(&ramp(0, 6));
        assert_eq!(shared.overrun_samples(), 0);

        // 6 unread + 5 new exceeds capacity by 3
        shared.push_samples(&ramp(6, 5));
        assert_eq!(shared.overrun_samples(), 3);

        let mut out = vec![0.0; 4];
        assert!(shared.extract_latest(&mut out).is_some());
        assert_eq!(out, ramp(7, 4));

        // everything up to here has been observed
        shared.push_samples(&ramp(11, 8));
        assert_eq!(shared.overrun_samples(), 3);
    }

    #[test]
    fn test_shared_across_threads() {
        use std::sync::Arc;

        let shared = Arc::new(SharedRingBuffer::new(4096));
        let producer = {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || {
                for block in 0..64 {
                    shared.push_samples(&ramp(block * 32, 32));
                }
            })
        };
        producer.join().expect("producer thread panicked");

        let mut out = vec![0.0; 2048];
        assert!(shared.extract_latest(&mut out).is_some());
        assert_eq!(out, ramp(0, 2048));
        assert_eq!(shared.total_written(), 2048);
    }

    #[test]
    fn test_position_matches_extracted_window() {
        use std::sync::Arc;

        let shared = Arc::new(SharedRingBuffer::new(1024));
        let producer = {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || {
                for block in 0..2000 {
                    shared.push_samples(&ramp(block * 16, 16));
                }
            })
        };

        let mut out = vec![0.0; 256];
        let mut checked = 0;
        while checked < 200 {
            if let Some(position) = shared.extract_latest(&mut out) {
                // samples are their own stream index
                assert_eq!(out[255] as u64 + 1, position);
                checked += 1;
            }
        }
        producer.join().expect("producer thread panicked");
    }
}
