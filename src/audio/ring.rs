//! Lock-free single-producer/single-consumer sample ring.
//!
//! The network task pushes decoded samples while the audio render callback
//! pulls them. Neither side takes a lock or allocates:
//!
//! - `head` counts every sample ever written and is only advanced by the
//!   producer.
//! - `tail` counts every sample consumed or evicted. The consumer advances it
//!   with a compare-exchange after copying; the producer pushes it forward
//!   with `fetch_max` before overwriting the oldest unread slots.
//!
//! When the producer evicts samples the consumer is copying, the consumer's
//! compare-exchange fails and it retries with the new tail, so evicted samples
//! are never returned. The slot accesses pair a release fence after the
//! eviction with an acquire fence before the compare-exchange: a consumer
//! that copied an overwritten slot is guaranteed to see the moved tail.
//!
//! Counters are `usize` and never wrap in practice (2^64 samples).

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering, fence};

/// Fixed-capacity circular buffer of normalized `f32` samples.
pub struct SampleRing {
    slots: Box<[AtomicU32]>,
    head: AtomicUsize,
    tail: AtomicUsize,
    evicted: AtomicUsize,
}

impl SampleRing {
    /// Creates a ring holding `capacity` samples (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let slots = (0..capacity)
            .map(|_| AtomicU32::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            evicted: AtomicUsize::new(0),
        }
    }

    /// Creates a ring sized for `secs` seconds of audio at `sample_rate`.
    pub fn for_duration(sample_rate: u32, secs: u32) -> Self {
        Self::new(sample_rate as usize * secs as usize)
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of unread samples.
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::SeqCst);
        let head = self.head.load(Ordering::Acquire);
        head.saturating_sub(tail).min(self.capacity())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total samples discarded by overflow since creation.
    pub fn evicted(&self) -> usize {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Appends samples. Producer side only.
    ///
    /// When the ring is full the oldest unread samples are discarded to make
    /// room. Writes are never rejected.
    pub fn push(&self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }

        let capacity = self.capacity();
        let head = self.head.load(Ordering::Relaxed);
        let new_head = head + samples.len();

        // Evict before overwriting so a concurrent pull sees the moved tail.
        let min_tail = new_head.saturating_sub(capacity);
        let previous = self.tail.fetch_max(min_tail, Ordering::SeqCst);
        if previous < min_tail {
            self.evicted
                .fetch_add(min_tail - previous, Ordering::Relaxed);
        }
        fence(Ordering::Release);

        let skip = samples.len().saturating_sub(capacity);
        for (offset, sample) in samples[skip..].iter().enumerate() {
            let position = head + skip + offset;
            self.slots[position % capacity].store(sample.to_bits(), Ordering::Relaxed);
        }

        self.head.store(new_head, Ordering::Release);
    }

    /// Fills `out` with the oldest unread samples. Consumer side only.
    ///
    /// Returns how many real samples were copied; the remainder of `out` is
    /// zero-filled. Never blocks.
    pub fn pull_into(&self, out: &mut [f32]) -> usize {
        let capacity = self.capacity();
        loop {
            let tail = self.tail.load(Ordering::SeqCst);
            let head = self.head.load(Ordering::Acquire);
            let count = head.saturating_sub(tail).min(out.len());

            if count == 0 {
                out.fill(0.0);
                return 0;
            }

            for (offset, slot) in out[..count].iter_mut().enumerate() {
                let bits = self.slots[(tail + offset) % capacity].load(Ordering::Relaxed);
                *slot = f32::from_bits(bits);
            }
            fence(Ordering::Acquire);

            if self
                .tail
                .compare_exchange(tail, tail + count, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                out[count..].fill(0.0);
                return count;
            }
            // The producer evicted part of what we copied; start over.
        }
    }

    /// Returns exactly `count` samples and how many of them are real.
    pub fn pull(&self, count: usize) -> (Vec<f32>, usize) {
        let mut out = vec![0.0; count];
        let filled = self.pull_into(&mut out);
        (out, filled)
    }

    /// Discards every unread sample.
    pub fn reset(&self) {
        let head = self.head.load(Ordering::Acquire);
        self.tail.fetch_max(head, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for SampleRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleRing")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .field("evicted", &self.evicted())
            .finish()
    }
}
