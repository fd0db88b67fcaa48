// ─────────────────────────────────────────────────────────────────────
// PocKETlab Core — Sample Rings
// © 1998–2026 Miroslav Šotek. All rights reserved.
// ─────────────────────────────────────────────────────────────────────
//! Zero-allocation sample rings for measurement streams.
//!
//! [`SampleRing`] is touched from a single context. [`SharedRing`] is the
//! control-loop buffer written by the real-time thread and drained by the
//! cooperative loop; both sides use a bounded lock wait and skip on
//! contention instead of blocking.

use parking_lot::Mutex;
use std::time::Duration;

/// A fixed-capacity circular store with separate write cursor and count.
#[derive(Debug, Clone)]
pub struct SampleRing<T> {
    data: Vec<T>,
    capacity: usize,
    head: usize,
    count: usize,
}

impl<T: Copy + Default> SampleRing<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: vec![T::default(); capacity],
            capacity,
            head: 0,
            count: 0,
        }
    }

    /// Append, overwriting the oldest entry once full.
    pub fn push(&mut self, value: T) {
        self.data[self.head] = value;
        self.head = (self.head + 1) % self.capacity;
        if self.count < self.capacity {
            self.count += 1;
        }
    }

    /// Returns the data in chronological order (oldest to newest).
    pub fn get_view(&self) -> Vec<T> {
        let mut result = Vec::with_capacity(self.count);
        if self.count < self.capacity {
            result.extend_from_slice(&self.data[0..self.count]);
        } else {
            result.extend_from_slice(&self.data[self.head..self.capacity]);
            result.extend_from_slice(&self.data[0..self.head]);
        }
        result
    }

    /// Take every buffered sample and reset to empty.
    pub fn drain(&mut self) -> Vec<T> {
        let out = self.get_view();
        self.clear();
        out
    }

    pub fn latest(&self) -> Option<T> {
        if self.count == 0 {
            return None;
        }
        let idx = if self.head == 0 {
            self.capacity - 1
        } else {
            self.head - 1
        };
        Some(self.data[idx])
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.count = 0;
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Index the next push lands on.
    pub fn write_cursor(&self) -> usize {
        self.head
    }
}

/// Mutex-guarded ring shared between the real-time producer and the
/// cooperative consumer. Every operation is a try-lock with a bounded
/// wait; `None`/`false` means the caller should skip this tick.
#[derive(Debug)]
pub struct SharedRing<T> {
    inner: Mutex<SampleRing<T>>,
    lock_timeout: Duration,
}

impl<T: Copy + Default> SharedRing<T> {
    pub fn new(capacity: usize, lock_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(SampleRing::new(capacity)),
            lock_timeout,
        }
    }

    pub fn try_push(&self, value: T) -> bool {
        match self.inner.try_lock_for(self.lock_timeout) {
            Some(mut ring) => {
                ring.push(value);
                true
            }
            None => false,
        }
    }

    /// Drain only when at least `min_count` samples are buffered.
    /// `Some(empty)` means the lock was taken but the batch was too small.
    pub fn try_drain_at_least(&self, min_count: usize) -> Option<Vec<T>> {
        let mut ring = self.inner.try_lock_for(self.lock_timeout)?;
        if ring.len() < min_count {
            return Some(Vec::new());
        }
        Some(ring.drain())
    }

    pub fn try_drain(&self) -> Option<Vec<T>> {
        self.try_drain_at_least(0)
    }

    pub fn try_clear(&self) -> bool {
        match self.inner.try_lock_for(self.lock_timeout) {
            Some(mut ring) => {
                ring.clear();
                true
            }
            None => false,
        }
    }

    /// `(count, write_cursor)` snapshot.
    pub fn try_snapshot(&self) -> Option<(usize, usize)> {
        let ring = self.inner.try_lock_for(self.lock_timeout)?;
        Some((ring.len(), ring.write_cursor()))
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity()
    }

    #[cfg(test)]
    fn hold(&self) -> parking_lot::MutexGuard<'_, SampleRing<T>> {
        self.inner.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_push_below_capacity_keeps_order() {
        let mut ring = SampleRing::<f64>::new(4);
        ring.push(1.0);
        ring.push(2.0);
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.get_view(), vec![1.0, 2.0]);
        assert_eq!(ring.latest(), Some(2.0));
    }

    #[test]
    fn test_wraparound_is_chronological() {
        let mut ring = SampleRing::<f64>::new(3);
        for v in 1..=5 {
            ring.push(v as f64);
        }
        assert_eq!(ring.len(), 3);
        assert!(ring.is_full());
        assert_eq!(ring.get_view(), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_drain_resets_cursor() {
        let mut ring = SampleRing::<f64>::new(20);
        for v in 0..27 {
            ring.push(v as f64);
        }
        assert_eq!(ring.len(), 20);
        let drained = ring.drain();
        assert_eq!(drained.len(), 20);
        assert_eq!(drained[0], 7.0);
        assert_eq!(ring.len(), 0);
        assert_eq!(ring.write_cursor(), 0);
        assert_eq!(ring.latest(), None);
    }

    #[test]
    fn test_shared_min_batch() {
        let ring = SharedRing::<f64>::new(20, Duration::from_millis(1));
        for v in 0..4 {
            assert!(ring.try_push(v as f64));
        }
        assert_eq!(ring.try_drain_at_least(5), Some(Vec::new()));
        assert!(ring.try_push(4.0));
        let batch = ring.try_drain_at_least(5).unwrap();
        assert_eq!(batch, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(ring.try_snapshot(), Some((0, 0)));
    }

    #[test]
    fn test_contention_skips_instead_of_blocking() {
        let ring = Arc::new(SharedRing::<f64>::new(20, Duration::from_micros(200)));
        let guard = ring.hold();
        let producer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || (ring.try_push(1.0), ring.try_drain().is_none()))
        };
        let (pushed, drain_skipped) = producer.join().unwrap();
        drop(guard);
        assert!(!pushed);
        assert!(drain_skipped);
        assert_eq!(ring.try_snapshot(), Some((0, 0)));
    }
}
