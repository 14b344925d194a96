//! Bounded accumulator for commit ids awaiting the periodic drain.
//!
//! Appenders and the drainer share one lock, so an id is either in the
//! buffer or in exactly one drained batch. When full, the oldest ids are
//! evicted and counted.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use pulse_core::CommitId;

#[derive(Debug)]
struct Inner {
    ids: VecDeque<CommitId>,
    dropped: u64,
}

#[derive(Debug)]
pub struct CommitBuffer {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl CommitBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                ids: VecDeque::with_capacity(capacity),
                dropped: 0,
            }),
            capacity,
        }
    }

    /// Append ids, evicting the oldest beyond capacity.
    ///
    /// Returns how many ids were evicted by this call.
    pub fn push<I>(&self, ids: I) -> usize
    where
        I: IntoIterator<Item = CommitId>,
    {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut evicted = 0;
        for id in ids {
            inner.ids.push_back(id);
            if inner.ids.len() > self.capacity {
                inner.ids.pop_front();
                evicted += 1;
            }
        }
        inner.dropped += evicted as u64;
        evicted
    }

    /// Take everything buffered, leaving the buffer empty.
    pub fn take_all(&self) -> Vec<CommitId> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.ids.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ids
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total ids evicted since creation.
    pub fn dropped(&self) -> u64 {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ids(range: std::ops::Range<usize>) -> Vec<CommitId> {
        range.map(|i| format!("c{i}")).collect()
    }

    #[test]
    fn push_and_take() {
        let buffer = CommitBuffer::new(10);
        assert_eq!(buffer.push(ids(0..3)), 0);
        assert_eq!(buffer.len(), 3);

        assert_eq!(buffer.take_all(), ids(0..3));
        assert!(buffer.is_empty());
        assert!(buffer.take_all().is_empty());
    }

    #[test]
    fn oldest_evicted_beyond_capacity() {
        let buffer = CommitBuffer::new(4);
        assert_eq!(buffer.push(ids(0..6)), 2);
        assert_eq!(buffer.take_all(), ids(2..6));
        assert_eq!(buffer.dropped(), 2);

        buffer.push(ids(0..5));
        assert_eq!(buffer.dropped(), 3);
    }

    #[test]
    fn zero_capacity_clamped() {
        let buffer = CommitBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
        buffer.push(ids(0..2));
        assert_eq!(buffer.take_all(), ids(1..2));
    }

    #[test]
    fn concurrent_push_and_drain_lose_nothing() {
        let buffer = Arc::new(CommitBuffer::new(100_000));
        let writers: Vec<_> = (0..4)
            .map(|t| {
                let buffer = Arc::clone(&buffer);
                std::thread::spawn(move || {
                    for i in 0..1000 {
                        buffer.push([format!("t{t}-{i}")]);
                    }
                })
            })
            .collect();

        let mut drained = Vec::new();
        for _ in 0..50 {
            drained.extend(buffer.take_all());
        }
        for w in writers {
            w.join().unwrap();
        }
        drained.extend(buffer.take_all());

        drained.sort();
        drained.dedup();
        assert_eq!(drained.len(), 4000);
        assert_eq!(buffer.dropped(), 0);
    }
}
