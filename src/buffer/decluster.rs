//! Queue that re-synchronizes a produced sample stream into a consumer
//! running on a different time grid.
//!
//! The producer pushes timestamped values in bursts (a TDF cluster computes a
//! whole period at once). The consumer pops exactly one value per activation.
//! The signed offset between the consumer's activation time and the time of
//! the sample it received is kept as the remaining delay. When the queue runs
//! dry the most recent sample is repeated.

use std::collections::VecDeque;

use crate::types::{SignedTime, SimTime};

#[derive(Clone, Debug)]
pub struct DeclusterQueue<T> {
    queue: VecDeque<(SimTime, T)>,
    last: Option<(SimTime, T)>,
    remaining_delay: SignedTime,
    fallbacks: u64,
}

impl<T: Clone> Default for DeclusterQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> DeclusterQueue<T> {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            last: None,
            remaining_delay: SignedTime::ZERO,
            fallbacks: 0,
        }
    }

    /// Queues a produced sample. Samples must be pushed in time order.
    pub fn push(&mut self, time: SimTime, value: T) {
        self.queue.push_back((time, value));
    }

    /// Number of queued samples not yet consumed.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Time of the next sample to be consumed.
    pub fn next_time(&self) -> Option<SimTime> {
        self.queue.front().map(|(t, _)| *t)
    }

    /// Consumer activation time minus the time of the last consumed sample.
    pub fn remaining_delay(&self) -> SignedTime {
        self.remaining_delay
    }

    /// Number of activations that found the queue empty.
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks
    }

    pub fn last(&self) -> Option<&(SimTime, T)> {
        self.last.as_ref()
    }

    /// Consumes one sample for an activation at `now`.
    ///
    /// Falls back to the previously consumed sample when nothing is queued.
    /// Returns `None` only if no sample was ever produced.
    pub fn pop(&mut self, now: SimTime) -> Option<T> {
        match self.queue.pop_front() {
            Some((time, value)) => {
                self.remaining_delay = SignedTime::from(now) - time;
                self.last = Some((time, value.clone()));
                Some(value)
            }
            None => {
                let (time, value) = self.last.as_ref()?;
                self.fallbacks += 1;
                self.remaining_delay = SignedTime::from(now) - *time;
                tracing::trace!(now = %now, "decluster queue empty, repeating last sample");
                Some(value.clone())
            }
        }
    }

    /// Drops queued samples newer than `time`, used when a producer rewinds.
    pub fn truncate_after(&mut self, time: SimTime) {
        while let Some(&(t, _)) = self.queue.back() {
            if t <= time {
                break;
            }
            self.queue.pop_back();
        }
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.last = None;
        self.remaining_delay = SignedTime::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns(v: u64) -> SimTime {
        SimTime::from_ns(v)
    }

    #[test]
    fn test_one_value_per_activation() {
        let mut q = DeclusterQueue::new();
        q.push(ns(0), 1.0);
        q.push(ns(10), 2.0);
        q.push(ns(20), 3.0);

        assert_eq!(q.pop(ns(0)), Some(1.0));
        assert_eq!(q.pending(), 2);
        assert_eq!(q.pop(ns(10)), Some(2.0));
        assert_eq!(q.remaining_delay(), SignedTime::ZERO);
    }

    #[test]
    fn test_misaligned_consumer_tracks_remaining_delay() {
        let mut q = DeclusterQueue::new();
        q.push(ns(10), 'a');
        q.push(ns(20), 'b');

        assert_eq!(q.pop(ns(12)), Some('a'));
        assert_eq!(q.remaining_delay(), SignedTime::positive(ns(2)));

        assert_eq!(q.pop(ns(17)), Some('b'));
        assert_eq!(q.remaining_delay(), SignedTime::negative(ns(3)));
    }

    #[test]
    fn test_empty_queue_repeats_last() {
        let mut q: DeclusterQueue<i64> = DeclusterQueue::new();
        assert_eq!(q.pop(ns(0)), None);

        q.push(ns(5), 7);
        assert_eq!(q.pop(ns(5)), Some(7));
        assert_eq!(q.pop(ns(15)), Some(7));
        assert_eq!(q.fallback_count(), 1);
        assert_eq!(q.remaining_delay(), SignedTime::positive(ns(10)));
    }

    #[test]
    fn test_truncate_after() {
        let mut q = DeclusterQueue::new();
        for k in 0..4u64 {
            q.push(ns(10 * k), k);
        }
        q.truncate_after(ns(15));
        assert_eq!(q.pending(), 2);
        assert_eq!(q.next_time(), Some(ns(0)));
    }
}
