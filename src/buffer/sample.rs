//! Integer-indexed sample storage for TDF signals and converter ports.
//!
//! Samples are addressed by an absolute index that only grows. Consumers
//! release indices they no longer need and the buffer drops them from the
//! front.

use std::collections::VecDeque;

#[derive(Clone, Debug)]
pub struct SampleBuffer<T> {
    samples: VecDeque<Option<T>>,
    first: u64,
}

impl<T: Clone> Default for SampleBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> SampleBuffer<T> {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::new(),
            first: 0,
        }
    }

    /// Index of the oldest retained slot.
    pub fn first_index(&self) -> u64 {
        self.first
    }

    /// One past the highest slot allocated so far.
    pub fn end_index(&self) -> u64 {
        self.first + self.samples.len() as u64
    }

    /// Number of retained slots, written or not.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Writes a value at an absolute index, growing the buffer as needed.
    ///
    /// Returns `false` if the index was already released.
    pub fn write(&mut self, index: u64, value: T) -> bool {
        if index < self.first {
            return false;
        }
        let offset = (index - self.first) as usize;
        if offset >= self.samples.len() {
            self.samples.resize(offset + 1, None);
        }
        self.samples[offset] = Some(value);
        true
    }

    /// Appends a value after the highest allocated slot and returns its index.
    pub fn push(&mut self, value: T) -> u64 {
        let index = self.end_index();
        self.samples.push_back(Some(value));
        index
    }

    /// Returns the value at an absolute index if it was written and not released.
    pub fn get(&self, index: u64) -> Option<&T> {
        if index < self.first {
            return None;
        }
        self.samples
            .get((index - self.first) as usize)
            .and_then(|slot| slot.as_ref())
    }

    pub fn contains(&self, index: u64) -> bool {
        self.get(index).is_some()
    }

    /// Drops every slot below `index`.
    pub fn release_before(&mut self, index: u64) {
        while self.first < index && !self.samples.is_empty() {
            self.samples.pop_front();
            self.first += 1;
        }
        if self.samples.is_empty() && self.first < index {
            self.first = index;
        }
    }

    /// Discards all slots and restarts indexing at zero.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.first = 0;
    }

    /// Most recently written value with its index.
    pub fn last_written(&self) -> Option<(u64, &T)> {
        self.samples
            .iter()
            .enumerate()
            .rev()
            .find_map(|(i, slot)| slot.as_ref().map(|v| (self.first + i as u64, v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_get() {
        let mut buf = SampleBuffer::new();
        assert!(buf.write(2, 5.0));
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.get(2), Some(&5.0));
        assert_eq!(buf.get(0), None);
        assert!(!buf.contains(7));
    }

    #[test]
    fn test_release() {
        let mut buf = SampleBuffer::new();
        for i in 0..6 {
            buf.push(i as f64);
        }
        buf.release_before(4);
        assert_eq!(buf.first_index(), 4);
        assert_eq!(buf.get(3), None);
        assert_eq!(buf.get(5), Some(&5.0));
        assert!(!buf.write(1, 9.0));

        buf.release_before(10);
        assert!(buf.is_empty());
        assert_eq!(buf.end_index(), 10);
        assert_eq!(buf.push(1.0), 10);
    }

    #[test]
    fn test_last_written() {
        let mut buf = SampleBuffer::new();
        assert!(buf.last_written().is_none());
        buf.write(0, 1);
        buf.write(3, 4);
        assert_eq!(buf.last_written(), Some((3, &4)));
        buf.reset();
        assert_eq!(buf.end_index(), 0);
    }
}
