//! Time-indexed history buffer with linear interpolation.
//!
//! A [`DelayBuffer`] stores `(time, value)` samples with strictly increasing
//! times and answers queries for arbitrary times. It bridges differing time
//! grids (for example a continuous network sampled on a TDF port with an
//! offset) and implements transport delays.
//!
//! Old samples are discarded once they fall out of the configured window,
//! but one sample at or before the window start is always kept so that a
//! query at the window start can still be interpolated.

use std::collections::VecDeque;

use nalgebra::DVector;

use crate::types::{CScalar, SignedTime, SimTime};

/// Values that can be linearly interpolated.
pub trait Interpolate: Clone {
    /// Returns `self + (other - self) * fraction` for `fraction` in `[0, 1]`.
    fn interpolate(&self, other: &Self, fraction: f64) -> Self;
}

impl Interpolate for f64 {
    fn interpolate(&self, other: &Self, fraction: f64) -> Self {
        self + (other - self) * fraction
    }
}

impl Interpolate for CScalar {
    fn interpolate(&self, other: &Self, fraction: f64) -> Self {
        self + (other - self) * fraction
    }
}

impl Interpolate for Vec<f64> {
    fn interpolate(&self, other: &Self, fraction: f64) -> Self {
        self.iter()
            .zip(other.iter())
            .map(|(a, b)| a.interpolate(b, fraction))
            .collect()
    }
}

impl Interpolate for DVector<f64> {
    fn interpolate(&self, other: &Self, fraction: f64) -> Self {
        self + (other - self) * fraction
    }
}

/// How a lookup result was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupStatus {
    /// A sample is stored at exactly the requested time.
    Exact,
    /// The value lies between two stored samples.
    Interpolated,
    /// The request is at or before the earliest sample; the earliest value is returned.
    Clamped,
    /// The request is after the latest sample; the latest value is returned.
    NotAvailable,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Lookup<T> {
    pub value: T,
    pub status: LookupStatus,
}

/// Result of [`DelayBuffer::next_after`].
#[derive(Clone, Debug, PartialEq)]
pub struct NextSample<T> {
    pub time: SimTime,
    pub value: T,
    /// Whether further samples follow this one
    pub more: bool,
}

#[derive(Clone, Debug)]
pub struct DelayBuffer<T> {
    samples: VecDeque<(SimTime, T)>,
    capacity: usize,
    window: SimTime,
    grow_count: usize,
}

impl<T: Interpolate> DelayBuffer<T> {
    /// Creates a buffer that keeps every sample until capacity forces growth.
    pub fn new(capacity: usize) -> Self {
        Self::with_window(capacity, SimTime::MAX)
    }

    /// Creates a buffer that may discard samples older than `window` before
    /// the latest stored time.
    pub fn with_window(capacity: usize, window: SimTime) -> Self {
        let capacity = capacity.max(2);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            window,
            grow_count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Current logical capacity. Doubles whenever a store would overflow it.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of times the capacity was doubled.
    pub fn grow_count(&self) -> usize {
        self.grow_count
    }

    pub fn window(&self) -> SimTime {
        self.window
    }

    pub fn set_window(&mut self, window: SimTime) {
        self.window = window;
    }

    pub fn earliest(&self) -> Option<SimTime> {
        self.samples.front().map(|(t, _)| *t)
    }

    pub fn latest(&self) -> Option<SimTime> {
        self.samples.back().map(|(t, _)| *t)
    }

    pub fn latest_value(&self) -> Option<&T> {
        self.samples.back().map(|(_, v)| v)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Stores a sample.
    ///
    /// A sample at the same time as the latest one replaces it. A sample
    /// earlier than the latest one discards the newer history first, which
    /// happens when a solver repeats a step.
    pub fn store(&mut self, time: SimTime, value: T) {
        while let Some(&(last, _)) = self.samples.back() {
            if last < time {
                break;
            }
            self.samples.pop_back();
        }

        if self.samples.len() >= self.capacity {
            self.discard_outside_window(time);
        }
        if self.samples.len() >= self.capacity {
            self.capacity *= 2;
            self.grow_count += 1;
            self.samples.reserve(self.capacity - self.samples.len());
            tracing::trace!(capacity = self.capacity, "delay buffer grown");
        }
        self.samples.push_back((time, value));
    }

    fn discard_outside_window(&mut self, now: SimTime) {
        let window_start = now.saturating_sub(self.window);
        while self.samples.len() >= 2 && self.samples[1].0 <= window_start {
            self.samples.pop_front();
        }
    }

    /// Looks up the value at `time`. Returns `None` only for an empty buffer.
    pub fn query(&self, time: impl Into<SignedTime>) -> Option<Lookup<T>> {
        let time = time.into();
        let (first_time, first_value) = self.samples.front()?;
        let (last_time, last_value) = self.samples.back()?;

        if time <= SignedTime::from(*first_time) {
            return Some(Lookup {
                value: first_value.clone(),
                status: LookupStatus::Clamped,
            });
        }
        if time > SignedTime::from(*last_time) {
            return Some(Lookup {
                value: last_value.clone(),
                status: LookupStatus::NotAvailable,
            });
        }

        // Here `time` is positive and inside (first, last].
        let t = time.magnitude();
        let idx = self.samples.partition_point(|(st, _)| *st < t);
        let (t1, v1) = &self.samples[idx];
        if *t1 == t {
            return Some(Lookup {
                value: v1.clone(),
                status: LookupStatus::Exact,
            });
        }
        let (t0, v0) = &self.samples[idx - 1];
        let span = (*t1 - *t0).ticks() as f64;
        let fraction = (t - *t0).ticks() as f64 / span;
        Some(Lookup {
            value: v0.interpolate(v1, fraction),
            status: LookupStatus::Interpolated,
        })
    }

    /// Returns the first sample strictly after `time`.
    pub fn next_after(&self, time: impl Into<SignedTime>) -> Option<NextSample<T>> {
        let time = time.into();
        let idx = if time.is_negative() {
            0
        } else {
            let t = time.magnitude();
            self.samples.partition_point(|(st, _)| *st <= t)
        };
        let (t, v) = self.samples.get(idx)?;
        Some(NextSample {
            time: *t,
            value: v.clone(),
            more: idx + 1 < self.samples.len(),
        })
    }

    /// Iterates over stored samples, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &(SimTime, T)> {
        self.samples.iter()
    }
}
