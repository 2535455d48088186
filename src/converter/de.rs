//! Discrete-event signal shared between the host side and converter ports.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::tdf::SampleValue;
use crate::types::SimTime;

#[derive(Debug)]
struct DeState<T> {
    name: String,
    initial: T,
    writes: BTreeMap<SimTime, T>,
    changes: u64,
}

impl<T: SampleValue> DeState<T> {
    fn value_at(&self, time: SimTime) -> &T {
        self.writes
            .range(..=time)
            .next_back()
            .map(|(_, v)| v)
            .unwrap_or(&self.initial)
    }
}

/// A timed DE signal.
///
/// Writes are recorded with their time, so a reader asking for the value at
/// `t` sees the last write at or before `t` no matter in which order the
/// host and the converters run. Clones share the same signal.
#[derive(Debug)]
pub struct DeSignal<T> {
    inner: Arc<RwLock<DeState<T>>>,
}

impl<T> Clone for DeSignal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: SampleValue> DeSignal<T> {
    pub fn new(name: impl Into<String>, initial: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(DeState {
                name: name.into(),
                initial,
                writes: BTreeMap::new(),
                changes: 0,
            })),
        }
    }

    pub fn name(&self) -> String {
        self.inner.read().name.clone()
    }

    /// Records `value` at `time`. Returns whether the signal value changed.
    pub fn write_at(&self, time: SimTime, value: T) -> bool {
        let mut state = self.inner.write();
        let changed = *state.value_at(time) != value;
        state.writes.insert(time, value);
        if changed {
            state.changes += 1;
        }
        changed
    }

    /// Value of the last write at or before `time`, or the initial value.
    pub fn read_at(&self, time: SimTime) -> T {
        self.inner.read().value_at(time).clone()
    }

    /// Value of the latest write.
    pub fn latest(&self) -> T {
        let state = self.inner.read();
        state
            .writes
            .values()
            .next_back()
            .unwrap_or(&state.initial)
            .clone()
    }

    /// Number of writes that changed the value.
    pub fn change_count(&self) -> u64 {
        self.inner.read().changes
    }

    /// All recorded writes, oldest first.
    pub fn history(&self) -> Vec<(SimTime, T)> {
        self.inner
            .read()
            .writes
            .iter()
            .map(|(t, v)| (*t, v.clone()))
            .collect()
    }

    /// Forgets writes before `time`, keeping the one that is still current there.
    pub fn prune_before(&self, time: SimTime) {
        let mut state = self.inner.write();
        let current = state.writes.range(..=time).next_back().map(|(t, _)| *t);
        if let Some(keep) = current {
            state.writes = state.writes.split_off(&keep);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timed_reads() {
        let sig = DeSignal::new("clk", false);
        let reader = sig.clone();
        assert!(sig.write_at(SimTime::from_ns(10), true));
        assert!(!sig.write_at(SimTime::from_ns(15), true));
        assert!(sig.write_at(SimTime::from_ns(20), false));

        assert!(!reader.read_at(SimTime::from_ns(9)));
        assert!(reader.read_at(SimTime::from_ns(10)));
        assert!(reader.read_at(SimTime::from_ns(19)));
        assert!(!reader.latest());
        assert_eq!(reader.change_count(), 2);
    }

    #[test]
    fn test_prune() {
        let sig = DeSignal::new("v", 0.0);
        for k in 1..=5u64 {
            sig.write_at(SimTime::from_ns(k), k as f64);
        }
        sig.prune_before(SimTime::from_ns(3));
        assert_eq!(sig.history().len(), 3);
        assert_eq!(sig.read_at(SimTime::from_ns(3)), 3.0);
        assert_eq!(sig.name(), "v");
    }
}
