//! DE to TDF and TDF to DE converter ports.
//!
//! A [`DeToTdf`] port samples its DE signal once per TDF sample, at the
//! sample's time, into an index-addressed buffer. A [`TdfToDe`] port queues
//! every produced sample with its time; the cluster schedules one host
//! callback per sample and each callback moves exactly one value onto the
//! DE signal.
//!
//! Both can be forced to a fixed value, e.g. from a string entered by the
//! user. A string that does not parse leaves the port unchanged.

use crate::buffer::{DeclusterQueue, SampleBuffer};
use crate::converter::de::DeSignal;
use crate::eqn::AsAny;
use crate::error::{AmsError, Result};
use crate::tdf::SampleValue;
use crate::trace::{TraceCallback, TraceCallbacks, TraceInfo, TraceValue, Traceable};
use crate::types::SimTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConverterDirection {
    DeToTdf,
    TdfToDe,
}

/// Type-erased view of a converter port held by a TDF cluster.
pub trait Converter: AsAny + Send {
    fn name(&self) -> &str;

    fn direction(&self) -> ConverterDirection;

    fn value_type(&self) -> &'static str;

    /// Drops buffered samples below `index`.
    fn release_before(&mut self, index: u64);

    /// Host callback at `now`. Returns whether a value was written to the DE side.
    fn de_callback(&mut self, now: SimTime) -> bool;

    /// Forces the port to the value parsed from `input`.
    fn force_from_str(&mut self, input: &str) -> Result<()>;

    fn release_force(&mut self);

    fn is_forced(&self) -> bool;

    fn trace_value(&self) -> Option<TraceValue>;
}

fn parse<T: SampleValue>(input: &str) -> Result<T> {
    input.trim().parse::<T>().map_err(|_| AmsError::Conversion {
        target: T::type_name().to_string(),
        input: input.to_string(),
    })
}

/// Reads a DE signal into a TDF module.
#[derive(Debug)]
pub struct DeToTdf<T: SampleValue> {
    name: String,
    signal: DeSignal<T>,
    samples: SampleBuffer<T>,
    forced: Option<T>,
    last: Option<(SimTime, T)>,
    callbacks: TraceCallbacks,
}

impl<T: SampleValue> DeToTdf<T> {
    pub fn new(name: impl Into<String>, signal: DeSignal<T>) -> Self {
        Self {
            name: name.into(),
            signal,
            samples: SampleBuffer::new(),
            forced: None,
            last: None,
            callbacks: TraceCallbacks::new(),
        }
    }

    pub fn signal(&self) -> &DeSignal<T> {
        &self.signal
    }

    /// Value of port sample `index`, taken from the DE signal at `time` on first access.
    pub fn sample(&mut self, index: u64, time: SimTime) -> T {
        if let Some(value) = self.samples.get(index) {
            return value.clone();
        }
        let value = match &self.forced {
            Some(forced) => forced.clone(),
            None => self.signal.read_at(time),
        };
        if !self.samples.write(index, value.clone()) {
            tracing::debug!(port = %self.name, index, "sample below the released range");
        }
        self.callbacks.fire(time, &value.to_trace_value());
        self.last = Some((time, value.clone()));
        value
    }

    pub fn force(&mut self, value: T) {
        self.forced = Some(value);
    }

    pub fn buffered(&self) -> usize {
        self.samples.len()
    }
}

impl<T: SampleValue> Converter for DeToTdf<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn direction(&self) -> ConverterDirection {
        ConverterDirection::DeToTdf
    }

    fn value_type(&self) -> &'static str {
        T::type_name()
    }

    fn release_before(&mut self, index: u64) {
        self.samples.release_before(index);
    }

    fn de_callback(&mut self, _now: SimTime) -> bool {
        false
    }

    fn force_from_str(&mut self, input: &str) -> Result<()> {
        self.forced = Some(parse::<T>(input)?);
        Ok(())
    }

    fn release_force(&mut self) {
        self.forced = None;
    }

    fn is_forced(&self) -> bool {
        self.forced.is_some()
    }

    fn trace_value(&self) -> Option<TraceValue> {
        self.last.as_ref().map(|(_, v)| v.to_trace_value())
    }
}

impl<T: SampleValue> Traceable for DeToTdf<T> {
    fn trace_init(&mut self, descriptor: &mut TraceInfo) -> bool {
        descriptor.name = self.name.clone();
        descriptor.value_type = T::type_name().to_string();
        true
    }

    fn get_typed_trace_value(&self) -> TraceValue {
        self.trace_value().unwrap_or_else(|| T::default().to_trace_value())
    }

    fn register_trace_callback(&mut self, callback: TraceCallback) -> usize {
        self.callbacks.register(callback)
    }

    fn remove_trace_callback(&mut self, id: usize) -> bool {
        self.callbacks.remove(id)
    }
}

/// Writes TDF samples onto a DE signal.
#[derive(Debug)]
pub struct TdfToDe<T: SampleValue> {
    name: String,
    signal: DeSignal<T>,
    queue: DeclusterQueue<T>,
    forced: Option<T>,
    last: Option<(SimTime, T)>,
    writes: u64,
    callbacks: TraceCallbacks,
}

impl<T: SampleValue> TdfToDe<T> {
    pub fn new(name: impl Into<String>, signal: DeSignal<T>) -> Self {
        Self {
            name: name.into(),
            signal,
            queue: DeclusterQueue::new(),
            forced: None,
            last: None,
            writes: 0,
            callbacks: TraceCallbacks::new(),
        }
    }

    pub fn signal(&self) -> &DeSignal<T> {
        &self.signal
    }

    /// Queues a produced sample.
    pub fn push(&mut self, time: SimTime, value: T) {
        self.queue.push(time, value);
    }

    pub fn queue(&self) -> &DeclusterQueue<T> {
        &self.queue
    }

    pub fn force(&mut self, value: T) {
        self.forced = Some(value);
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }
}

impl<T: SampleValue> Converter for TdfToDe<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn direction(&self) -> ConverterDirection {
        ConverterDirection::TdfToDe
    }

    fn value_type(&self) -> &'static str {
        T::type_name()
    }

    fn release_before(&mut self, _index: u64) {}

    fn de_callback(&mut self, now: SimTime) -> bool {
        let Some(produced) = self.queue.pop(now) else {
            return false;
        };
        let value = self.forced.clone().unwrap_or(produced);
        self.signal.write_at(now, value.clone());
        self.writes += 1;
        self.callbacks.fire(now, &value.to_trace_value());
        self.last = Some((now, value));
        true
    }

    fn force_from_str(&mut self, input: &str) -> Result<()> {
        self.forced = Some(parse::<T>(input)?);
        Ok(())
    }

    fn release_force(&mut self) {
        self.forced = None;
    }

    fn is_forced(&self) -> bool {
        self.forced.is_some()
    }

    fn trace_value(&self) -> Option<TraceValue> {
        self.last.as_ref().map(|(_, v)| v.to_trace_value())
    }
}

impl<T: SampleValue> Traceable for TdfToDe<T> {
    fn trace_init(&mut self, descriptor: &mut TraceInfo) -> bool {
        descriptor.name = self.name.clone();
        descriptor.value_type = T::type_name().to_string();
        true
    }

    fn get_typed_trace_value(&self) -> TraceValue {
        self.trace_value().unwrap_or_else(|| T::default().to_trace_value())
    }

    fn register_trace_callback(&mut self, callback: TraceCallback) -> usize {
        self.callbacks.register(callback)
    }

    fn remove_trace_callback(&mut self, id: usize) -> bool {
        self.callbacks.remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns(v: u64) -> SimTime {
        SimTime::from_ns(v)
    }

    #[test]
    fn test_de_to_tdf_samples_once() {
        let sig = DeSignal::new("in", 0.0);
        sig.write_at(ns(10), 1.0);
        let mut port = DeToTdf::new("m.in", sig.clone());

        assert_eq!(port.sample(0, ns(5)), 0.0);
        assert_eq!(port.sample(1, ns(10)), 1.0);
        // A later write at the same time does not change an already taken sample.
        sig.write_at(ns(10), 2.0);
        assert_eq!(port.sample(1, ns(10)), 1.0);

        port.release_before(1);
        assert_eq!(port.buffered(), 1);
    }

    #[test]
    fn test_force_from_string() {
        let sig = DeSignal::new("in", 0i64);
        let mut port = DeToTdf::new("m.in", sig);
        assert!(port.force_from_str("abc").is_err());
        assert!(!port.is_forced());
        port.force_from_str(" 42 ").unwrap();
        assert_eq!(port.sample(0, ns(0)), 42);
        port.release_force();
        assert_eq!(port.sample(1, ns(1)), 0);
    }

    #[test]
    fn test_tdf_to_de_one_value_per_callback() {
        let sig = DeSignal::new("out", 0.0);
        let mut port = TdfToDe::new("m.out", sig.clone());
        port.push(ns(0), 1.0);
        port.push(ns(10), 2.0);

        assert!(port.de_callback(ns(0)));
        assert_eq!(sig.read_at(ns(0)), 1.0);
        assert!(port.de_callback(ns(10)));
        assert_eq!(sig.read_at(ns(10)), 2.0);
        // Queue exhausted: the last value is repeated.
        assert!(port.de_callback(ns(20)));
        assert_eq!(port.queue().fallback_count(), 1);
        assert_eq!(port.writes(), 3);
        assert_eq!(port.get_typed_trace_value(), TraceValue::Real(2.0));
    }
}
