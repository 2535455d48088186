//! Sample storage behind TDF signals.
//!
//! Every signal has one writer and any number of readers. Samples are kept
//! by absolute index in a [`SampleBuffer`]. A reader whose port has a delay
//! `d` sees `d` initial values of its own before the signal's sample 0.

use std::collections::HashMap;

use crate::buffer::SampleBuffer;
use crate::eqn::AsAny;
use crate::tdf::SampleValue;
use crate::trace::TraceValue;
use crate::types::PortId;

/// Type-erased view of a [`TypedSignal`].
pub trait ErasedSignal: AsAny + Send {
    fn name(&self) -> &str;

    fn type_name(&self) -> &'static str;

    /// One past the highest written sample index.
    fn end_index(&self) -> u64;

    fn release_before(&mut self, index: u64);

    fn latest_trace_value(&self) -> Option<TraceValue>;

    fn buffered(&self) -> usize;
}

#[derive(Debug)]
pub struct TypedSignal<T: SampleValue> {
    name: String,
    buffer: SampleBuffer<T>,
    reader_initial: HashMap<PortId, Vec<T>>,
}

impl<T: SampleValue> TypedSignal<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buffer: SampleBuffer::new(),
            reader_initial: HashMap::new(),
        }
    }

    pub fn write(&mut self, index: u64, value: T) -> bool {
        self.buffer.write(index, value)
    }

    pub fn get(&self, index: u64) -> Option<&T> {
        self.buffer.get(index)
    }

    /// Sets initial value `k` seen by a delayed reader.
    pub fn set_reader_initial(&mut self, reader: PortId, k: usize, delay: usize, value: T) {
        let values = self
            .reader_initial
            .entry(reader)
            .or_insert_with(|| vec![T::default(); delay]);
        if values.len() < delay {
            values.resize(delay, T::default());
        }
        values[k] = value;
    }

    pub fn reader_initial(&self, reader: PortId, k: usize) -> T {
        self.reader_initial
            .get(&reader)
            .and_then(|values| values.get(k))
            .cloned()
            .unwrap_or_default()
    }

    pub fn latest(&self) -> Option<(u64, &T)> {
        self.buffer.last_written()
    }
}

impl<T: SampleValue> ErasedSignal for TypedSignal<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &'static str {
        T::type_name()
    }

    fn end_index(&self) -> u64 {
        self.buffer.end_index()
    }

    fn release_before(&mut self, index: u64) {
        self.buffer.release_before(index);
    }

    fn latest_trace_value(&self) -> Option<TraceValue> {
        self.latest().map(|(_, v)| v.to_trace_value())
    }

    fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
