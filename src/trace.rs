//! Tracing of simulation values.
//!
//! Objects that can be recorded implement [`Traceable`]. A [`Tracer`]
//! collects traceables as columns and writes one tab separated line per
//! recorded time point to any [`std::io::Write`].
//!
//! Converter ports and [`NodeProbe`] additionally accept trace callbacks
//! that fire whenever a new value is produced.

use std::fmt;
use std::io::{self, Write};

use nalgebra::DVector;

use crate::eqn::{ContributesEquations, SolutionView, StampContext};
use crate::types::{CScalar, NodeId, SimTime};

/// A traced value.
#[derive(Clone, Debug, PartialEq)]
pub enum TraceValue {
    Real(f64),
    Complex(CScalar),
    Bool(bool),
    Int(i64),
    Text(String),
}

impl fmt::Display for TraceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceValue::Real(v) => write!(f, "{}", v),
            TraceValue::Complex(c) => write!(f, "{}{:+}i", c.re, c.im),
            TraceValue::Bool(b) => f.write_str(if *b { "1" } else { "0" }),
            TraceValue::Int(i) => write!(f, "{}", i),
            TraceValue::Text(s) => f.write_str(s),
        }
    }
}

/// Column descriptor filled in by [`Traceable::trace_init`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TraceInfo {
    pub name: String,
    pub value_type: String,
}

pub type TraceCallback = Box<dyn FnMut(SimTime, &TraceValue) + Send>;

/// Registry of trace callbacks keyed by the id handed out on registration.
#[derive(Default)]
pub struct TraceCallbacks {
    next_id: usize,
    callbacks: Vec<(usize, TraceCallback)>,
}

impl TraceCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, callback: TraceCallback) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.callbacks.push((id, callback));
        id
    }

    pub fn remove(&mut self, id: usize) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|(cid, _)| *cid != id);
        before != self.callbacks.len()
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn fire(&mut self, time: SimTime, value: &TraceValue) {
        for (_, callback) in &mut self.callbacks {
            callback(time, value);
        }
    }
}

impl fmt::Debug for TraceCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceCallbacks")
            .field("registered", &self.callbacks.len())
            .finish()
    }
}

/// Something whose value can be recorded.
pub trait Traceable {
    /// Fills in the column descriptor. Returns false if the object cannot be traced.
    fn trace_init(&mut self, descriptor: &mut TraceInfo) -> bool;

    /// Current value.
    fn get_typed_trace_value(&self) -> TraceValue;

    /// Writes the current value of column `id`.
    fn trace(&self, _id: usize, writer: &mut dyn Write) -> io::Result<()> {
        write!(writer, "{}", self.get_typed_trace_value())
    }

    fn register_trace_callback(&mut self, callback: TraceCallback) -> usize;

    fn remove_trace_callback(&mut self, id: usize) -> bool;

    /// Extracts this object's value from an AC solution vector.
    fn calculate_ac_result(&self, _solution: &DVector<CScalar>) -> Option<TraceValue> {
        None
    }
}

/// Tab separated value recorder.
pub struct Tracer<W: Write> {
    writer: W,
    columns: Vec<TraceInfo>,
    header_written: bool,
    rows: u64,
}

impl<W: Write> Tracer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            columns: Vec::new(),
            header_written: false,
            rows: 0,
        }
    }

    /// Adds a column. Returns its id, or `None` if the object is not traceable.
    pub fn add(&mut self, item: &mut dyn Traceable) -> Option<usize> {
        let mut info = TraceInfo::default();
        if !item.trace_init(&mut info) {
            tracing::warn!(name = %info.name, "object is not traceable");
            return None;
        }
        self.columns.push(info);
        Some(self.columns.len() - 1)
    }

    pub fn columns(&self) -> &[TraceInfo] {
        &self.columns
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    fn write_header(&mut self) -> io::Result<()> {
        write!(self.writer, "time")?;
        for column in &self.columns {
            write!(self.writer, "\t{}", column.name)?;
        }
        writeln!(self.writer)?;
        self.header_written = true;
        Ok(())
    }

    /// Writes one line. `items` are given in column order.
    pub fn record(&mut self, time: SimTime, items: &[&dyn Traceable]) -> io::Result<()> {
        if !self.header_written {
            self.write_header()?;
        }
        write!(self.writer, "{}", time.as_secs_f64())?;
        for (id, item) in items.iter().enumerate() {
            write!(self.writer, "\t")?;
            item.trace(id, &mut self.writer)?;
        }
        writeln!(self.writer)?;
        self.rows += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Observes the value of one network node after every solve.
///
/// Added to a network like any primitive; it contributes no coefficients.
pub struct NodeProbe {
    name: String,
    node: NodeId,
    index: Option<usize>,
    value: f64,
    time: SimTime,
    callbacks: TraceCallbacks,
}

impl NodeProbe {
    pub fn new(name: impl Into<String>, node: NodeId) -> Self {
        Self {
            name: name.into(),
            node,
            index: None,
            value: 0.0,
            time: SimTime::ZERO,
            callbacks: TraceCallbacks::new(),
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Time of the last observed solve.
    pub fn time(&self) -> SimTime {
        self.time
    }
}

impl fmt::Debug for NodeProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeProbe")
            .field("name", &self.name)
            .field("node", &self.node)
            .field("value", &self.value)
            .finish()
    }
}

impl ContributesEquations for NodeProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn terminals(&self) -> Vec<(&'static str, NodeId)> {
        vec![("p", self.node)]
    }

    fn matrix_stamps(&mut self, ctx: &mut StampContext<'_>) {
        self.index = ctx.index(self.node);
    }

    fn post_solve(&mut self, view: &SolutionView<'_>) {
        self.value = view.value(self.node);
        self.time = view.time();
        let value = TraceValue::Real(self.value);
        self.callbacks.fire(self.time, &value);
    }
}

impl Traceable for NodeProbe {
    fn trace_init(&mut self, descriptor: &mut TraceInfo) -> bool {
        descriptor.name = self.name.clone();
        descriptor.value_type = "f64".to_string();
        true
    }

    fn get_typed_trace_value(&self) -> TraceValue {
        TraceValue::Real(self.value)
    }

    fn register_trace_callback(&mut self, callback: TraceCallback) -> usize {
        self.callbacks.register(callback)
    }

    fn remove_trace_callback(&mut self, id: usize) -> bool {
        self.callbacks.remove(id)
    }

    fn calculate_ac_result(&self, solution: &DVector<CScalar>) -> Option<TraceValue> {
        let i = self.index?;
        solution.get(i).copied().map(TraceValue::Complex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct Constant(f64);

    impl Traceable for Constant {
        fn trace_init(&mut self, descriptor: &mut TraceInfo) -> bool {
            descriptor.name = format!("c{}", self.0);
            true
        }

        fn get_typed_trace_value(&self) -> TraceValue {
            TraceValue::Real(self.0)
        }

        fn register_trace_callback(&mut self, _callback: TraceCallback) -> usize {
            0
        }

        fn remove_trace_callback(&mut self, _id: usize) -> bool {
            false
        }
    }

    #[test]
    fn test_tracer_output() {
        let mut a = Constant(1.5);
        let mut b = Constant(2.0);
        let mut tracer = Tracer::new(Vec::new());
        assert_eq!(tracer.add(&mut a), Some(0));
        assert_eq!(tracer.add(&mut b), Some(1));
        tracer.record(SimTime::from_ms(1), &[&a, &b]).unwrap();

        let text = String::from_utf8(tracer.into_inner()).unwrap();
        assert_eq!(text, "time\tc1.5\tc2\n0.001\t1.5\t2\n");
    }

    #[test]
    fn test_callbacks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut callbacks = TraceCallbacks::new();
        let sink = seen.clone();
        let id = callbacks.register(Box::new(move |t, v| sink.lock().push((t, v.clone()))));
        callbacks.fire(SimTime::from_ns(1), &TraceValue::Bool(true));
        assert!(callbacks.remove(id));
        assert!(!callbacks.remove(id));
        callbacks.fire(SimTime::from_ns(2), &TraceValue::Bool(false));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1.to_string(), "1");
    }

    #[test]
    fn test_complex_display() {
        let v = TraceValue::Complex(CScalar::new(1.0, -0.5));
        assert_eq!(v.to_string(), "1-0.5i");
    }
}
