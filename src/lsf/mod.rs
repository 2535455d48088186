//! Linear signal flow primitives.
//!
//! LSF signals are non-conservative: each signal is a network node of kind
//! [`NodeKind::SignalFlow`](crate::network::NodeKind) whose equation row is
//! owned by the single primitive driving it. A block with output `y` stamps
//! `y - f(inputs) = 0` into that row.

use crate::buffer::{DelayBuffer, LookupStatus};
use crate::eln::Waveform;
use crate::eqn::{AcStampContext, Analysis, ContributesEquations, SolutionView, StampContext};
use crate::param::{ParamError, Parameter};
use crate::types::{CScalar, NodeId, SignedTime, SimTime};

/// Signal source `y = waveform(t)`.
#[derive(Clone, Debug)]
pub struct Source {
    name: String,
    y: NodeId,
    waveform: Waveform,
    ac_magnitude: f64,
    ac_phase: f64,
}

impl Source {
    pub fn new(name: impl Into<String>, y: NodeId, waveform: Waveform) -> Self {
        Self {
            name: name.into(),
            y,
            waveform,
            ac_magnitude: 0.0,
            ac_phase: 0.0,
        }
    }

    pub fn with_ac(mut self, magnitude: f64, phase: f64) -> Self {
        self.ac_magnitude = magnitude;
        self.ac_phase = phase;
        self
    }
}

impl ContributesEquations for Source {
    fn name(&self) -> &str {
        &self.name
    }

    fn terminals(&self) -> Vec<(&'static str, NodeId)> {
        vec![("y", self.y)]
    }

    fn matrix_stamps(&mut self, ctx: &mut StampContext<'_>) {
        let y = ctx.index(self.y);
        ctx.add_b(y, y, 1.0);
        let value = self.waveform.value_at(ctx.time());
        ctx.add_q(y, value);
    }

    fn ac_stamps(&mut self, ctx: &mut AcStampContext<'_>) {
        let y = ctx.index(self.y);
        ctx.add_q(y, CScalar::from_polar(self.ac_magnitude, self.ac_phase));
    }
}

/// `y = k * x`
#[derive(Clone, Debug)]
pub struct Gain {
    name: String,
    x: NodeId,
    y: NodeId,
    k: Parameter<f64>,
}

impl Gain {
    pub fn new(name: impl Into<String>, x: NodeId, y: NodeId, k: f64) -> Self {
        let name = name.into();
        Self {
            k: Parameter::new(format!("{name}.k"), k),
            name,
            x,
            y,
        }
    }

    pub fn set_gain(&mut self, k: f64) -> Result<(), ParamError> {
        self.k.set(k)
    }
}

impl ContributesEquations for Gain {
    fn name(&self) -> &str {
        &self.name
    }

    fn terminals(&self) -> Vec<(&'static str, NodeId)> {
        vec![("x", self.x), ("y", self.y)]
    }

    fn matrix_stamps(&mut self, ctx: &mut StampContext<'_>) {
        let (x, y) = (ctx.index(self.x), ctx.index(self.y));
        ctx.add_b(y, y, 1.0);
        ctx.add_b(y, x, -*self.k.get());
    }

    fn take_coefficient_change(&mut self) -> bool {
        self.k.take_changed()
    }
}

/// `y = k1 * x1 + k2 * x2`
#[derive(Clone, Debug)]
pub struct Add {
    name: String,
    x1: NodeId,
    x2: NodeId,
    y: NodeId,
    k1: f64,
    k2: f64,
}

impl Add {
    pub fn new(name: impl Into<String>, x1: NodeId, x2: NodeId, y: NodeId) -> Self {
        Self::weighted(name, x1, x2, y, 1.0, 1.0)
    }

    /// `y = x1 - x2`
    pub fn sub(name: impl Into<String>, x1: NodeId, x2: NodeId, y: NodeId) -> Self {
        Self::weighted(name, x1, x2, y, 1.0, -1.0)
    }

    pub fn weighted(
        name: impl Into<String>,
        x1: NodeId,
        x2: NodeId,
        y: NodeId,
        k1: f64,
        k2: f64,
    ) -> Self {
        Self {
            name: name.into(),
            x1,
            x2,
            y,
            k1,
            k2,
        }
    }
}

impl ContributesEquations for Add {
    fn name(&self) -> &str {
        &self.name
    }

    fn terminals(&self) -> Vec<(&'static str, NodeId)> {
        vec![("x1", self.x1), ("x2", self.x2), ("y", self.y)]
    }

    fn matrix_stamps(&mut self, ctx: &mut StampContext<'_>) {
        let (x1, x2, y) = (ctx.index(self.x1), ctx.index(self.x2), ctx.index(self.y));
        ctx.add_b(y, y, 1.0);
        ctx.add_b(y, x1, -self.k1);
        ctx.add_b(y, x2, -self.k2);
    }
}

/// `dy/dt = k * x`, with `y = y0` at the DC operating point.
#[derive(Clone, Debug)]
pub struct Integ {
    name: String,
    x: NodeId,
    y: NodeId,
    k: f64,
    y0: f64,
}

impl Integ {
    pub fn new(name: impl Into<String>, x: NodeId, y: NodeId, k: f64) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            k,
            y0: 0.0,
        }
    }

    pub fn with_initial(mut self, y0: f64) -> Self {
        self.y0 = y0;
        self
    }
}

impl ContributesEquations for Integ {
    fn name(&self) -> &str {
        &self.name
    }

    fn terminals(&self) -> Vec<(&'static str, NodeId)> {
        vec![("x", self.x), ("y", self.y)]
    }

    fn matrix_stamps(&mut self, ctx: &mut StampContext<'_>) {
        let (x, y) = (ctx.index(self.x), ctx.index(self.y));
        if ctx.analysis() == Analysis::Dc {
            ctx.add_b(y, y, 1.0);
            ctx.add_q(y, self.y0);
        } else {
            ctx.add_a(y, y, 1.0);
            ctx.add_b(y, x, -self.k);
        }
    }
}

/// `y = k * dx/dt`
#[derive(Clone, Debug)]
pub struct Dot {
    name: String,
    x: NodeId,
    y: NodeId,
    k: f64,
}

impl Dot {
    pub fn new(name: impl Into<String>, x: NodeId, y: NodeId, k: f64) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            k,
        }
    }
}

impl ContributesEquations for Dot {
    fn name(&self) -> &str {
        &self.name
    }

    fn terminals(&self) -> Vec<(&'static str, NodeId)> {
        vec![("x", self.x), ("y", self.y)]
    }

    fn matrix_stamps(&mut self, ctx: &mut StampContext<'_>) {
        let (x, y) = (ctx.index(self.x), ctx.index(self.y));
        ctx.add_b(y, y, 1.0);
        ctx.add_a(y, x, -self.k);
    }
}

/// Transport delay `y(t) = x(t - delay)`, `y = y0` until the first delayed sample exists.
///
/// The delayed value comes from the stored history of `x`. A zero delay
/// therefore lags by one evaluation.
#[derive(Clone, Debug)]
pub struct Delay {
    name: String,
    x: NodeId,
    y: NodeId,
    delay: SimTime,
    y0: f64,
    history: DelayBuffer<f64>,
}

impl Delay {
    pub fn new(name: impl Into<String>, x: NodeId, y: NodeId, delay: SimTime) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            delay,
            y0: 0.0,
            history: DelayBuffer::with_window(16, delay),
        }
    }

    pub fn with_initial(mut self, y0: f64) -> Self {
        self.y0 = y0;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.history = DelayBuffer::with_window(capacity, self.delay);
        self
    }

    pub fn history(&self) -> &DelayBuffer<f64> {
        &self.history
    }

    fn delayed_value(&self, t: SimTime) -> f64 {
        let target = SignedTime::from(t) - self.delay;
        let Some(earliest) = self.history.earliest() else {
            return self.y0;
        };
        if target < SignedTime::from(earliest) {
            return self.y0;
        }
        match self.history.query(target) {
            Some(hit) => {
                if hit.status == LookupStatus::NotAvailable {
                    tracing::trace!(primitive = %self.name, "delay reads latest stored sample");
                }
                hit.value
            }
            None => self.y0,
        }
    }
}

impl ContributesEquations for Delay {
    fn name(&self) -> &str {
        &self.name
    }

    fn terminals(&self) -> Vec<(&'static str, NodeId)> {
        vec![("x", self.x), ("y", self.y)]
    }

    fn matrix_stamps(&mut self, ctx: &mut StampContext<'_>) {
        let y = ctx.index(self.y);
        ctx.add_b(y, y, 1.0);
        let value = if ctx.analysis() == Analysis::Dc {
            self.y0
        } else {
            self.delayed_value(ctx.time())
        };
        ctx.add_q(y, value);
    }

    fn post_solve(&mut self, view: &SolutionView<'_>) {
        if view.analysis() != Analysis::Ac {
            self.history.store(view.time(), view.value(self.x));
        }
    }
}

/// Signal driven from a TDF input, `y = scale * input`.
#[derive(Clone, Debug)]
pub struct TdfSource {
    name: String,
    y: NodeId,
    scale: f64,
    input: f64,
}

impl TdfSource {
    pub fn new(name: impl Into<String>, y: NodeId) -> Self {
        Self {
            name: name.into(),
            y,
            scale: 1.0,
            input: 0.0,
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }
}

impl ContributesEquations for TdfSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn terminals(&self) -> Vec<(&'static str, NodeId)> {
        vec![("y", self.y)]
    }

    fn matrix_stamps(&mut self, ctx: &mut StampContext<'_>) {
        let y = ctx.index(self.y);
        ctx.add_b(y, y, 1.0);
        ctx.add_q(y, self.scale * self.input);
    }

    fn set_tdf_input(&mut self, value: f64) -> bool {
        self.input = value;
        true
    }
}

/// Samples `scale * x` for a TDF output.
#[derive(Clone, Debug)]
pub struct TdfSink {
    name: String,
    x: NodeId,
    scale: f64,
    output: f64,
}

impl TdfSink {
    pub fn new(name: impl Into<String>, x: NodeId) -> Self {
        Self {
            name: name.into(),
            x,
            scale: 1.0,
            output: 0.0,
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }
}

impl ContributesEquations for TdfSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn terminals(&self) -> Vec<(&'static str, NodeId)> {
        vec![("x", self.x)]
    }

    fn matrix_stamps(&mut self, _ctx: &mut StampContext<'_>) {}

    fn post_solve(&mut self, view: &SolutionView<'_>) {
        self.output = self.scale * view.value(self.x);
    }

    fn tdf_output(&self) -> Option<f64> {
        Some(self.output)
    }
}
