//! Electrical primitives driven by or sampled into TDF ports.
//!
//! The value of a TDF-controlled source is written through
//! [`ContributesEquations::set_tdf_input`] before each evaluation, and a
//! sink's sample is read through [`ContributesEquations::tdf_output`] after
//! it. [`crate::tdf::ContinuousModule`] does both on its ports.

use crate::eqn::{ContributesEquations, SolutionView, StampContext};
use crate::types::NodeId;

/// Voltage source whose value is `scale * input`.
#[derive(Clone, Debug)]
pub struct TdfVsource {
    name: String,
    p: NodeId,
    n: NodeId,
    scale: f64,
    input: f64,
    branch: Option<usize>,
    current: f64,
}

impl TdfVsource {
    pub fn new(name: impl Into<String>, p: NodeId, n: NodeId) -> Self {
        Self {
            name: name.into(),
            p,
            n,
            scale: 1.0,
            input: 0.0,
            branch: None,
            current: 0.0,
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn current(&self) -> f64 {
        self.current
    }
}

impl ContributesEquations for TdfVsource {
    fn name(&self) -> &str {
        &self.name
    }

    fn terminals(&self) -> Vec<(&'static str, NodeId)> {
        vec![("p", self.p), ("n", self.n)]
    }

    fn matrix_stamps(&mut self, ctx: &mut StampContext<'_>) {
        let (p, n) = (ctx.index(self.p), ctx.index(self.n));
        let k = Some(ctx.add_equation());
        self.branch = k;
        ctx.add_b(p, k, 1.0);
        ctx.add_b(n, k, -1.0);
        ctx.add_b(k, p, 1.0);
        ctx.add_b(k, n, -1.0);
        ctx.add_q(k, self.scale * self.input);
    }

    fn post_solve(&mut self, view: &SolutionView<'_>) {
        if let Some(k) = self.branch {
            self.current = view.unknown(k);
        }
    }

    fn set_tdf_input(&mut self, value: f64) -> bool {
        self.input = value;
        true
    }
}

/// Current source whose value is `scale * input`, flowing from `p` through the source to `n`.
#[derive(Clone, Debug)]
pub struct TdfIsource {
    name: String,
    p: NodeId,
    n: NodeId,
    scale: f64,
    input: f64,
}

impl TdfIsource {
    pub fn new(name: impl Into<String>, p: NodeId, n: NodeId) -> Self {
        Self {
            name: name.into(),
            p,
            n,
            scale: 1.0,
            input: 0.0,
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }
}

impl ContributesEquations for TdfIsource {
    fn name(&self) -> &str {
        &self.name
    }

    fn terminals(&self) -> Vec<(&'static str, NodeId)> {
        vec![("p", self.p), ("n", self.n)]
    }

    fn matrix_stamps(&mut self, ctx: &mut StampContext<'_>) {
        let (p, n) = (ctx.index(self.p), ctx.index(self.n));
        let value = self.scale * self.input;
        ctx.add_q(p, -value);
        ctx.add_q(n, value);
    }

    fn set_tdf_input(&mut self, value: f64) -> bool {
        self.input = value;
        true
    }
}

/// Samples `scale * v(p, n)` for a TDF output. Contributes no coefficients.
#[derive(Clone, Debug)]
pub struct TdfVsink {
    name: String,
    p: NodeId,
    n: NodeId,
    scale: f64,
    output: f64,
}

impl TdfVsink {
    pub fn new(name: impl Into<String>, p: NodeId, n: NodeId) -> Self {
        Self {
            name: name.into(),
            p,
            n,
            scale: 1.0,
            output: 0.0,
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }
}

impl ContributesEquations for TdfVsink {
    fn name(&self) -> &str {
        &self.name
    }

    fn terminals(&self) -> Vec<(&'static str, NodeId)> {
        vec![("p", self.p), ("n", self.n)]
    }

    fn matrix_stamps(&mut self, _ctx: &mut StampContext<'_>) {}

    fn post_solve(&mut self, view: &SolutionView<'_>) {
        self.output = self.scale * (view.value(self.p) - view.value(self.n));
    }

    fn tdf_output(&self) -> Option<f64> {
        Some(self.output)
    }
}
