//! Independent voltage and current sources.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::eqn::{AcStampContext, ContributesEquations, SolutionView, StampContext};
use crate::types::{CScalar, NodeId, SimTime};

/// Time-domain source value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Waveform {
    Dc(f64),
    /// `offset + amplitude * sin(2 pi f (t - delay) + phase)`, `offset` before `delay`
    Sine {
        offset: f64,
        amplitude: f64,
        frequency: f64,
        phase: f64,
        delay: SimTime,
    },
    /// `before` until `at`, `after` from then on
    Step { before: f64, after: f64, at: SimTime },
}

impl Waveform {
    pub fn sine(offset: f64, amplitude: f64, frequency: f64) -> Self {
        Waveform::Sine {
            offset,
            amplitude,
            frequency,
            phase: 0.0,
            delay: SimTime::ZERO,
        }
    }

    pub fn value_at(&self, t: SimTime) -> f64 {
        match *self {
            Waveform::Dc(v) => v,
            Waveform::Sine {
                offset,
                amplitude,
                frequency,
                phase,
                delay,
            } => {
                if t < delay {
                    offset
                } else {
                    let dt = (t - delay).as_secs_f64();
                    offset + amplitude * (2.0 * PI * frequency * dt + phase).sin()
                }
            }
            Waveform::Step { before, after, at } => {
                if t < at {
                    before
                } else {
                    after
                }
            }
        }
    }
}

fn phasor(magnitude: f64, phase: f64) -> CScalar {
    CScalar::from_polar(magnitude, phase)
}

/// Independent voltage source, `v(p) - v(n) = value(t)`.
#[derive(Clone, Debug)]
pub struct Vsource {
    name: String,
    p: NodeId,
    n: NodeId,
    waveform: Waveform,
    ac_magnitude: f64,
    ac_phase: f64,
    branch: Option<usize>,
    current: f64,
}

impl Vsource {
    pub fn new(name: impl Into<String>, p: NodeId, n: NodeId, waveform: Waveform) -> Self {
        Self {
            name: name.into(),
            p,
            n,
            waveform,
            ac_magnitude: 0.0,
            ac_phase: 0.0,
            branch: None,
            current: 0.0,
        }
    }

    pub fn dc(name: impl Into<String>, p: NodeId, n: NodeId, volts: f64) -> Self {
        Self::new(name, p, n, Waveform::Dc(volts))
    }

    /// Small-signal excitation used by AC analysis. Phase in radians.
    pub fn with_ac(mut self, magnitude: f64, phase: f64) -> Self {
        self.ac_magnitude = magnitude;
        self.ac_phase = phase;
        self
    }

    pub fn waveform(&self) -> &Waveform {
        &self.waveform
    }

    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    /// Current flowing into the source at `p`, through it, and out at `n`.
    pub fn current(&self) -> f64 {
        self.current
    }
}

impl ContributesEquations for Vsource {
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
        let value = self.waveform.value_at(ctx.time());
        ctx.add_q(k, value);
    }

    fn ac_stamps(&mut self, ctx: &mut AcStampContext<'_>) {
        ctx.add_q(self.branch, phasor(self.ac_magnitude, self.ac_phase));
    }

    fn post_solve(&mut self, view: &SolutionView<'_>) {
        if let Some(k) = self.branch {
            self.current = view.unknown(k);
        }
    }
}

/// Independent current source. The current flows from `p` through the source to `n`.
#[derive(Clone, Debug)]
pub struct Isource {
    name: String,
    p: NodeId,
    n: NodeId,
    waveform: Waveform,
    ac_magnitude: f64,
    ac_phase: f64,
}

impl Isource {
    pub fn new(name: impl Into<String>, p: NodeId, n: NodeId, waveform: Waveform) -> Self {
        Self {
            name: name.into(),
            p,
            n,
            waveform,
            ac_magnitude: 0.0,
            ac_phase: 0.0,
        }
    }

    pub fn dc(name: impl Into<String>, p: NodeId, n: NodeId, amps: f64) -> Self {
        Self::new(name, p, n, Waveform::Dc(amps))
    }

    pub fn with_ac(mut self, magnitude: f64, phase: f64) -> Self {
        self.ac_magnitude = magnitude;
        self.ac_phase = phase;
        self
    }

    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }
}

impl ContributesEquations for Isource {
    fn name(&self) -> &str {
        &self.name
    }

    fn terminals(&self) -> Vec<(&'static str, NodeId)> {
        vec![("p", self.p), ("n", self.n)]
    }

    fn matrix_stamps(&mut self, ctx: &mut StampContext<'_>) {
        let (p, n) = (ctx.index(self.p), ctx.index(self.n));
        let value = self.waveform.value_at(ctx.time());
        ctx.add_q(p, -value);
        ctx.add_q(n, value);
    }

    fn ac_stamps(&mut self, ctx: &mut AcStampContext<'_>) {
        let (p, n) = (ctx.index(self.p), ctx.index(self.n));
        let value = phasor(self.ac_magnitude, self.ac_phase);
        ctx.add_q(p, -value);
        ctx.add_q(n, value);
    }
}
