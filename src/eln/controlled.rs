//! Controlled sources and ideal two-ports.

use crate::eqn::{ContributesEquations, SolutionView, StampContext};
use crate::param::{ParamError, Parameter};
use crate::types::NodeId;

/// Voltage-controlled voltage source: `v(np, nn) = gain * v(ncp, ncn)`.
#[derive(Clone, Debug)]
pub struct Vcvs {
    name: String,
    ncp: NodeId,
    ncn: NodeId,
    np: NodeId,
    nn: NodeId,
    gain: Parameter<f64>,
    branch: Option<usize>,
}

impl Vcvs {
    pub fn new(
        name: impl Into<String>,
        ncp: NodeId,
        ncn: NodeId,
        np: NodeId,
        nn: NodeId,
        gain: f64,
    ) -> Self {
        let name = name.into();
        Self {
            gain: Parameter::new(format!("{name}.gain"), gain),
            name,
            ncp,
            ncn,
            np,
            nn,
            branch: None,
        }
    }

    pub fn set_gain(&mut self, gain: f64) -> Result<(), ParamError> {
        self.gain.set(gain)
    }
}

impl ContributesEquations for Vcvs {
    fn name(&self) -> &str {
        &self.name
    }

    fn terminals(&self) -> Vec<(&'static str, NodeId)> {
        vec![("ncp", self.ncp), ("ncn", self.ncn), ("np", self.np), ("nn", self.nn)]
    }

    fn matrix_stamps(&mut self, ctx: &mut StampContext<'_>) {
        let (cp, cn) = (ctx.index(self.ncp), ctx.index(self.ncn));
        let (p, n) = (ctx.index(self.np), ctx.index(self.nn));
        let k = Some(ctx.add_equation());
        self.branch = k;
        let gain = *self.gain.get();
        ctx.add_b(p, k, 1.0);
        ctx.add_b(n, k, -1.0);
        ctx.add_b(k, p, 1.0);
        ctx.add_b(k, n, -1.0);
        ctx.add_b(k, cp, -gain);
        ctx.add_b(k, cn, gain);
    }

    fn take_coefficient_change(&mut self) -> bool {
        self.gain.take_changed()
    }
}

/// Voltage-controlled current source: `gain * v(ncp, ncn)` flows from `np` through the source to `nn`.
#[derive(Clone, Debug)]
pub struct Vccs {
    name: String,
    ncp: NodeId,
    ncn: NodeId,
    np: NodeId,
    nn: NodeId,
    gain: Parameter<f64>,
}

impl Vccs {
    pub fn new(
        name: impl Into<String>,
        ncp: NodeId,
        ncn: NodeId,
        np: NodeId,
        nn: NodeId,
        transconductance: f64,
    ) -> Self {
        let name = name.into();
        Self {
            gain: Parameter::new(format!("{name}.gain"), transconductance),
            name,
            ncp,
            ncn,
            np,
            nn,
        }
    }

    pub fn set_gain(&mut self, transconductance: f64) -> Result<(), ParamError> {
        self.gain.set(transconductance)
    }
}

impl ContributesEquations for Vccs {
    fn name(&self) -> &str {
        &self.name
    }

    fn terminals(&self) -> Vec<(&'static str, NodeId)> {
        vec![("ncp", self.ncp), ("ncn", self.ncn), ("np", self.np), ("nn", self.nn)]
    }

    fn matrix_stamps(&mut self, ctx: &mut StampContext<'_>) {
        let (cp, cn) = (ctx.index(self.ncp), ctx.index(self.ncn));
        let (p, n) = (ctx.index(self.np), ctx.index(self.nn));
        let g = *self.gain.get();
        ctx.add_b(p, cp, g);
        ctx.add_b(p, cn, -g);
        ctx.add_b(n, cp, -g);
        ctx.add_b(n, cn, g);
    }

    fn take_coefficient_change(&mut self) -> bool {
        self.gain.take_changed()
    }
}

/// Nullor: a nullator between `nip`/`nin` (zero voltage, zero current)
/// paired with a norator between `nop`/`non` (arbitrary current).
#[derive(Clone, Debug)]
pub struct Nullor {
    name: String,
    nip: NodeId,
    nin: NodeId,
    nop: NodeId,
    non: NodeId,
    branch: Option<usize>,
    current: f64,
}

impl Nullor {
    pub fn new(name: impl Into<String>, nip: NodeId, nin: NodeId, nop: NodeId, non: NodeId) -> Self {
        Self {
            name: name.into(),
            nip,
            nin,
            nop,
            non,
            branch: None,
            current: 0.0,
        }
    }

    /// Norator current from `nop` to `non`.
    pub fn current(&self) -> f64 {
        self.current
    }
}

impl ContributesEquations for Nullor {
    fn name(&self) -> &str {
        &self.name
    }

    fn terminals(&self) -> Vec<(&'static str, NodeId)> {
        vec![("nip", self.nip), ("nin", self.nin), ("nop", self.nop), ("non", self.non)]
    }

    fn matrix_stamps(&mut self, ctx: &mut StampContext<'_>) {
        let (ip, in_) = (ctx.index(self.nip), ctx.index(self.nin));
        let (op, on) = (ctx.index(self.nop), ctx.index(self.non));
        let k = Some(ctx.add_equation());
        self.branch = k;
        ctx.add_b(k, ip, 1.0);
        ctx.add_b(k, in_, -1.0);
        ctx.add_b(op, k, 1.0);
        ctx.add_b(on, k, -1.0);
    }

    fn post_solve(&mut self, view: &SolutionView<'_>) {
        if let Some(k) = self.branch {
            self.current = view.unknown(k);
        }
    }
}

/// Gyrator: `i1 = g1 * v2`, `i2 = -g2 * v1`, port currents flowing into `p1` and `p2`.
#[derive(Clone, Debug)]
pub struct Gyrator {
    name: String,
    p1: NodeId,
    n1: NodeId,
    p2: NodeId,
    n2: NodeId,
    g1: f64,
    g2: f64,
}

impl Gyrator {
    pub fn new(
        name: impl Into<String>,
        p1: NodeId,
        n1: NodeId,
        p2: NodeId,
        n2: NodeId,
        g1: f64,
        g2: f64,
    ) -> Self {
        Self {
            name: name.into(),
            p1,
            n1,
            p2,
            n2,
            g1,
            g2,
        }
    }
}

impl ContributesEquations for Gyrator {
    fn name(&self) -> &str {
        &self.name
    }

    fn terminals(&self) -> Vec<(&'static str, NodeId)> {
        vec![("p1", self.p1), ("n1", self.n1), ("p2", self.p2), ("n2", self.n2)]
    }

    fn matrix_stamps(&mut self, ctx: &mut StampContext<'_>) {
        let (p1, n1) = (ctx.index(self.p1), ctx.index(self.n1));
        let (p2, n2) = (ctx.index(self.p2), ctx.index(self.n2));
        ctx.add_b(p1, p2, self.g1);
        ctx.add_b(p1, n2, -self.g1);
        ctx.add_b(n1, p2, -self.g1);
        ctx.add_b(n1, n2, self.g1);

        ctx.add_b(p2, p1, -self.g2);
        ctx.add_b(p2, n1, self.g2);
        ctx.add_b(n2, p1, self.g2);
        ctx.add_b(n2, n1, -self.g2);
    }
}

/// Ideal transformer with turns ratio `n`: `v1 = n * v2`, `i2 = -n * i1`.
#[derive(Clone, Debug)]
pub struct IdealTransformer {
    name: String,
    p1: NodeId,
    n1: NodeId,
    p2: NodeId,
    n2: NodeId,
    ratio: f64,
    branch: Option<usize>,
    primary_current: f64,
}

impl IdealTransformer {
    pub fn new(
        name: impl Into<String>,
        p1: NodeId,
        n1: NodeId,
        p2: NodeId,
        n2: NodeId,
        ratio: f64,
    ) -> Self {
        Self {
            name: name.into(),
            p1,
            n1,
            p2,
            n2,
            ratio,
            branch: None,
            primary_current: 0.0,
        }
    }

    /// Current into `p1`.
    pub fn primary_current(&self) -> f64 {
        self.primary_current
    }
}

impl ContributesEquations for IdealTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    fn terminals(&self) -> Vec<(&'static str, NodeId)> {
        vec![("p1", self.p1), ("n1", self.n1), ("p2", self.p2), ("n2", self.n2)]
    }

    fn matrix_stamps(&mut self, ctx: &mut StampContext<'_>) {
        let (p1, n1) = (ctx.index(self.p1), ctx.index(self.n1));
        let (p2, n2) = (ctx.index(self.p2), ctx.index(self.n2));
        let k = Some(ctx.add_equation());
        self.branch = k;
        let ratio = self.ratio;
        ctx.add_b(p1, k, 1.0);
        ctx.add_b(n1, k, -1.0);
        ctx.add_b(p2, k, -ratio);
        ctx.add_b(n2, k, ratio);
        ctx.add_b(k, p1, 1.0);
        ctx.add_b(k, n1, -1.0);
        ctx.add_b(k, p2, -ratio);
        ctx.add_b(k, n2, ratio);
    }

    fn post_solve(&mut self, view: &SolutionView<'_>) {
        if let Some(k) = self.branch {
            self.primary_current = view.unknown(k);
        }
    }
}
