//! Resistor, capacitor and inductor.

use crate::eqn::{ContributesEquations, SolutionView, StampContext};
use crate::param::{ParamError, Parameter};
use crate::types::NodeId;

/// Linear resistor between `p` and `n`.
#[derive(Clone, Debug)]
pub struct Resistor {
    name: String,
    p: NodeId,
    n: NodeId,
    value: Parameter<f64>,
    current: f64,
}

impl Resistor {
    pub fn new(name: impl Into<String>, p: NodeId, n: NodeId, ohms: f64) -> Self {
        let name = name.into();
        Self {
            value: Parameter::new(format!("{name}.value"), ohms),
            name,
            p,
            n,
            current: 0.0,
        }
    }

    pub fn resistance(&self) -> f64 {
        *self.value.get()
    }

    /// Changes the resistance. Takes effect at the next evaluation.
    pub fn set_resistance(&mut self, ohms: f64) -> Result<(), ParamError> {
        self.value.set(ohms)
    }

    pub fn parameter_mut(&mut self) -> &mut Parameter<f64> {
        &mut self.value
    }

    /// Current from `p` to `n` in the last solution.
    pub fn current(&self) -> f64 {
        self.current
    }
}

impl ContributesEquations for Resistor {
    fn name(&self) -> &str {
        &self.name
    }

    fn terminals(&self) -> Vec<(&'static str, NodeId)> {
        vec![("p", self.p), ("n", self.n)]
    }

    fn matrix_stamps(&mut self, ctx: &mut StampContext<'_>) {
        let (p, n) = (ctx.index(self.p), ctx.index(self.n));
        ctx.conductance_b(p, n, 1.0 / self.resistance());
    }

    fn post_solve(&mut self, view: &SolutionView<'_>) {
        self.current = (view.value(self.p) - view.value(self.n)) / self.resistance();
    }

    fn take_coefficient_change(&mut self) -> bool {
        self.value.take_changed()
    }
}

/// Linear capacitor between `p` and `n`.
#[derive(Clone, Debug)]
pub struct Capacitor {
    name: String,
    p: NodeId,
    n: NodeId,
    value: Parameter<f64>,
    voltage: f64,
}

impl Capacitor {
    pub fn new(name: impl Into<String>, p: NodeId, n: NodeId, farads: f64) -> Self {
        let name = name.into();
        Self {
            value: Parameter::new(format!("{name}.value"), farads),
            name,
            p,
            n,
            voltage: 0.0,
        }
    }

    pub fn capacitance(&self) -> f64 {
        *self.value.get()
    }

    pub fn set_capacitance(&mut self, farads: f64) -> Result<(), ParamError> {
        self.value.set(farads)
    }

    /// Voltage across the capacitor in the last solution.
    pub fn voltage(&self) -> f64 {
        self.voltage
    }
}

impl ContributesEquations for Capacitor {
    fn name(&self) -> &str {
        &self.name
    }

    fn terminals(&self) -> Vec<(&'static str, NodeId)> {
        vec![("p", self.p), ("n", self.n)]
    }

    fn matrix_stamps(&mut self, ctx: &mut StampContext<'_>) {
        let (p, n) = (ctx.index(self.p), ctx.index(self.n));
        ctx.conductance_a(p, n, self.capacitance());
    }

    fn post_solve(&mut self, view: &SolutionView<'_>) {
        self.voltage = view.value(self.p) - view.value(self.n);
    }

    fn take_coefficient_change(&mut self) -> bool {
        self.value.take_changed()
    }
}

/// Linear inductor between `p` and `n`. Adds its branch current as an unknown.
#[derive(Clone, Debug)]
pub struct Inductor {
    name: String,
    p: NodeId,
    n: NodeId,
    value: Parameter<f64>,
    branch: Option<usize>,
    current: f64,
}

impl Inductor {
    pub fn new(name: impl Into<String>, p: NodeId, n: NodeId, henries: f64) -> Self {
        let name = name.into();
        Self {
            value: Parameter::new(format!("{name}.value"), henries),
            name,
            p,
            n,
            branch: None,
            current: 0.0,
        }
    }

    pub fn inductance(&self) -> f64 {
        *self.value.get()
    }

    pub fn set_inductance(&mut self, henries: f64) -> Result<(), ParamError> {
        self.value.set(henries)
    }

    /// Branch current from `p` to `n` in the last solution.
    pub fn current(&self) -> f64 {
        self.current
    }

    /// Index of the branch current unknown after the first build.
    pub fn branch_index(&self) -> Option<usize> {
        self.branch
    }
}

impl ContributesEquations for Inductor {
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
        // v(p) - v(n) - L di/dt = 0
        ctx.add_b(p, k, 1.0);
        ctx.add_b(n, k, -1.0);
        ctx.add_b(k, p, 1.0);
        ctx.add_b(k, n, -1.0);
        ctx.add_a(k, k, -self.inductance());
    }

    fn post_solve(&mut self, view: &SolutionView<'_>) {
        if let Some(k) = self.branch {
            self.current = view.unknown(k);
        }
    }

    fn take_coefficient_change(&mut self) -> bool {
        self.value.take_changed()
    }
}
