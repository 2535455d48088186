//! Per-cluster linear solver driver.
//!
//! The solver owns the equation system of one cluster. It assigns unknown
//! indices, rebuilds `A`, `B` and `q` from the primitives for every
//! evaluation, decides whether the cached LU factorization is still valid
//! and solves for the unknown vector.
//!
//! A factorization is reused while the discretized matrix is provably the
//! same: identical `A` and `B` (bitwise), the same analysis, the same
//! integration rule and the same step size.

use std::collections::HashMap;
use std::fmt::Write as _;

use nalgebra::{DMatrix, DVector, Dyn, LU};
use nalgebra_sparse::CscMatrix;
use serde::Serialize;

use crate::eqn::matrix::SparseMatrix;
use crate::eqn::stamp::{AcStampContext, ContributesEquations, SolutionView, StampContext, StampMode};
use crate::eqn::{Analysis, IntegrationMethod};
use crate::error::{AmsError, Result};
use crate::types::{CScalar, ClusterId, NodeId, SimTime};

/// Lifecycle of a cluster solver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SolverState {
    Uninitialized,
    Indexed,
    Factorized,
    Solved,
}

/// Counters exported with the simulator statistics.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SolverStats {
    pub builds: u64,
    pub full_builds: u64,
    pub factorizations: u64,
    pub solves: u64,
    pub ac_solves: u64,
    pub dimension: usize,
    pub nnz_a: usize,
    pub nnz_b: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FactorKey {
    analysis: Analysis,
    rule: IntegrationMethod,
    timestep: SimTime,
}

pub struct LinearSolver {
    cluster: ClusterId,
    nodes: Vec<NodeId>,
    node_index: HashMap<NodeId, usize>,
    state: SolverState,
    method: IntegrationMethod,
    tolerance: f64,
    a: SparseMatrix,
    b: SparseMatrix,
    a_csc: CscMatrix<f64>,
    b_csc: CscMatrix<f64>,
    q: Vec<f64>,
    q_prev: Vec<f64>,
    dimension: usize,
    x: DVector<f64>,
    x_prev: DVector<f64>,
    lu: Option<LU<f64, Dyn, Dyn>>,
    row_scale: DVector<f64>,
    factor_key: Option<FactorKey>,
    built_for: Option<Analysis>,
    has_history: bool,
    ac_solution: Option<DVector<CScalar>>,
    stats: SolverStats,
}

impl LinearSolver {
    /// Creates a solver for the given non-reference nodes, in index order.
    pub fn new(
        cluster: ClusterId,
        nodes: Vec<NodeId>,
        method: IntegrationMethod,
        tolerance: f64,
    ) -> Self {
        Self {
            cluster,
            nodes,
            node_index: HashMap::new(),
            state: SolverState::Uninitialized,
            method,
            tolerance,
            a: SparseMatrix::new(),
            b: SparseMatrix::new(),
            a_csc: CscMatrix::zeros(0, 0),
            b_csc: CscMatrix::zeros(0, 0),
            q: Vec::new(),
            q_prev: Vec::new(),
            dimension: 0,
            x: DVector::zeros(0),
            x_prev: DVector::zeros(0),
            lu: None,
            row_scale: DVector::zeros(0),
            factor_key: None,
            built_for: None,
            has_history: false,
            ac_solution: None,
            stats: SolverStats::default(),
        }
    }

    pub fn cluster(&self) -> ClusterId {
        self.cluster
    }

    pub fn state(&self) -> SolverState {
        self.state
    }

    pub fn method(&self) -> IntegrationMethod {
        self.method
    }

    /// Changes the integration method. The next step refactorizes.
    pub fn set_method(&mut self, method: IntegrationMethod) {
        if self.method != method {
            self.method = method;
            self.factor_key = None;
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    pub fn node_index(&self) -> &HashMap<NodeId, usize> {
        &self.node_index
    }

    /// Matrices and right-hand side of the most recent build.
    pub fn system(&self) -> (&SparseMatrix, &SparseMatrix, &[f64]) {
        (&self.a, &self.b, self.q.as_slice())
    }

    /// Compressed-column `A` and `B` of the most recent full build, sized
    /// to the current dimension. Transient history terms are evaluated on
    /// these.
    pub fn compressed_system(&self) -> (&CscMatrix<f64>, &CscMatrix<f64>) {
        (&self.a_csc, &self.b_csc)
    }

    /// Current solution vector.
    pub fn solution(&self) -> &DVector<f64> {
        &self.x
    }

    pub fn ac_solution(&self) -> Option<&DVector<CScalar>> {
        self.ac_solution.as_ref()
    }

    /// Value of a node in the current solution, zero for nodes without an unknown.
    pub fn value(&self, node: NodeId) -> f64 {
        self.node_index
            .get(&node)
            .and_then(|&i| self.x.get(i))
            .copied()
            .unwrap_or(0.0)
    }

    /// Small-signal phasor of a node from the last AC solve.
    pub fn ac_value(&self, node: NodeId) -> Option<CScalar> {
        let i = *self.node_index.get(&node)?;
        self.ac_solution.as_ref()?.get(i).copied()
    }

    /// Assigns node unknowns to indices `0..nodes.len()`.
    pub fn assign_indices(&mut self) {
        self.node_index = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, &node)| (node, i))
            .collect();
        self.resize(self.nodes.len());
        self.state = SolverState::Indexed;
        tracing::debug!(cluster = self.cluster, unknowns = self.nodes.len(), "cluster indexed");
    }

    /// Drops history so the next transient step starts with Euler.
    pub fn reset_history(&mut self) {
        self.has_history = false;
    }

    fn resize(&mut self, n: usize) {
        if n == self.dimension && self.x.len() == n {
            return;
        }
        let copy = |old: &DVector<f64>| {
            let mut v = DVector::zeros(n);
            for i in 0..n.min(old.len()) {
                v[i] = old[i];
            }
            v
        };
        self.x = copy(&self.x);
        self.x_prev = copy(&self.x_prev);
        self.q_prev.resize(n, 0.0);
        self.dimension = n;
        self.lu = None;
        self.factor_key = None;
        self.stats.dimension = n;
    }

    /// Rebuilds the system from the primitives.
    ///
    /// A full build happens on the first evaluation of an analysis kind, when
    /// any primitive is time-variant, or when a coefficient changed. Otherwise
    /// only `q` is rebuilt. Returns whether `A`, `B` or the dimension changed.
    pub fn build(
        &mut self,
        primitives: &mut [Box<dyn ContributesEquations>],
        analysis: Analysis,
        time: SimTime,
        timestep: SimTime,
    ) -> bool {
        if self.state == SolverState::Uninitialized {
            self.assign_indices();
        }

        let mut coefficient_change = false;
        let mut time_variant = false;
        for p in primitives.iter_mut() {
            coefficient_change |= p.take_coefficient_change();
            time_variant |= !p.is_time_invariant();
        }
        let full = self.built_for != Some(analysis) || time_variant || coefficient_change;
        let mode = if full { StampMode::Full } else { StampMode::RhsOnly };

        let mut a = SparseMatrix::new();
        let mut b = SparseMatrix::new();
        let mut q = vec![0.0; self.nodes.len()];
        let (next_equation, refactor_requested) = {
            let mut ctx = StampContext {
                mode,
                analysis,
                time,
                timestep,
                node_index: &self.node_index,
                a: &mut a,
                b: &mut b,
                q: &mut q,
                previous: &self.x_prev,
                next_equation: self.nodes.len(),
                refactor_requested: false,
            };
            for p in primitives.iter_mut() {
                p.matrix_stamps(&mut ctx);
            }
            (ctx.next_equation, ctx.refactor_requested)
        };

        self.stats.builds += 1;
        let mut changed = false;
        let resized = next_equation != self.dimension;
        if resized {
            self.resize(next_equation);
            self.state = SolverState::Indexed;
            changed = true;
        }
        q.resize(next_equation, 0.0);
        self.q = q;

        if full {
            self.stats.full_builds += 1;
            if a != self.a || b != self.b {
                changed = true;
            }
            self.a = a;
            self.b = b;
            self.built_for = Some(analysis);
            self.stats.nnz_a = self.a.nnz();
            self.stats.nnz_b = self.b.nnz();
        }
        if full || resized {
            self.a_csc = self.a.to_csc(self.dimension);
            self.b_csc = self.b.to_csc(self.dimension);
        }

        if changed || refactor_requested {
            self.lu = None;
            self.factor_key = None;
            if self.state != SolverState::Uninitialized {
                self.state = SolverState::Indexed;
            }
        }
        changed
    }

    fn factorize(&mut self, mut matrix: DMatrix<f64>, key: FactorKey) -> Result<()> {
        let diagnostic = self.pivot_check(&matrix);
        let row_scale = equilibrate_rows(&mut matrix, |v| v.abs());
        let lu = matrix.lu();
        let u = lu.u();
        let mut max_d: f64 = 0.0;
        let mut min_d = f64::INFINITY;
        for k in 0..u.nrows().min(u.ncols()) {
            let d = u[(k, k)].abs();
            max_d = max_d.max(d);
            min_d = min_d.min(d);
        }
        if self.dimension > 0 && !(min_d > self.tolerance * max_d && max_d > 0.0) {
            let mut message = format!("pivot ratio {:.3e} below tolerance", min_d / max_d.max(f64::MIN_POSITIVE));
            if !diagnostic.is_empty() {
                let _ = write!(message, "; empty rows: {}", diagnostic);
            }
            self.lu = None;
            self.factor_key = None;
            return Err(AmsError::SingularSystem {
                cluster: self.cluster,
                message,
            });
        }
        self.lu = Some(lu);
        self.row_scale = row_scale;
        self.factor_key = Some(key);
        self.state = SolverState::Factorized;
        self.stats.factorizations += 1;
        tracing::trace!(cluster = self.cluster, analysis = %key.analysis, "factorized");
        Ok(())
    }

    fn pivot_check(&self, matrix: &DMatrix<f64>) -> String {
        let mut empty = Vec::new();
        for r in 0..matrix.nrows() {
            if matrix.row(r).iter().all(|v| *v == 0.0) {
                match self.nodes.get(r) {
                    Some(node) => empty.push(format!("node {}", node)),
                    None => empty.push(format!("equation {}", r)),
                }
            }
        }
        empty.join(", ")
    }

    fn solve_factored(&self, rhs: &DVector<f64>) -> Result<DVector<f64>> {
        let lu = self.lu.as_ref().ok_or_else(|| AmsError::SingularSystem {
            cluster: self.cluster,
            message: "no valid factorization".to_string(),
        })?;
        let scaled = rhs.component_div(&self.row_scale);
        lu.solve(&scaled).ok_or_else(|| AmsError::SingularSystem {
            cluster: self.cluster,
            message: "back substitution failed".to_string(),
        })
    }

    fn finish(&mut self, x: DVector<f64>, analysis: Analysis, time: SimTime, primitives: &mut [Box<dyn ContributesEquations>]) {
        self.x = x;
        self.x_prev = self.x.clone();
        self.q_prev = self.q.clone();
        self.state = SolverState::Solved;
        self.stats.solves += 1;
        let view = SolutionView {
            analysis,
            time,
            x: &self.x,
            node_index: &self.node_index,
        };
        for p in primitives.iter_mut() {
            p.post_solve(&view);
        }
    }

    /// Solves the DC operating point `B x = q`.
    pub fn solve_dc(
        &mut self,
        primitives: &mut [Box<dyn ContributesEquations>],
        time: SimTime,
    ) -> Result<()> {
        self.build(primitives, Analysis::Dc, time, SimTime::ZERO);
        let key = FactorKey {
            analysis: Analysis::Dc,
            rule: IntegrationMethod::Euler,
            timestep: SimTime::ZERO,
        };
        if self.lu.is_none() || self.factor_key != Some(key) {
            let m = self.b.to_dense(self.dimension);
            self.factorize(m, key)?;
        }
        let rhs = DVector::from_column_slice(&self.q);
        let x = self.solve_factored(&rhs)?;
        self.finish(x, Analysis::Dc, time, primitives);
        self.has_history = false;
        Ok(())
    }

    /// Advances one transient step of size `h` ending at `time`.
    pub fn step(
        &mut self,
        primitives: &mut [Box<dyn ContributesEquations>],
        time: SimTime,
        h: SimTime,
    ) -> Result<()> {
        if h.is_zero() {
            return Err(AmsError::Elaboration {
                component: format!("cluster {}", self.cluster),
                message: "transient step with zero timestep".to_string(),
            });
        }
        let rule = if self.method == IntegrationMethod::Trapezoidal && self.has_history {
            IntegrationMethod::Trapezoidal
        } else {
            IntegrationMethod::Euler
        };
        self.build(primitives, Analysis::Transient, time, h);

        let h_secs = h.as_secs_f64();
        let scale = match rule {
            IntegrationMethod::Euler => 1.0 / h_secs,
            IntegrationMethod::Trapezoidal => 2.0 / h_secs,
        };
        let key = FactorKey {
            analysis: Analysis::Transient,
            rule,
            timestep: h,
        };
        if self.lu.is_none() || self.factor_key != Some(key) {
            let mut m = self.b.to_dense(self.dimension);
            self.a.add_scaled_into(&mut m, scale);
            self.factorize(m, key)?;
        }

        let q = DVector::from_column_slice(&self.q);
        let a_x = (&self.a_csc * &self.x_prev) * scale;
        let rhs = match rule {
            IntegrationMethod::Euler => q + a_x,
            IntegrationMethod::Trapezoidal => {
                let q_prev = DVector::from_column_slice(&self.q_prev);
                let b_x = &self.b_csc * &self.x_prev;
                q + q_prev + a_x - b_x
            }
        };
        let x = self.solve_factored(&rhs)?;
        self.finish(x, Analysis::Transient, time, primitives);
        self.has_history = true;
        Ok(())
    }

    /// Solves the small-signal system at angular frequency `omega`.
    pub fn solve_ac(
        &mut self,
        primitives: &mut [Box<dyn ContributesEquations>],
        omega: f64,
    ) -> Result<DVector<CScalar>> {
        self.build(primitives, Analysis::Ac, SimTime::ZERO, SimTime::ZERO);
        let n = self.dimension;
        let mut m = DMatrix::<CScalar>::zeros(n, n);
        for (r, c, v) in self.b.iter() {
            m[(r, c)] += CScalar::new(v, 0.0);
        }
        for (r, c, v) in self.a.iter() {
            m[(r, c)] += CScalar::new(0.0, omega * v);
        }
        let mut q = DVector::<CScalar>::zeros(n);
        {
            let mut ctx = AcStampContext {
                omega,
                node_index: &self.node_index,
                matrix: &mut m,
                q: &mut q,
            };
            for p in primitives.iter_mut() {
                p.ac_stamps(&mut ctx);
            }
        }

        let row_scale = equilibrate_rows(&mut m, |v| v.norm());
        for (k, scale) in row_scale.iter().enumerate() {
            q[k] /= *scale;
        }
        let lu = m.lu();
        let u = lu.u();
        let mut max_d: f64 = 0.0;
        let mut min_d = f64::INFINITY;
        for k in 0..n {
            let d = u[(k, k)].norm();
            max_d = max_d.max(d);
            min_d = min_d.min(d);
        }
        if n > 0 && !(min_d > self.tolerance * max_d && max_d > 0.0) {
            return Err(AmsError::SingularSystem {
                cluster: self.cluster,
                message: format!("small-signal matrix singular at omega = {}", omega),
            });
        }
        let x = lu.solve(&q).ok_or_else(|| AmsError::SingularSystem {
            cluster: self.cluster,
            message: format!("small-signal back substitution failed at omega = {}", omega),
        })?;
        self.stats.ac_solves += 1;
        self.ac_solution = Some(x.clone());
        Ok(x)
    }
}

/// Divides every row by its largest magnitude so pivot ratios compare
/// conductance rows and branch rows on the same footing. Empty rows keep a
/// scale of one. Returns the applied scales.
fn equilibrate_rows<T>(matrix: &mut DMatrix<T>, magnitude: impl Fn(&T) -> f64) -> DVector<f64>
where
    T: nalgebra::Scalar + Copy + std::ops::DivAssign<f64>,
{
    let mut scales = DVector::from_element(matrix.nrows(), 1.0);
    for r in 0..matrix.nrows() {
        let largest = matrix.row(r).iter().map(&magnitude).fold(0.0, f64::max);
        if largest > 0.0 {
            scales[r] = largest;
            for v in matrix.row_mut(r).iter_mut() {
                *v /= largest;
            }
        }
    }
    scales
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eln::{Capacitor, Resistor, Vsource};
    use approx::assert_relative_eq;

    const GND: NodeId = 0;

    fn divider() -> (LinearSolver, Vec<Box<dyn ContributesEquations>>) {
        // node 1 -- r1 -- node 2 -- r2 -- gnd, source on node 1
        let prims: Vec<Box<dyn ContributesEquations>> = vec![
            Box::new(Vsource::dc("v1", 1, GND, 10.0)),
            Box::new(Resistor::new("r1", 1, 2, 1000.0)),
            Box::new(Resistor::new("r2", 2, GND, 1000.0)),
        ];
        let solver = LinearSolver::new(0, vec![1, 2], IntegrationMethod::Euler, 1e-12);
        (solver, prims)
    }

    #[test]
    fn test_dc_divider() {
        let (mut solver, mut prims) = divider();
        solver.solve_dc(&mut prims, SimTime::ZERO).unwrap();

        assert_eq!(solver.state(), SolverState::Solved);
        assert_eq!(solver.dimension(), 3);
        assert_relative_eq!(solver.value(1), 10.0, epsilon = 1e-12);
        assert_relative_eq!(solver.value(2), 5.0, epsilon = 1e-12);
        // Branch current of the source: 10 V over 2 kOhm, flowing out of node 1.
        assert_relative_eq!(solver.solution()[2], -0.005, epsilon = 1e-12);
    }

    #[test]
    fn test_compressed_system_matches_stamps() {
        let (mut solver, mut prims) = divider();
        solver.solve_dc(&mut prims, SimTime::ZERO).unwrap();
        let (a, b) = solver.compressed_system();
        assert_eq!(a.nnz(), 0);
        assert_eq!((b.nrows(), b.ncols()), (3, 3));
        assert_eq!(b.nnz(), solver.system().1.nnz());
        let dense = DMatrix::from(b);
        assert_relative_eq!(dense[(1, 1)], 2e-3);
        assert_relative_eq!(dense[(0, 1)], -1e-3);
        assert_eq!(dense[(2, 0)], 1.0);
    }

    #[test]
    fn test_build_is_idempotent() {
        let (mut solver, mut prims) = divider();
        solver.build(&mut prims, Analysis::Dc, SimTime::ZERO, SimTime::ZERO);
        let (a1, b1, q1) = {
            let (a, b, q) = solver.system();
            (a.clone(), b.clone(), q.to_vec())
        };
        // Force a second full build through a different analysis and back.
        solver.build(&mut prims, Analysis::Transient, SimTime::ZERO, SimTime::from_ns(1));
        let changed = solver.build(&mut prims, Analysis::Dc, SimTime::ZERO, SimTime::ZERO);

        let (a2, b2, q2) = solver.system();
        assert!(!changed);
        assert_eq!(&a1, a2);
        assert_eq!(&b1, b2);
        assert_eq!(q1.as_slice(), q2);
    }

    #[test]
    fn test_factorization_reused() {
        let (mut solver, mut prims) = divider();
        solver.solve_dc(&mut prims, SimTime::ZERO).unwrap();
        solver.solve_dc(&mut prims, SimTime::ZERO).unwrap();
        assert_eq!(solver.stats().factorizations, 1);
        assert_eq!(solver.stats().solves, 2);
        assert_eq!(solver.stats().full_builds, 1);
    }

    #[test]
    fn test_floating_node_is_singular() {
        let mut prims: Vec<Box<dyn ContributesEquations>> = vec![
            Box::new(Vsource::dc("v1", 1, GND, 1.0)),
            Box::new(Resistor::new("r1", 1, GND, 100.0)),
        ];
        let mut solver = LinearSolver::new(4, vec![1, 2], IntegrationMethod::Euler, 1e-12);
        let err = solver.solve_dc(&mut prims, SimTime::ZERO).unwrap_err();
        match err {
            AmsError::SingularSystem { cluster, message } => {
                assert_eq!(cluster, 4);
                assert!(message.contains("node 2"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_rc_step_euler() {
        // 1 V step into R = 1k, C = 1u: tau = 1 ms.
        let mut prims: Vec<Box<dyn ContributesEquations>> = vec![
            Box::new(Vsource::dc("v1", 1, GND, 1.0)),
            Box::new(Resistor::new("r1", 1, 2, 1000.0)),
            Box::new(Capacitor::new("c1", 2, GND, 1e-6)),
        ];
        let mut solver = LinearSolver::new(0, vec![1, 2], IntegrationMethod::Euler, 1e-12);
        let h = SimTime::from_us(10);
        let mut t = SimTime::ZERO;
        for _ in 0..100 {
            t += h;
            solver.step(&mut prims, t, h).unwrap();
        }
        // After one time constant the capacitor is close to 1 - 1/e.
        let v = solver.value(2);
        assert!((v - 0.632).abs() < 0.01, "v = {v}");
        assert_eq!(solver.stats().factorizations, 1);
    }

    #[test]
    fn test_trapezoidal_switches_after_first_step() {
        let mut prims: Vec<Box<dyn ContributesEquations>> = vec![
            Box::new(Vsource::dc("v1", 1, GND, 1.0)),
            Box::new(Resistor::new("r1", 1, 2, 1000.0)),
            Box::new(Capacitor::new("c1", 2, GND, 1e-6)),
        ];
        let mut solver = LinearSolver::new(0, vec![1, 2], IntegrationMethod::Trapezoidal, 1e-12);
        let h = SimTime::from_us(10);
        solver.step(&mut prims, h, h).unwrap();
        solver.step(&mut prims, h * 2, h).unwrap();
        solver.step(&mut prims, h * 3, h).unwrap();
        // Euler first, then one trapezoidal factorization reused.
        assert_eq!(solver.stats().factorizations, 2);

        let mut t = h * 3;
        for _ in 0..97 {
            t += h;
            solver.step(&mut prims, t, h).unwrap();
        }
        let v = solver.value(2);
        assert!((v - 0.632).abs() < 0.01, "v = {v}");
    }

    #[test]
    fn test_timestep_change_refactorizes() {
        let mut prims: Vec<Box<dyn ContributesEquations>> = vec![
            Box::new(Vsource::dc("v1", 1, GND, 1.0)),
            Box::new(Resistor::new("r1", 1, 2, 1000.0)),
            Box::new(Capacitor::new("c1", 2, GND, 1e-6)),
        ];
        let mut solver = LinearSolver::new(0, vec![1, 2], IntegrationMethod::Euler, 1e-12);
        solver.step(&mut prims, SimTime::from_us(10), SimTime::from_us(10)).unwrap();
        solver.step(&mut prims, SimTime::from_us(20), SimTime::from_us(10)).unwrap();
        solver.step(&mut prims, SimTime::from_us(25), SimTime::from_us(5)).unwrap();
        assert_eq!(solver.stats().factorizations, 2);
    }

    #[test]
    fn test_zero_timestep_rejected() {
        let (mut solver, mut prims) = divider();
        assert!(solver.step(&mut prims, SimTime::ZERO, SimTime::ZERO).is_err());
    }

    #[test]
    fn test_ac_rc_corner() {
        let mut prims: Vec<Box<dyn ContributesEquations>> = vec![
            Box::new(Vsource::dc("v1", 1, GND, 0.0).with_ac(1.0, 0.0)),
            Box::new(Resistor::new("r1", 1, 2, 1000.0)),
            Box::new(Capacitor::new("c1", 2, GND, 1e-6)),
        ];
        let mut solver = LinearSolver::new(0, vec![1, 2], IntegrationMethod::Euler, 1e-12);
        // At omega = 1/RC the magnitude is 1/sqrt(2).
        solver.solve_ac(&mut prims, 1000.0).unwrap();
        let v = solver.ac_value(2).unwrap();
        assert_relative_eq!(v.norm(), 1.0 / 2f64.sqrt(), epsilon = 1e-9);
        assert_relative_eq!(v.arg(), -std::f64::consts::FRAC_PI_4, epsilon = 1e-9);
    }
}
