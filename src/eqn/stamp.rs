//! The primitive contribution interface.
//!
//! Every ELN and LSF primitive implements [`ContributesEquations`]. During
//! a build the cluster's solver hands each primitive a [`StampContext`] and
//! the primitive adds its coefficients to the shared system
//!
//! ```text
//! A * dx/dt + B * x = q(t)
//! ```
//!
//! Contributions always accumulate. Two primitives touching the same entry
//! add up; no primitive overwrites another's coefficient.

use std::any::Any;
use std::collections::HashMap;

use nalgebra::{DMatrix, DVector};

use crate::eqn::matrix::SparseMatrix;
use crate::eqn::Analysis;
use crate::types::{CScalar, NodeId, SimTime};

/// Downcasting support for boxed primitives.
///
/// Call through the trait object (`boxed.as_ref().as_any()`); on the `Box`
/// itself the blanket impl resolves to the box type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A linear primitive that contributes to its cluster's equation system.
pub trait ContributesEquations: AsAny + Send {
    /// Hierarchical instance name used in diagnostics.
    fn name(&self) -> &str;

    /// Nodes this primitive connects to. Used for clustering.
    fn terminals(&self) -> Vec<(&'static str, NodeId)>;

    /// Adds real coefficients for DC, transient and AC builds.
    fn matrix_stamps(&mut self, ctx: &mut StampContext<'_>);

    /// Adds complex small-signal sources or coefficients for AC analysis.
    fn ac_stamps(&mut self, _ctx: &mut AcStampContext<'_>) {}

    /// Called after every successful solve of the cluster.
    fn post_solve(&mut self, _view: &SolutionView<'_>) {}

    /// Whether the `A` and `B` contributions are constant for a given analysis.
    ///
    /// Sources whose value varies over time are still time-invariant here as
    /// long as the variation only reaches `q`.
    fn is_time_invariant(&self) -> bool {
        true
    }

    /// Reports and clears a pending coefficient change.
    fn take_coefficient_change(&mut self) -> bool {
        false
    }

    /// Accepts a value from a TDF input. Returns `false` if the primitive has no such input.
    fn set_tdf_input(&mut self, _value: f64) -> bool {
        false
    }

    /// Latest value for a TDF output, if the primitive drives one.
    fn tdf_output(&self) -> Option<f64> {
        None
    }
}

/// Whether a build touches the matrices or only the right-hand side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StampMode {
    Full,
    RhsOnly,
}

/// Write access to the real system during a build.
pub struct StampContext<'a> {
    pub(crate) mode: StampMode,
    pub(crate) analysis: Analysis,
    pub(crate) time: SimTime,
    pub(crate) timestep: SimTime,
    pub(crate) node_index: &'a HashMap<NodeId, usize>,
    pub(crate) a: &'a mut SparseMatrix,
    pub(crate) b: &'a mut SparseMatrix,
    pub(crate) q: &'a mut Vec<f64>,
    pub(crate) previous: &'a DVector<f64>,
    pub(crate) next_equation: usize,
    pub(crate) refactor_requested: bool,
}

impl<'a> StampContext<'a> {
    pub fn analysis(&self) -> Analysis {
        self.analysis
    }

    /// Time of the evaluation being built.
    pub fn time(&self) -> SimTime {
        self.time
    }

    /// Step size of a transient evaluation; zero otherwise.
    pub fn timestep(&self) -> SimTime {
        self.timestep
    }

    pub fn mode(&self) -> StampMode {
        self.mode
    }

    /// Unknown index of a node, `None` for reference nodes.
    pub fn index(&self, node: NodeId) -> Option<usize> {
        self.node_index.get(&node).copied()
    }

    /// Allocates an extra unknown and its equation row.
    ///
    /// Indices are handed out in call order, so a primitive that adds its
    /// equations in the same order on every build keeps the same indices.
    pub fn add_equation(&mut self) -> usize {
        let k = self.next_equation;
        self.next_equation += 1;
        if self.q.len() <= k {
            self.q.resize(k + 1, 0.0);
        }
        k
    }

    pub fn add_a(&mut self, row: Option<usize>, col: Option<usize>, value: f64) {
        if self.mode == StampMode::RhsOnly {
            return;
        }
        if let (Some(r), Some(c)) = (row, col) {
            self.a.add(r, c, value);
        }
    }

    pub fn add_b(&mut self, row: Option<usize>, col: Option<usize>, value: f64) {
        if self.mode == StampMode::RhsOnly {
            return;
        }
        if let (Some(r), Some(c)) = (row, col) {
            self.b.add(r, c, value);
        }
    }

    pub fn add_q(&mut self, row: Option<usize>, value: f64) {
        if let Some(r) = row {
            if self.q.len() <= r {
                self.q.resize(r + 1, 0.0);
            }
            self.q[r] += value;
        }
    }

    /// Two-terminal conductance pattern in `B`.
    pub fn conductance_b(&mut self, p: Option<usize>, n: Option<usize>, g: f64) {
        self.add_b(p, p, g);
        self.add_b(n, n, g);
        self.add_b(p, n, -g);
        self.add_b(n, p, -g);
    }

    /// Two-terminal conductance pattern in `A`.
    pub fn conductance_a(&mut self, p: Option<usize>, n: Option<usize>, c: f64) {
        self.add_a(p, p, c);
        self.add_a(n, n, c);
        self.add_a(p, n, -c);
        self.add_a(n, p, -c);
    }

    /// Value of an unknown in the previous solution.
    pub fn previous(&self, index: usize) -> f64 {
        self.previous.get(index).copied().unwrap_or(0.0)
    }

    /// Forces a new factorization even if the matrices compare equal.
    pub fn request_refactorization(&mut self) {
        self.refactor_requested = true;
    }
}

/// Write access to the complex small-signal system.
pub struct AcStampContext<'a> {
    pub(crate) omega: f64,
    pub(crate) node_index: &'a HashMap<NodeId, usize>,
    pub(crate) matrix: &'a mut DMatrix<CScalar>,
    pub(crate) q: &'a mut DVector<CScalar>,
}

impl<'a> AcStampContext<'a> {
    /// Angular frequency in rad/s.
    pub fn omega(&self) -> f64 {
        self.omega
    }

    pub fn index(&self, node: NodeId) -> Option<usize> {
        self.node_index.get(&node).copied()
    }

    pub fn add(&mut self, row: Option<usize>, col: Option<usize>, value: CScalar) {
        if let (Some(r), Some(c)) = (row, col) {
            if r < self.matrix.nrows() && c < self.matrix.ncols() {
                self.matrix[(r, c)] += value;
            }
        }
    }

    pub fn add_q(&mut self, row: Option<usize>, value: CScalar) {
        if let Some(r) = row {
            if r < self.q.len() {
                self.q[r] += value;
            }
        }
    }
}

/// Read access to a cluster solution.
pub struct SolutionView<'a> {
    pub(crate) analysis: Analysis,
    pub(crate) time: SimTime,
    pub(crate) x: &'a DVector<f64>,
    pub(crate) node_index: &'a HashMap<NodeId, usize>,
}

impl<'a> SolutionView<'a> {
    pub fn analysis(&self) -> Analysis {
        self.analysis
    }

    pub fn time(&self) -> SimTime {
        self.time
    }

    /// Potential or signal value of a node. Reference nodes read as zero.
    pub fn value(&self, node: NodeId) -> f64 {
        self.node_index
            .get(&node)
            .and_then(|&i| self.x.get(i))
            .copied()
            .unwrap_or(0.0)
    }

    /// Value of an unknown by index.
    pub fn unknown(&self, index: usize) -> f64 {
        self.x.get(index).copied().unwrap_or(0.0)
    }
}
