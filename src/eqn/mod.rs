//! Equation system assembly and the per-cluster linear solver.
//!
//! Each cluster maintains
//!
//! ```text
//! A * dx/dt + B * x = q(t)
//! ```
//!
//! and discretizes it per evaluation:
//!
//! | Evaluation | Solved system |
//! |------------|---------------|
//! | DC | `B x = q` |
//! | Euler step | `(A/h + B) x_n = q_n + (A/h) x_{n-1}` |
//! | Trapezoidal step | `(2A/h + B) x_n = q_n + q_{n-1} + (2A/h - B) x_{n-1}` |
//! | AC at `w` | `(jwA + B) X = Q` |

pub mod matrix;
pub mod solver;
pub mod stamp;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use matrix::SparseMatrix;
pub use solver::{LinearSolver, SolverState, SolverStats};
pub use stamp::{AcStampContext, AsAny, ContributesEquations, SolutionView, StampContext, StampMode};

/// Time integration scheme for transient steps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationMethod {
    /// Backward Euler
    Euler,
    /// Trapezoidal rule. The first step after a DC solve or a reset uses Euler.
    #[default]
    Trapezoidal,
}

/// Kind of evaluation a build is performed for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Analysis {
    Dc,
    Transient,
    Ac,
}

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Analysis::Dc => "dc",
            Analysis::Transient => "transient",
            Analysis::Ac => "ac",
        };
        f.write_str(s)
    }
}
