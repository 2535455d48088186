//! Sparse coefficient storage for the `A` and `B` matrices of a cluster.

use std::collections::BTreeMap;

use nalgebra::DMatrix;
use nalgebra_sparse::{CooMatrix, CscMatrix};

/// Row/column keyed accumulation matrix.
///
/// Entries are kept in row-major order so that two builds of the same
/// system produce identical iteration order. Equality is bitwise on the
/// stored values, which is what the refactorization check needs.
#[derive(Clone, Debug, Default)]
pub struct SparseMatrix {
    entries: BTreeMap<(usize, usize), f64>,
}

impl SparseMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `value` to entry `(row, col)`.
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        *self.entries.entry((row, col)).or_insert(0.0) += value;
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.entries.get(&(row, col)).copied().unwrap_or(0.0)
    }

    /// Number of structurally present entries.
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.entries.iter().map(|(&(r, c), &v)| (r, c, v))
    }

    /// Dense `n x n` copy scaled by `factor`, added onto `target`.
    pub fn add_scaled_into(&self, target: &mut DMatrix<f64>, factor: f64) {
        for (r, c, v) in self.iter() {
            if r < target.nrows() && c < target.ncols() {
                target[(r, c)] += factor * v;
            }
        }
    }

    pub fn to_dense(&self, n: usize) -> DMatrix<f64> {
        let mut m = DMatrix::zeros(n, n);
        self.add_scaled_into(&mut m, 1.0);
        m
    }

    /// Compressed-column copy of the `n x n` matrix.
    pub fn to_csc(&self, n: usize) -> CscMatrix<f64> {
        let mut coo = CooMatrix::new(n, n);
        for (r, c, v) in self.iter() {
            if r < n && c < n {
                coo.push(r, c, v);
            }
        }
        CscMatrix::from(&coo)
    }

    /// Largest row or column index plus one.
    pub fn extent(&self) -> usize {
        self.entries
            .keys()
            .map(|&(r, c)| r.max(c) + 1)
            .max()
            .unwrap_or(0)
    }
}

impl PartialEq for SparseMatrix {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(other.entries.iter())
                .all(|((ka, va), (kb, vb))| ka == kb && va.to_bits() == vb.to_bits())
    }
}
