//! Core type definitions shared across the crate.
//!
//! Identifiers are plain indices into the owning container (network,
//! TDF cluster or simulator). They are only meaningful for the container
//! that handed them out.

pub use crate::time::{SignedTime, SimTime};

/// Real scalar used for all analog quantities.
pub type Scalar = f64;

/// Complex scalar used by small-signal (AC) analysis.
pub type CScalar = num_complex::Complex<f64>;

/// Index of a node (electrical terminal or signal-flow signal) in a network.
pub type NodeId = usize;

/// Index of a primitive in a network, in insertion order.
pub type PrimitiveId = usize;

/// Index of an equation cluster inside a network.
pub type ClusterId = usize;

/// Index of a module inside a TDF cluster.
pub type ModuleId = usize;

/// Index of a port inside a TDF cluster.
pub type PortId = usize;

/// Index of a signal inside a TDF cluster.
pub type SignalId = usize;

/// Identifier of an executor registered with the simulator.
pub type ExecutorId = u32;
