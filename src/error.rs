//! Error types for elaboration, solving and dataflow execution.

use thiserror::Error;

use crate::config::ConfigError;
use crate::param::ParamError;
use crate::report::Severity;
use crate::tdf::Phase;
use crate::time::SimTime;
use crate::types::ClusterId;

/// Errors raised by networks, TDF clusters and the simulator.
#[derive(Error, Debug)]
pub enum AmsError {
    #[error("{component}: terminal `{terminal}` is not bound")]
    UnboundTerminal { component: String, terminal: String },

    #[error("{component}: {message}")]
    Elaboration { component: String, message: String },

    #[error("inconsistent rates at {location}: {message}")]
    RateInconsistent { location: String, message: String },

    #[error("inconsistent timestep at {location}: {message}")]
    TimestepInconsistent { location: String, message: String },

    #[error("{cluster}: attribute propagation did not settle after {iterations} iterations")]
    PropagationNotConverged { cluster: String, iterations: usize },

    #[error("{port}: sample id {sample} is not below the port delay {delay}")]
    SampleIdExceedsDelay {
        port: String,
        sample: usize,
        delay: usize,
    },

    #[error("{port}: sample id {sample} is not below the port rate {rate}")]
    SampleIdExceedsRate {
        port: String,
        sample: usize,
        rate: usize,
    },

    #[error("{port}: sample {index} is not available")]
    SampleNotAvailable { port: String, index: u64 },

    #[error("equation cluster {cluster} is singular: {message}")]
    SingularSystem { cluster: ClusterId, message: String },

    #[error("{port}: {operation} is not permitted during {phase}")]
    AccessViolation {
        port: String,
        operation: &'static str,
        phase: Phase,
    },

    #[error("{port}: port belongs to another module")]
    ForeignPort { port: String },

    #[error("{port}: port value type is {expected}, not {found}")]
    TypeMismatch {
        port: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("zero-delay cycle through modules {modules}")]
    AlgebraicLoop { modules: String },

    #[error("cannot convert `{input}` to {target}")]
    Conversion { target: String, input: String },

    #[error("unknown {kind} {id}")]
    UnknownId { kind: &'static str, id: usize },

    #[error("time {time} is before current time {now}")]
    TimeOrder { time: SimTime, now: SimTime },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Param(#[from] ParamError),
}

impl AmsError {
    /// Severity used when the error is mirrored into a diagnostics sink.
    pub fn severity(&self) -> Severity {
        match self {
            AmsError::Conversion { .. } => Severity::Warning,
            AmsError::SingularSystem { .. }
            | AmsError::AlgebraicLoop { .. }
            | AmsError::PropagationNotConverged { .. } => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

/// Result type for fallible operations in this crate.
pub type Result<T> = std::result::Result<T, AmsError>;
