//! Execution phases of a TDF cluster.

use std::fmt;

use serde::Serialize;

/// Phase a module callback runs in. Port and attribute access is checked against it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Elaboration,
    SetAttributes,
    ChangeAttributes,
    Initialize,
    Reinitialize,
    Processing,
    Idle,
}

impl Phase {
    pub fn allows_read(self) -> bool {
        matches!(self, Phase::Processing | Phase::Initialize | Phase::Reinitialize)
    }

    pub fn allows_write(self) -> bool {
        self == Phase::Processing
    }

    /// Writing initial values for delayed samples.
    pub fn allows_initial_values(self) -> bool {
        matches!(self, Phase::Initialize | Phase::Reinitialize)
    }

    pub fn allows_attribute_change(self) -> bool {
        matches!(self, Phase::SetAttributes | Phase::ChangeAttributes)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Elaboration => "elaboration",
            Phase::SetAttributes => "set_attributes",
            Phase::ChangeAttributes => "change_attributes",
            Phase::Initialize => "initialize",
            Phase::Reinitialize => "reinitialize",
            Phase::Processing => "processing",
            Phase::Idle => "idle",
        };
        f.write_str(s)
    }
}
