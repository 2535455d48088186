//! Diagnostic reporting.
//!
//! Recoverable problems (port access outside the permitted phase, string
//! conversion failures on forced values, interpolation fallbacks) are not
//! returned to the caller as hard failures. They are recorded in a shared
//! [`Diagnostics`] sink and mirrored to `tracing` at the matching level.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::AmsError;
use crate::time::SimTime;

/// Diagnostic severity, ordered from least to most severe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// A single reported message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Hierarchical name of the reporting object
    pub source: String,
    pub message: String,
    /// Simulation time of the report, if known
    pub time: Option<SimTime>,
}

/// Shared, cloneable diagnostics sink.
///
/// Clones refer to the same underlying list, so a network, its clusters and
/// the simulator can all report into one place.
#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
    entries: Arc<Mutex<Vec<Diagnostic>>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a message and mirrors it to `tracing`.
    pub fn report(
        &self,
        severity: Severity,
        source: impl Into<String>,
        message: impl Into<String>,
        time: Option<SimTime>,
    ) {
        let diagnostic = Diagnostic {
            severity,
            source: source.into(),
            message: message.into(),
            time,
        };
        match severity {
            Severity::Info => tracing::info!(source = %diagnostic.source, "{}", diagnostic.message),
            Severity::Warning => tracing::warn!(source = %diagnostic.source, "{}", diagnostic.message),
            Severity::Error | Severity::Fatal => {
                tracing::error!(source = %diagnostic.source, severity = %severity, "{}", diagnostic.message)
            }
        }
        self.entries.lock().push(diagnostic);
    }

    /// Records an error at its own severity.
    pub fn report_error(&self, source: impl Into<String>, err: &AmsError, time: Option<SimTime>) {
        self.report(err.severity(), source, err.to_string(), time);
    }

    pub fn warning(&self, source: impl Into<String>, message: impl Into<String>) {
        self.report(Severity::Warning, source, message, None);
    }

    /// Returns a snapshot of all entries.
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.lock().clone()
    }

    /// Counts entries at exactly the given severity.
    pub fn count(&self, severity: Severity) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    /// True when any error or fatal entry was recorded.
    pub fn has_errors(&self) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|d| d.severity >= Severity::Error)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Removes and returns all entries.
    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.entries.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_sink() {
        let sink = Diagnostics::new();
        let clone = sink.clone();

        clone.warning("net.r1", "value changed while locked");
        sink.report(Severity::Error, "tdf.src", "bad access", Some(SimTime::from_ns(5)));

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.count(Severity::Warning), 1);
        assert!(sink.has_errors());

        let taken = clone.take();
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[1].time, Some(SimTime::from_ns(5)));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Error < Severity::Fatal);
        assert_eq!(Severity::Fatal.to_string(), "fatal");
    }
}
