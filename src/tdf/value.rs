//! Value types carried by TDF signals and converter ports.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::trace::TraceValue;

/// Type hook for sample streams.
///
/// `Default` is the value read from an unwritten initial sample and the
/// value returned by a read that is not permitted in the current phase.
pub trait SampleValue:
    Clone + Default + PartialEq + fmt::Debug + fmt::Display + FromStr + Send + Sync + 'static
{
    /// Short type name used in diagnostics.
    fn type_name() -> &'static str;

    fn to_trace_value(&self) -> TraceValue {
        TraceValue::Text(self.to_string())
    }
}

impl SampleValue for f64 {
    fn type_name() -> &'static str {
        "f64"
    }

    fn to_trace_value(&self) -> TraceValue {
        TraceValue::Real(*self)
    }
}

impl SampleValue for bool {
    fn type_name() -> &'static str {
        "bool"
    }

    fn to_trace_value(&self) -> TraceValue {
        TraceValue::Bool(*self)
    }
}

impl SampleValue for i64 {
    fn type_name() -> &'static str {
        "i64"
    }

    fn to_trace_value(&self) -> TraceValue {
        TraceValue::Int(*self)
    }
}

/// Four-valued digital logic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Logic {
    Zero,
    One,
    /// Unknown
    #[default]
    X,
    /// High impedance
    Z,
}

impl Logic {
    pub fn from_bool(b: bool) -> Self {
        if b {
            Logic::One
        } else {
            Logic::Zero
        }
    }

    /// `Some` for the two driven levels.
    pub fn to_bool(self) -> Option<bool> {
        match self {
            Logic::Zero => Some(false),
            Logic::One => Some(true),
            Logic::X | Logic::Z => None,
        }
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            Logic::Zero => '0',
            Logic::One => '1',
            Logic::X => 'X',
            Logic::Z => 'Z',
        };
        write!(f, "{}", c)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseLogicError(String);

impl fmt::Display for ParseLogicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid logic value `{}`", self.0)
    }
}

impl std::error::Error for ParseLogicError {}

impl FromStr for Logic {
    type Err = ParseLogicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0" => Ok(Logic::Zero),
            "1" => Ok(Logic::One),
            "x" | "X" => Ok(Logic::X),
            "z" | "Z" => Ok(Logic::Z),
            other => Err(ParseLogicError(other.to_string())),
        }
    }
}

impl SampleValue for Logic {
    fn type_name() -> &'static str {
        "logic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logic_parse() {
        assert_eq!("1".parse::<Logic>(), Ok(Logic::One));
        assert_eq!(" z ".parse::<Logic>(), Ok(Logic::Z));
        assert!("2".parse::<Logic>().is_err());
        assert_eq!(Logic::default(), Logic::X);
        assert_eq!(Logic::from_bool(false).to_string(), "0");
        assert_eq!(Logic::Z.to_bool(), None);
    }

    #[test]
    fn test_trace_values() {
        assert_eq!(2.5f64.to_trace_value(), TraceValue::Real(2.5));
        assert_eq!(Logic::One.to_trace_value(), TraceValue::Text("1".into()));
        assert_eq!(<i64 as SampleValue>::type_name(), "i64");
    }
}
