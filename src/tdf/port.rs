//! Typed port and signal handles plus the per-port attribute record.
//!
//! Handles are plain ids tagged with the value type. They are `Copy`, carry
//! no borrow of the cluster and are only meaningful for the cluster that
//! created them.

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;

use crate::types::{ModuleId, PortId, SignalId, SimTime};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortKind {
    In,
    Out,
    /// Reads a DE signal
    DeIn,
    /// Writes a DE signal
    DeOut,
}

impl PortKind {
    pub fn is_input(self) -> bool {
        matches!(self, PortKind::In | PortKind::DeIn)
    }

    pub fn is_converter(self) -> bool {
        matches!(self, PortKind::DeIn | PortKind::DeOut)
    }
}

/// Attributes and run-time position of one port.
#[derive(Clone, Debug, Serialize)]
pub struct PortInfo {
    /// `module.port`
    pub name: String,
    pub module: ModuleId,
    pub kind: PortKind,
    pub signal: Option<SignalId>,
    /// Index into the cluster's converter list for DE ports.
    pub converter: Option<usize>,
    pub type_name: &'static str,
    pub rate: usize,
    pub delay: usize,
    /// Timestep requested by a module, if any.
    pub assigned_timestep: Option<SimTime>,
    /// Timestep after propagation.
    pub timestep: SimTime,
    pub timeoffset: SimTime,
    /// Absolute index of the first sample of the current call, before the delay shift.
    pub position: u64,
    pub changed: bool,
}

impl PortInfo {
    pub(crate) fn new(name: String, module: ModuleId, kind: PortKind, type_name: &'static str) -> Self {
        Self {
            name,
            module,
            kind,
            signal: None,
            converter: None,
            type_name,
            rate: 1,
            delay: 0,
            assigned_timestep: None,
            timestep: SimTime::ZERO,
            timeoffset: SimTime::ZERO,
            position: 0,
            changed: false,
        }
    }
}

/// Common access to the id behind a typed handle.
pub trait PortHandle: Copy {
    fn port_id(&self) -> PortId;
}

macro_rules! port_handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        pub struct $name<T> {
            id: PortId,
            _type: PhantomData<fn() -> T>,
        }

        impl<T> $name<T> {
            pub(crate) fn new(id: PortId) -> Self {
                Self {
                    id,
                    _type: PhantomData,
                }
            }

            pub fn id(&self) -> PortId {
                self.id
            }
        }

        impl<T> Clone for $name<T> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<T> Copy for $name<T> {}

        impl<T> fmt::Debug for $name<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.id)
            }
        }

        impl<T> PortHandle for $name<T> {
            fn port_id(&self) -> PortId {
                self.id
            }
        }
    };
}

port_handle!(
    /// TDF input port.
    InPort
);
port_handle!(
    /// TDF output port.
    OutPort
);
port_handle!(
    /// Converter port sampling a DE signal.
    DeIn
);
port_handle!(
    /// Converter port driving a DE signal.
    DeOut
);

/// Handle of a TDF signal carrying values of type `T`.
pub struct Signal<T> {
    id: SignalId,
    _type: PhantomData<fn() -> T>,
}

impl<T> Signal<T> {
    pub(crate) fn new(id: SignalId) -> Self {
        Self {
            id,
            _type: PhantomData,
        }
    }

    pub fn id(&self) -> SignalId {
        self.id
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Signal<T> {}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signal({})", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_copy() {
        let p: InPort<f64> = InPort::new(4);
        let q = p;
        assert_eq!(p.port_id(), q.id());
        assert_eq!(format!("{:?}", OutPort::<bool>::new(2)), "OutPort(2)");
        let s: Signal<i64> = Signal::new(1);
        assert_eq!(s.id(), 1);
    }

    #[test]
    fn test_kind() {
        assert!(PortKind::DeIn.is_input());
        assert!(PortKind::DeIn.is_converter());
        assert!(!PortKind::Out.is_input());
    }
}
