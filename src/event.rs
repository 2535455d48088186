//! Events exchanged between the host kernel and executors.
//!
//! Executors never call each other. Everything that has to happen at a
//! later time, or in another executor, is posted to the kernel as an
//! [`Event`] and delivered back when the kernel reaches that time.

use serde::{Deserialize, Serialize};

use crate::types::{ExecutorId, PortId, SimTime};

/// A timestamped event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub time: SimTime,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(time: SimTime, payload: EventPayload) -> Self {
        Self { time, payload }
    }

    /// Wakes `executor` at `time`.
    pub fn activate(time: SimTime, executor: ExecutorId) -> Self {
        Self::new(time, EventPayload::Activate { executor })
    }

    /// Asks `executor` to move one queued sample of converter `port` onto its DE signal.
    pub fn converter_update(time: SimTime, executor: ExecutorId, port: PortId) -> Self {
        Self::new(time, EventPayload::ConverterUpdate { executor, port })
    }

    /// Tells all executors that a DE signal changed.
    pub fn signal_changed(time: SimTime, signal: impl Into<String>) -> Self {
        Self::new(
            time,
            EventPayload::SignalChanged {
                signal: signal.into(),
            },
        )
    }

    pub fn custom(time: SimTime, data: impl Into<String>) -> Self {
        Self::new(time, EventPayload::Custom(data.into()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventPayload {
    Activate { executor: ExecutorId },

    ConverterUpdate { executor: ExecutorId, port: PortId },

    /// Broadcast to every executor.
    SignalChanged { signal: String },

    Custom(String),
}

impl EventPayload {
    /// Executor the event is addressed to, or `None` for a broadcast.
    pub fn target(&self) -> Option<ExecutorId> {
        match self {
            EventPayload::Activate { executor } | EventPayload::ConverterUpdate { executor, .. } => {
                Some(*executor)
            }
            EventPayload::SignalChanged { .. } | EventPayload::Custom(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_targets() {
        let t = SimTime::from_ns(5);
        assert_eq!(Event::activate(t, 2).payload.target(), Some(2));
        assert_eq!(Event::converter_update(t, 1, 7).payload.target(), Some(1));
        assert_eq!(Event::signal_changed(t, "clk").payload.target(), None);
        assert_eq!(Event::custom(t, "x").payload.target(), None);
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::converter_update(SimTime::from_us(3), 4, 1);
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
