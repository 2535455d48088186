//! The host discrete-event kernel seen from the analog side.
//!
//! Executors only need the current time, a way to post future events and a
//! diagnostics sink. [`LocalKernel`] is the in-crate implementation used by
//! [`AmsSimulator`](crate::simulator::AmsSimulator); a host simulator can
//! drive executors through its own [`HostKernel`] instead.

use std::collections::BTreeMap;

use crate::error::{AmsError, Result};
use crate::event::Event;
use crate::report::{Diagnostic, Diagnostics};
use crate::types::SimTime;

pub trait HostKernel {
    fn now(&self) -> SimTime;

    /// Schedules `event` at `event.time`. Times before [`now`](Self::now) are rejected.
    fn notify(&mut self, event: Event) -> Result<()>;

    fn diagnostics(&self) -> &Diagnostics;

    fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics().report(
            diagnostic.severity,
            diagnostic.source,
            diagnostic.message,
            diagnostic.time,
        );
    }
}

/// Time-ordered event queue.
#[derive(Debug, Default)]
pub struct LocalKernel {
    now: SimTime,
    queue: BTreeMap<SimTime, Vec<Event>>,
    diagnostics: Diagnostics,
    delivered: u64,
}

impl LocalKernel {
    pub fn new(diagnostics: Diagnostics) -> Self {
        Self {
            diagnostics,
            ..Default::default()
        }
    }

    /// Moves the current time forward. Never moves backwards.
    pub fn advance_to(&mut self, time: SimTime) {
        if time > self.now {
            self.now = time;
        }
    }

    pub fn next_event_time(&self) -> Option<SimTime> {
        self.queue.keys().next().copied()
    }

    /// Removes and returns the events scheduled at or before the current time.
    pub fn pop_due(&mut self) -> Vec<Event> {
        let later = self.queue.split_off(&self.now.saturating_add(SimTime::from_fs(1)));
        let due = std::mem::replace(&mut self.queue, later);
        let events: Vec<Event> = due.into_values().flatten().collect();
        self.delivered += events.len() as u64;
        events
    }

    pub fn pending(&self) -> usize {
        self.queue.values().map(Vec::len).sum()
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

impl HostKernel for LocalKernel {
    fn now(&self) -> SimTime {
        self.now
    }

    fn notify(&mut self, event: Event) -> Result<()> {
        if event.time < self.now {
            return Err(AmsError::TimeOrder {
                time: event.time,
                now: self.now,
            });
        }
        self.queue.entry(event.time).or_default().push(event);
        Ok(())
    }

    fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_order() {
        let mut kernel = LocalKernel::new(Diagnostics::new());
        kernel.notify(Event::custom(SimTime::from_ns(20), "b")).unwrap();
        kernel.notify(Event::custom(SimTime::from_ns(10), "a")).unwrap();
        kernel.notify(Event::custom(SimTime::from_ns(10), "a2")).unwrap();
        assert_eq!(kernel.pending(), 3);
        assert_eq!(kernel.next_event_time(), Some(SimTime::from_ns(10)));

        kernel.advance_to(SimTime::from_ns(10));
        let due = kernel.pop_due();
        assert_eq!(due.len(), 2);
        assert_eq!(due[0], Event::custom(SimTime::from_ns(10), "a"));
        assert_eq!(kernel.pending(), 1);
    }

    #[test]
    fn test_past_event_rejected() {
        let mut kernel = LocalKernel::new(Diagnostics::new());
        kernel.advance_to(SimTime::from_ns(50));
        let err = kernel.notify(Event::custom(SimTime::from_ns(40), "late")).unwrap_err();
        assert!(matches!(err, AmsError::TimeOrder { .. }));
        kernel.advance_to(SimTime::from_ns(10));
        assert_eq!(kernel.now(), SimTime::from_ns(50));
    }
}
