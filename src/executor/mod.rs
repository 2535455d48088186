//! Executor trait for units the simulator drives.
//!
//! A `ClusterExecutor` is one independently scheduled piece of the analog
//! model: a TDF cluster or a free-running ELN/LSF network. The simulator
//! asks each executor when it next wants to run, advances the kernel there
//! and activates it.
//!
//! # Lifecycle
//!
//! 1. `elaborate()` once, at the end of elaboration
//! 2. `initialize(kernel)` once, at the start of simulation
//! 3. `activate(kernel)` whenever `next_activation()` is due
//! 4. `handle_event(event, kernel)` for every event addressed to it or broadcast

use crate::eqn::AsAny;
use crate::error::Result;
use crate::event::Event;
use crate::kernel::HostKernel;
use crate::types::{ExecutorId, SimTime};

pub trait ClusterExecutor: AsAny + Send {
    fn id(&self) -> ExecutorId;

    /// Assigned by the simulator on registration.
    fn set_id(&mut self, id: ExecutorId);

    fn name(&self) -> &str;

    /// Resolves structure: clustering, rates, timesteps and schedule.
    fn elaborate(&mut self) -> Result<()>;

    /// Computes initial values at the kernel's current time.
    fn initialize(&mut self, kernel: &mut dyn HostKernel) -> Result<()>;

    /// Next time this executor wants to run, `None` when idle.
    fn next_activation(&self) -> Option<SimTime>;

    /// Runs the work due at `kernel.now()`.
    fn activate(&mut self, kernel: &mut dyn HostKernel) -> Result<()>;

    fn handle_event(&mut self, _event: &Event, _kernel: &mut dyn HostKernel) -> Result<()> {
        Ok(())
    }

    fn export_stats(&self) -> serde_json::Value;

    /// Time up to which this executor has computed.
    fn current_time(&self) -> SimTime;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::LocalKernel;
    use crate::report::Diagnostics;

    struct MockExecutor {
        id: ExecutorId,
        period: SimTime,
        time: SimTime,
        next: Option<SimTime>,
        events: usize,
        runs: usize,
    }

    impl MockExecutor {
        fn new(period: SimTime) -> Self {
            Self {
                id: 0,
                period,
                time: SimTime::ZERO,
                next: None,
                events: 0,
                runs: 0,
            }
        }
    }

    impl ClusterExecutor for MockExecutor {
        fn id(&self) -> ExecutorId {
            self.id
        }

        fn set_id(&mut self, id: ExecutorId) {
            self.id = id;
        }

        fn name(&self) -> &str {
            "mock"
        }

        fn elaborate(&mut self) -> Result<()> {
            Ok(())
        }

        fn initialize(&mut self, kernel: &mut dyn HostKernel) -> Result<()> {
            self.time = kernel.now();
            self.next = Some(self.time);
            Ok(())
        }

        fn next_activation(&self) -> Option<SimTime> {
            self.next
        }

        fn activate(&mut self, kernel: &mut dyn HostKernel) -> Result<()> {
            self.runs += 1;
            self.time = kernel.now();
            self.next = Some(self.time + self.period);
            Ok(())
        }

        fn handle_event(&mut self, _event: &Event, _kernel: &mut dyn HostKernel) -> Result<()> {
            self.events += 1;
            Ok(())
        }

        fn export_stats(&self) -> serde_json::Value {
            serde_json::json!({
                "id": self.id,
                "runs": self.runs,
                "events": self.events,
                "current_time": self.time,
            })
        }

        fn current_time(&self) -> SimTime {
            self.time
        }
    }

    #[test]
    fn test_mock_executor_lifecycle() {
        let mut kernel = LocalKernel::new(Diagnostics::new());
        let mut exec = MockExecutor::new(SimTime::from_ns(10));
        exec.set_id(3);
        exec.elaborate().unwrap();
        exec.initialize(&mut kernel).unwrap();
        assert_eq!(exec.next_activation(), Some(SimTime::ZERO));

        exec.activate(&mut kernel).unwrap();
        kernel.advance_to(SimTime::from_ns(10));
        exec.activate(&mut kernel).unwrap();
        exec.handle_event(&Event::custom(SimTime::from_ns(10), "x"), &mut kernel)
            .unwrap();

        let stats = exec.export_stats();
        assert_eq!(stats["id"], 3);
        assert_eq!(stats["runs"], 2);
        assert_eq!(stats["events"], 1);
        assert_eq!(exec.next_activation(), Some(SimTime::from_ns(20)));
    }

    #[test]
    fn test_downcast() {
        let exec: Box<dyn ClusterExecutor> = Box::new(MockExecutor::new(SimTime::from_ns(1)));
        assert!(exec.as_ref().as_any().downcast_ref::<MockExecutor>().is_some());
        assert!(exec.as_any().downcast_ref::<MockExecutor>().is_none());
    }
}
