//! Free-running ELN/LSF network with its own fixed timestep.

use serde_json::json;

use crate::error::{AmsError, Result};
use crate::executor::ClusterExecutor;
use crate::kernel::HostKernel;
use crate::network::Network;
use crate::types::{ExecutorId, SimTime};

/// Drives a [`Network`] from the simulator: a DC solve at the start of
/// simulation, then one transient step per `timestep`.
#[derive(Debug)]
pub struct NetworkExecutor {
    id: ExecutorId,
    network: Network,
    timestep: SimTime,
    time: SimTime,
    next: Option<SimTime>,
    steps: u64,
}

impl NetworkExecutor {
    pub fn new(network: Network, timestep: SimTime) -> Self {
        Self {
            id: 0,
            network,
            timestep,
            time: SimTime::ZERO,
            next: None,
            steps: 0,
        }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    pub fn timestep(&self) -> SimTime {
        self.timestep
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }
}

impl ClusterExecutor for NetworkExecutor {
    fn id(&self) -> ExecutorId {
        self.id
    }

    fn set_id(&mut self, id: ExecutorId) {
        self.id = id;
    }

    fn name(&self) -> &str {
        self.network.name()
    }

    fn elaborate(&mut self) -> Result<()> {
        if self.timestep.is_zero() {
            return Err(AmsError::TimestepInconsistent {
                location: self.network.name().to_string(),
                message: "network executor needs a non-zero timestep".to_string(),
            });
        }
        self.network.elaborate()
    }

    fn initialize(&mut self, kernel: &mut dyn HostKernel) -> Result<()> {
        self.time = kernel.now();
        self.network.dc(self.time)?;
        self.next = self.time.checked_add(self.timestep);
        Ok(())
    }

    fn next_activation(&self) -> Option<SimTime> {
        self.next
    }

    fn activate(&mut self, kernel: &mut dyn HostKernel) -> Result<()> {
        let Some(due) = self.next else {
            return Ok(());
        };
        if kernel.now() < due {
            return Ok(());
        }
        self.network.step(due, self.timestep)?;
        self.time = due;
        self.steps += 1;
        self.next = due.checked_add(self.timestep);
        Ok(())
    }

    fn export_stats(&self) -> serde_json::Value {
        json!({
            "kind": "network",
            "id": self.id,
            "timestep": self.timestep,
            "steps": self.steps,
            "current_time": self.time,
            "network": self.network.export_stats(),
        })
    }

    fn current_time(&self) -> SimTime {
        self.time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AmsConfig;
    use crate::eln::{Capacitor, Resistor, Vsource, Waveform};
    use crate::kernel::LocalKernel;
    use crate::report::Diagnostics;
    use approx::assert_relative_eq;

    #[test]
    fn test_rc_charging() {
        let diagnostics = Diagnostics::new();
        let mut net = Network::new("rc", &AmsConfig::default(), diagnostics.clone());
        let gnd = net.ground();
        let a = net.add_node("a");
        let out = net.add_node("out");
        let step = Waveform::Step {
            before: 0.0,
            after: 1.0,
            at: SimTime::from_us(1),
        };
        net.add_primitive(Box::new(Vsource::new("v", a, gnd, step)));
        net.add_primitive(Box::new(Resistor::new("r", a, out, 1e3)));
        net.add_primitive(Box::new(Capacitor::new("c", out, gnd, 1e-9)));

        let mut exec = NetworkExecutor::new(net, SimTime::from_ns(10));
        let mut kernel = LocalKernel::new(diagnostics);
        exec.elaborate().unwrap();
        exec.initialize(&mut kernel).unwrap();
        assert_relative_eq!(exec.network().node_value(out), 0.0);

        // tau = 1 us; run 6 tau past the step
        while let Some(next) = exec.next_activation() {
            if next > SimTime::from_us(7) {
                break;
            }
            kernel.advance_to(next);
            exec.activate(&mut kernel).unwrap();
        }
        assert_eq!(exec.steps(), 700);
        let v = exec.network().node_value(out);
        assert!(v > 0.99 && v < 1.0, "v = {v}");
        assert_eq!(exec.export_stats()["steps"], 700);
    }

    #[test]
    fn test_zero_timestep_rejected() {
        let net = Network::new("n", &AmsConfig::default(), Diagnostics::new());
        let mut exec = NetworkExecutor::new(net, SimTime::ZERO);
        assert!(exec.elaborate().is_err());
    }
}
