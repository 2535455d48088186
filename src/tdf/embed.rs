//! Continuous-time networks embedded in a TDF cluster.
//!
//! A [`ContinuousModule`] owns an ELN/LSF [`Network`] and advances it once per
//! input sample. Input samples drive TDF-controlled primitives; outputs are
//! sampled from nodes or sink primitives. Solved values go through a
//! [`DelayBuffer`] so that outputs with a time offset are interpolated
//! between evaluation points.

use crate::buffer::{DelayBuffer, LookupStatus};
use crate::error::Result;
use crate::network::Network;
use crate::tdf::context::TdfContext;
use crate::tdf::module::{RateNegotiable, TdfModule};
use crate::tdf::port::{InPort, OutPort};
use crate::types::{NodeId, PrimitiveId, SimTime};

/// Where an output sample comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputSource {
    Node(NodeId),
    Primitive(PrimitiveId),
}

pub struct ContinuousModule {
    network: Network,
    inputs: Vec<(InPort<f64>, PrimitiveId)>,
    outputs: Vec<(OutPort<f64>, OutputSource)>,
    rate: Option<usize>,
    timestep: Option<SimTime>,
    output_offset: Option<SimTime>,
    last: Option<SimTime>,
    history: DelayBuffer<Vec<f64>>,
    evaluations: u64,
    late_samples: u64,
}

impl ContinuousModule {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            inputs: Vec::new(),
            outputs: Vec::new(),
            rate: None,
            timestep: None,
            output_offset: None,
            last: None,
            history: DelayBuffer::new(16),
            evaluations: 0,
            late_samples: 0,
        }
    }

    /// Feeds `port` into a TDF-controlled source of the network.
    pub fn with_input(mut self, port: InPort<f64>, primitive: PrimitiveId) -> Self {
        self.inputs.push((port, primitive));
        self
    }

    /// Samples the value of `node` on `port`.
    pub fn with_node_output(mut self, port: OutPort<f64>, node: NodeId) -> Self {
        self.outputs.push((port, OutputSource::Node(node)));
        self
    }

    /// Samples a sink primitive on `port`.
    pub fn with_primitive_output(mut self, port: OutPort<f64>, primitive: PrimitiveId) -> Self {
        self.outputs.push((port, OutputSource::Primitive(primitive)));
        self
    }

    /// Evaluations per call; applied as the rate of every port.
    pub fn with_rate(mut self, rate: usize) -> Self {
        self.rate = Some(rate);
        self
    }

    pub fn with_timestep(mut self, timestep: SimTime) -> Self {
        self.timestep = Some(timestep);
        self
    }

    /// Time offset of every output port. Output samples are interpolated
    /// between evaluations.
    pub fn with_output_offset(mut self, offset: SimTime) -> Self {
        self.output_offset = Some(offset);
        self
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// Output samples that lay past the last evaluation and took its value.
    pub fn late_samples(&self) -> u64 {
        self.late_samples
    }

    fn output_value(&self, source: OutputSource) -> f64 {
        match source {
            OutputSource::Node(node) => self.network.node_value(node),
            OutputSource::Primitive(id) => self.network.primitive_output(id).unwrap_or(0.0),
        }
    }

    /// Solves the network at `time` with the current inputs.
    fn evaluate(&mut self, time: SimTime) -> Result<()> {
        match self.last {
            Some(prev) if time > prev => self.network.step(time, time - prev)?,
            Some(_) => return Ok(()),
            None => self.network.dc(time)?,
        }
        self.last = Some(time);
        self.evaluations += 1;
        let values = self.outputs.iter().map(|(_, s)| self.output_value(*s)).collect();
        self.history.store(time, values);
        Ok(())
    }
}

impl RateNegotiable for ContinuousModule {
    fn set_attributes(&mut self, ctx: &mut TdfContext<'_>) -> Result<()> {
        if let Some(rate) = self.rate {
            for (port, _) in &self.inputs {
                ctx.set_rate(*port, rate)?;
            }
            for (port, _) in &self.outputs {
                ctx.set_rate(*port, rate)?;
            }
        }
        if let Some(timestep) = self.timestep {
            ctx.set_module_timestep(timestep)?;
        }
        if let Some(offset) = self.output_offset {
            for (port, _) in &self.outputs {
                ctx.set_timeoffset(*port, offset)?;
            }
        }
        Ok(())
    }
}

impl TdfModule for ContinuousModule {
    fn initialize(&mut self, _ctx: &mut TdfContext<'_>) -> Result<()> {
        if !self.network.is_elaborated() {
            self.network.elaborate()?;
        }
        Ok(())
    }

    fn reinitialize(&mut self, ctx: &mut TdfContext<'_>) -> Result<()> {
        tracing::debug!(module = %ctx.module_name(), timestep = %ctx.module_timestep(), "continuous module rescheduled");
        Ok(())
    }

    fn processing(&mut self, ctx: &mut TdfContext<'_>) -> Result<()> {
        let rate = self.rate.unwrap_or(1);
        let step = ctx.module_timestep() / rate as u64;
        self.history.set_window(ctx.module_timestep());

        for k in 0..rate {
            for i in 0..self.inputs.len() {
                let (port, primitive) = self.inputs[i];
                let value = ctx.read(port, k)?;
                self.network.set_primitive_input(primitive, value)?;
            }
            self.evaluate(ctx.time() + step * k as u64)?;
        }

        for k in 0..rate {
            for (i, (port, _)) in self.outputs.iter().enumerate() {
                let at = ctx.sample_time(*port, k)?;
                let lookup = self.history.query(at);
                if let Some(LookupStatus::NotAvailable) = lookup.as_ref().map(|l| l.status) {
                    self.late_samples += 1;
                    tracing::trace!(module = %ctx.module_name(), at = %at, "output sample after last evaluation, holding latest value");
                }
                let value = lookup.and_then(|l| l.value.get(i).copied()).unwrap_or(0.0);
                ctx.write(*port, k, value)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AmsConfig;
    use crate::eln::{Capacitor, Resistor, TdfVsource};
    use crate::executor::ClusterExecutor;
    use crate::kernel::LocalKernel;
    use crate::report::Diagnostics;
    use crate::tdf::TdfCluster;

    /// Writes `value` from `from` on, zero before.
    struct Step {
        out: OutPort<f64>,
        from: SimTime,
        value: f64,
    }

    impl RateNegotiable for Step {
        fn set_attributes(&mut self, ctx: &mut TdfContext<'_>) -> Result<()> {
            ctx.set_module_timestep(SimTime::from_ns(100))
        }
    }

    impl TdfModule for Step {
        fn processing(&mut self, ctx: &mut TdfContext<'_>) -> Result<()> {
            let v = if ctx.time() >= self.from { self.value } else { 0.0 };
            ctx.write(self.out, 0, v)
        }
    }

    struct Probe {
        inp: InPort<f64>,
        seen: Vec<f64>,
    }

    impl RateNegotiable for Probe {}

    impl TdfModule for Probe {
        fn processing(&mut self, ctx: &mut TdfContext<'_>) -> Result<()> {
            self.seen.push(ctx.read(self.inp, 0)?);
            Ok(())
        }
    }

    fn build(capacitor: Option<f64>) -> (TdfCluster, usize) {
        let diagnostics = Diagnostics::new();
        let config = AmsConfig::default();
        let mut net = Network::new("rc", &config, diagnostics.clone());
        let gnd = net.ground();
        let a = net.add_node("a");
        let out = net.add_node("out");
        let src = net.add_primitive(Box::new(TdfVsource::new("vin", a, gnd)));
        net.add_primitive(Box::new(Resistor::new("r1", a, out, 1e3)));
        match capacitor {
            Some(c) => net.add_primitive(Box::new(Capacitor::new("c", out, gnd, c))),
            None => net.add_primitive(Box::new(Resistor::new("r2", out, gnd, 1e3))),
        };

        let mut cluster = TdfCluster::new("tdf", &config, diagnostics);
        let vin = cluster.signal::<f64>("vin");
        let vout = cluster.signal::<f64>("vout");
        let from = if capacitor.is_some() { SimTime::from_ns(500) } else { SimTime::ZERO };
        cluster.add_module("src", |b| {
            Box::new(Step {
                out: b.output("out", vin),
                from,
                value: 2.0,
            })
        });
        cluster.add_module("rc", |b| {
            Box::new(
                ContinuousModule::new(net)
                    .with_input(b.input("in", vin), src)
                    .with_node_output(b.output("out", vout), out),
            )
        });
        let probe = cluster.add_module("probe", |b| {
            Box::new(Probe {
                inp: b.input("in", vout),
                seen: Vec::new(),
            })
        });
        (cluster, probe)
    }

    fn offset_divider(offset: SimTime) -> (TdfCluster, usize, usize) {
        let diagnostics = Diagnostics::new();
        let config = AmsConfig::default();
        let mut net = Network::new("divider", &config, diagnostics.clone());
        let gnd = net.ground();
        let a = net.add_node("a");
        let out = net.add_node("out");
        let src = net.add_primitive(Box::new(TdfVsource::new("vin", a, gnd)));
        net.add_primitive(Box::new(Resistor::new("r1", a, out, 1e3)));
        net.add_primitive(Box::new(Resistor::new("r2", out, gnd, 1e3)));

        let mut cluster = TdfCluster::new("tdf", &config, diagnostics);
        let vin = cluster.signal::<f64>("vin");
        let vout = cluster.signal::<f64>("vout");
        cluster.add_module("src", |b| {
            Box::new(Step {
                out: b.output("out", vin),
                from: SimTime::ZERO,
                value: 2.0,
            })
        });
        let divider = cluster.add_module("divider", |b| {
            Box::new(
                ContinuousModule::new(net)
                    .with_input(b.input("in", vin), src)
                    .with_node_output(b.output("out", vout), out)
                    .with_rate(2)
                    .with_output_offset(offset),
            )
        });
        let probe = cluster.add_module("probe", |b| {
            Box::new(Probe {
                inp: b.input("in", vout),
                seen: Vec::new(),
            })
        });
        (cluster, divider, probe)
    }

    fn run(cluster: &mut TdfCluster, until: SimTime) {
        let mut kernel = LocalKernel::new(cluster.diagnostics().clone());
        cluster.initialize(&mut kernel).unwrap();
        while let Some(t) = cluster.next_activation() {
            if t > until {
                break;
            }
            kernel.advance_to(t);
            cluster.activate(&mut kernel).unwrap();
        }
    }

    #[test]
    fn test_divider_follows_input() {
        let (mut cluster, probe) = build(None);
        run(&mut cluster, SimTime::from_ns(300));
        let seen = &cluster.module::<Probe>(probe).unwrap().seen;
        assert_eq!(seen.len(), 4);
        for v in seen {
            approx::assert_relative_eq!(*v, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_rc_charges_towards_input() {
        // tau = 1 us, sampled every 100 ns; input steps to 2 V at 500 ns
        let (mut cluster, probe) = build(Some(1e-9));
        run(&mut cluster, SimTime::from_us(6));
        let seen = &cluster.module::<Probe>(probe).unwrap().seen;
        assert_eq!(seen.len(), 61);
        approx::assert_relative_eq!(seen[0], 0.0);
        assert!(seen.windows(2).all(|w| w[1] >= w[0] - 1e-12));
        assert!(seen[60] > 1.98 && seen[60] <= 2.0 + 1e-9);
    }

    #[test]
    fn test_offset_past_last_evaluation_holds_latest() {
        let (mut cluster, divider, probe) = offset_divider(SimTime::from_ns(50));
        run(&mut cluster, SimTime::from_us(1));

        let module = cluster.module::<ContinuousModule>(divider).unwrap();
        assert!(module.evaluations() >= 4);
        // the second sample of every call lies 50 ns past the last solve
        assert_eq!(module.late_samples(), module.evaluations() / 2);
        let seen = &cluster.module::<Probe>(probe).unwrap().seen;
        assert!(!seen.is_empty());
        for v in seen {
            approx::assert_relative_eq!(*v, 1.0, epsilon = 1e-12);
        }
        assert!(!cluster.diagnostics().has_errors());
    }
}
