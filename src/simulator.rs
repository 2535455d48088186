//! Top-level simulation coordinator.
//!
//! `AmsSimulator` owns the cluster executors and a [`LocalKernel`] that
//! stands in for the discrete-event host. Each step advances the kernel to
//! the earliest pending activation or event, delivers due events, activates
//! the executors that are due and delivers whatever they produced for the
//! same instant.
//!
//! # Example
//!
//! ```
//! use mixsig::config::AmsConfig;
//! use mixsig::eln::{Capacitor, Resistor, Vsource};
//! use mixsig::network::{Network, NetworkExecutor};
//! use mixsig::simulator::AmsSimulator;
//! use mixsig::types::SimTime;
//!
//! let mut sim = AmsSimulator::new(AmsConfig::default());
//! let mut net = Network::new("rc", sim.config(), sim.diagnostics().clone());
//! let gnd = net.ground();
//! let a = net.add_node("a");
//! let out = net.add_node("out");
//! net.add_primitive(Box::new(Vsource::dc("v", a, gnd, 1.0)));
//! net.add_primitive(Box::new(Resistor::new("r", a, out, 1e3)));
//! net.add_primitive(Box::new(Capacitor::new("c", out, gnd, 1e-9)));
//!
//! let id = sim.add_executor(Box::new(NetworkExecutor::new(net, SimTime::from_ns(10))));
//! sim.run(SimTime::from_us(1)).unwrap();
//! let exec = sim.executor_as::<NetworkExecutor>(id).unwrap();
//! assert!((exec.network().node_value(out) - 1.0).abs() < 1e-9);
//! ```

use serde_json::json;

use crate::config::AmsConfig;
use crate::error::{AmsError, Result};
use crate::event::Event;
use crate::executor::ClusterExecutor;
use crate::kernel::{HostKernel, LocalKernel};
use crate::report::Diagnostics;
use crate::stats::{SimulationStats, StatsCollector};
use crate::types::{ExecutorId, SimTime};

#[derive(Clone, Debug, Default)]
pub struct SimulatorStats {
    pub steps: u64,
    pub activations: u64,
    pub events_delivered: u64,
    /// Events addressed to an executor that does not exist
    pub events_dropped: u64,
}

pub struct AmsSimulator {
    config: AmsConfig,
    diagnostics: Diagnostics,
    executors: Vec<Box<dyn ClusterExecutor>>,
    kernel: LocalKernel,
    elaborated: bool,
    started: bool,
    stats: SimulatorStats,
    collector: Option<StatsCollector>,
}

impl AmsSimulator {
    pub fn new(config: AmsConfig) -> Self {
        let diagnostics = Diagnostics::new();
        let collector = config.collect_stats.then(|| {
            let mut collector = StatsCollector::new();
            collector.set_name(config.name.clone());
            collector
        });
        Self {
            kernel: LocalKernel::new(diagnostics.clone()),
            config,
            diagnostics,
            executors: Vec::new(),
            elaborated: false,
            started: false,
            stats: SimulatorStats::default(),
            collector,
        }
    }

    pub fn config(&self) -> &AmsConfig {
        &self.config
    }

    /// Shared diagnostics sink; hand clones of it to clusters and networks.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn kernel(&self) -> &LocalKernel {
        &self.kernel
    }

    pub fn current_time(&self) -> SimTime {
        self.kernel.now()
    }

    pub fn stats(&self) -> &SimulatorStats {
        &self.stats
    }

    pub fn add_executor(&mut self, mut executor: Box<dyn ClusterExecutor>) -> ExecutorId {
        let id = self.executors.len() as ExecutorId;
        executor.set_id(id);
        tracing::debug!(id, name = %executor.name(), "executor registered");
        self.executors.push(executor);
        self.elaborated = false;
        id
    }

    pub fn executor_count(&self) -> usize {
        self.executors.len()
    }

    pub fn executor(&self, id: ExecutorId) -> Option<&dyn ClusterExecutor> {
        self.executors.get(id as usize).map(|e| e.as_ref())
    }

    pub fn executor_as<T: ClusterExecutor>(&self, id: ExecutorId) -> Option<&T> {
        self.executors.get(id as usize)?.as_ref().as_any().downcast_ref::<T>()
    }

    pub fn executor_as_mut<T: ClusterExecutor>(&mut self, id: ExecutorId) -> Option<&mut T> {
        self.executors
            .get_mut(id as usize)?
            .as_mut()
            .as_any_mut()
            .downcast_mut::<T>()
    }

    /// Elaborates every executor. Stops at the first failure.
    pub fn end_of_elaboration(&mut self) -> Result<()> {
        for executor in &mut self.executors {
            executor.elaborate()?;
        }
        self.elaborated = true;
        tracing::info!(executors = self.executors.len(), "elaboration finished");
        Ok(())
    }

    /// Initializes every executor at the current kernel time.
    pub fn start_of_simulation(&mut self) -> Result<()> {
        if !self.elaborated {
            self.end_of_elaboration()?;
        }
        if let Some(collector) = &mut self.collector {
            collector.start();
        }
        for executor in &mut self.executors {
            executor.initialize(&mut self.kernel)?;
        }
        self.deliver()?;
        self.started = true;
        Ok(())
    }

    /// Queues an external event.
    pub fn inject_event(&mut self, event: Event) -> Result<()> {
        self.kernel.notify(event)
    }

    /// Earliest pending activation or event.
    pub fn next_time(&self) -> Option<SimTime> {
        self.executors
            .iter()
            .filter_map(|e| e.next_activation())
            .chain(self.kernel.next_event_time())
            .min()
    }

    fn dispatch(&mut self, event: &Event) -> Result<()> {
        match event.payload.target() {
            Some(id) => match self.executors.get_mut(id as usize) {
                Some(executor) => executor.handle_event(event, &mut self.kernel)?,
                None => {
                    self.stats.events_dropped += 1;
                    self.diagnostics.warning(
                        "simulator",
                        format!("event for unknown executor {} dropped", id),
                    );
                }
            },
            None => {
                for executor in &mut self.executors {
                    executor.handle_event(event, &mut self.kernel)?;
                }
            }
        }
        self.stats.events_delivered += 1;
        Ok(())
    }

    /// Delivers events due now, including those raised while delivering.
    fn deliver(&mut self) -> Result<()> {
        loop {
            let due = self.kernel.pop_due();
            if due.is_empty() {
                return Ok(());
            }
            for event in &due {
                self.dispatch(event)?;
            }
        }
    }

    /// Runs one instant. Returns `false` when nothing is pending.
    pub fn step(&mut self) -> Result<bool> {
        if !self.started {
            self.start_of_simulation()?;
        }
        let Some(next) = self.next_time() else {
            return Ok(false);
        };
        if next < self.kernel.now() {
            return Err(AmsError::TimeOrder {
                time: next,
                now: self.kernel.now(),
            });
        }
        self.kernel.advance_to(next);
        self.deliver()?;

        let now = self.kernel.now();
        for executor in &mut self.executors {
            if executor.next_activation().is_some_and(|t| t <= now) {
                executor.activate(&mut self.kernel)?;
                self.stats.activations += 1;
            }
        }
        self.deliver()?;
        self.stats.steps += 1;
        Ok(true)
    }

    /// Runs until every pending activation is later than `until`.
    pub fn run(&mut self, until: SimTime) -> Result<()> {
        if !self.started {
            self.start_of_simulation()?;
        }
        while self.next_time().is_some_and(|t| t <= until) {
            self.step()?;
        }
        self.kernel.advance_to(until);
        tracing::debug!(now = %self.kernel.now(), steps = self.stats.steps, "run finished");
        if let Some(collector) = &mut self.collector {
            collector.stop();
        }
        Ok(())
    }

    pub fn export_stats(&self) -> serde_json::Value {
        let mut executors = serde_json::Map::new();
        for executor in &self.executors {
            executors.insert(executor.id().to_string(), executor.export_stats());
        }
        json!({
            "simulator": {
                "current_time": self.kernel.now(),
                "steps": self.stats.steps,
                "activations": self.stats.activations,
                "events_delivered": self.stats.events_delivered,
                "events_dropped": self.stats.events_dropped,
                "executor_count": self.executors.len(),
                "diagnostics": self.diagnostics.len(),
            },
            "executors": executors,
        })
    }

    /// Statistics summary; includes wall-clock timing when `collect_stats` is set.
    pub fn collect_stats(&mut self) -> SimulationStats {
        let export = self.export_stats();
        match &mut self.collector {
            Some(collector) => {
                collector.update_from_json(&export);
                collector.stats().clone()
            }
            None => {
                let mut collector = StatsCollector::new();
                collector.set_name(self.config.name.clone());
                collector.update_from_json(&export);
                collector.into_stats()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::DeSignal;
    use crate::tdf::{DeIn, DeOut, OutPort, RateNegotiable, TdfCluster, TdfContext, TdfModule};

    fn us(v: u64) -> SimTime {
        SimTime::from_us(v)
    }

    struct Counter {
        out: DeOut<i64>,
        n: i64,
    }

    impl RateNegotiable for Counter {
        fn set_attributes(&mut self, ctx: &mut TdfContext<'_>) -> Result<()> {
            ctx.set_module_timestep(us(2))
        }
    }

    impl TdfModule for Counter {
        fn processing(&mut self, ctx: &mut TdfContext<'_>) -> Result<()> {
            self.n += 1;
            ctx.write_de(self.out, 0, self.n)
        }
    }

    struct Follower {
        inp: DeIn<i64>,
        out: OutPort<i64>,
        seen: Vec<i64>,
    }

    impl RateNegotiable for Follower {
        fn set_attributes(&mut self, ctx: &mut TdfContext<'_>) -> Result<()> {
            ctx.set_module_timestep(us(1))
        }
    }

    impl TdfModule for Follower {
        fn processing(&mut self, ctx: &mut TdfContext<'_>) -> Result<()> {
            let v = ctx.read_de(self.inp, 0)?;
            self.seen.push(v);
            ctx.write(self.out, 0, v)
        }
    }

    fn coupled() -> (AmsSimulator, ExecutorId, DeSignal<i64>) {
        let mut sim = AmsSimulator::new(AmsConfig::default());
        let de = DeSignal::new("count", 0);

        let mut producer = TdfCluster::new("producer", sim.config(), sim.diagnostics().clone());
        producer.add_module("counter", |b| {
            Box::new(Counter {
                out: b.de_output("out", &de),
                n: 0,
            })
        });

        let mut consumer = TdfCluster::new("consumer", sim.config(), sim.diagnostics().clone());
        let echo = consumer.signal::<i64>("echo");
        consumer.add_module("follower", |b| {
            Box::new(Follower {
                inp: b.de_input("in", &de),
                out: b.output("out", echo),
                seen: Vec::new(),
            })
        });

        sim.add_executor(Box::new(producer));
        let consumer = sim.add_executor(Box::new(consumer));
        (sim, consumer, de)
    }

    #[test]
    fn test_de_coupling_between_clusters() {
        let (mut sim, consumer, de) = coupled();
        sim.run(us(5)).unwrap();

        // producer writes 1 at 0, 2 at 2us, 3 at 4us; a write is visible
        // to readers activated after the instant it was produced in
        assert_eq!(de.read_at(us(4)), 3);
        let follower = sim
            .executor_as::<TdfCluster>(consumer)
            .and_then(|c| c.module::<Follower>(0))
            .unwrap();
        assert_eq!(follower.seen, vec![0, 1, 1, 2, 2, 3]);
        assert_eq!(sim.current_time(), us(5));
    }

    #[test]
    fn test_export_and_collect_stats() {
        let (mut sim, _, _) = coupled();
        sim.run(us(3)).unwrap();
        let stats = sim.export_stats();
        assert_eq!(stats["simulator"]["executor_count"], 2);
        assert_eq!(stats["executors"]["0"]["kind"], "tdf");
        assert_eq!(stats["executors"]["1"]["stats"]["periods"], 4);

        let summary = sim.collect_stats();
        assert_eq!(summary.executors[&0].periods, Some(2));
        assert_eq!(summary.simulator.final_time, us(3));
    }

    #[test]
    fn test_unknown_target_dropped() {
        let (mut sim, _, _) = coupled();
        sim.start_of_simulation().unwrap();
        sim.inject_event(Event::activate(us(1), 9)).unwrap();
        sim.run(us(1)).unwrap();
        assert_eq!(sim.stats().events_dropped, 1);
        let dropped = sim
            .diagnostics()
            .entries()
            .into_iter()
            .filter(|d| d.message.contains("unknown executor"))
            .count();
        assert_eq!(dropped, 1);
    }

    #[test]
    fn test_empty_simulator_idles() {
        let mut sim = AmsSimulator::new(AmsConfig::default());
        assert!(!sim.step().unwrap());
        sim.run(us(1)).unwrap();
        assert_eq!(sim.current_time(), us(1));
    }
}
