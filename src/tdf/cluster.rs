//! TDF cluster: elaboration and period-by-period execution.
//!
//! A cluster owns its modules and signals. Elaboration resolves rates,
//! timesteps and the static schedule. At run time the cluster executes the
//! schedule one period at a time. Firings of modules that sample DE signals
//! wait until the kernel reaches their call time; all other firings run
//! as soon as their inputs are computed.
//!
//! # Example
//!
//! ```
//! use mixsig::config::AmsConfig;
//! use mixsig::report::Diagnostics;
//! use mixsig::tdf::{OutPort, RateNegotiable, TdfCluster, TdfContext, TdfModule};
//! use mixsig::types::SimTime;
//!
//! struct Counter {
//!     out: OutPort<i64>,
//!     n: i64,
//! }
//!
//! impl RateNegotiable for Counter {
//!     fn set_attributes(&mut self, ctx: &mut TdfContext<'_>) -> mixsig::Result<()> {
//!         ctx.set_module_timestep(SimTime::from_us(1))
//!     }
//! }
//!
//! impl TdfModule for Counter {
//!     fn processing(&mut self, ctx: &mut TdfContext<'_>) -> mixsig::Result<()> {
//!         self.n += 1;
//!         ctx.write(self.out, 0, self.n)
//!     }
//! }
//!
//! let mut cluster = TdfCluster::new("count", &AmsConfig::default(), Diagnostics::new());
//! let sig = cluster.signal::<i64>("n");
//! cluster.add_module("counter", |b| Box::new(Counter { out: b.output("out", sig), n: 0 }));
//! cluster.elaborate_cluster().unwrap();
//! assert_eq!(cluster.period(), SimTime::from_us(1));
//! ```

use serde::Serialize;
use serde_json::json;

use crate::config::AmsConfig;
use crate::converter::{DeToTdf, TdfToDe};
use crate::error::{AmsError, Result};
use crate::event::{Event, EventPayload};
use crate::executor::ClusterExecutor;
use crate::kernel::HostKernel;
use crate::report::{Diagnostics, Severity};
use crate::tdf::context::TdfContext;
use crate::tdf::graph::{ModuleInfo, TdfGraph};
use crate::tdf::module::{check_bindings, ModuleBuilder, TdfModule};
use crate::tdf::port::{DeIn, DeOut, InPort, OutPort, PortHandle, PortInfo, PortKind, Signal};
use crate::tdf::schedule::{self, Schedule};
use crate::tdf::{propagate, Phase, SampleValue};
use crate::types::{ExecutorId, ModuleId, SimTime};

#[derive(Clone, Debug, Default, Serialize)]
pub struct TdfStats {
    pub periods: u64,
    pub firings: u64,
    pub propagation_passes: u64,
    pub reschedules: u64,
    pub converter_updates: u64,
}

pub struct TdfCluster {
    id: ExecutorId,
    name: String,
    config: AmsConfig,
    diagnostics: Diagnostics,
    graph: TdfGraph,
    behaviors: Vec<Box<dyn TdfModule>>,
    schedule: Schedule,
    period: SimTime,
    period_start: SimTime,
    cursor: usize,
    next: Option<SimTime>,
    time: SimTime,
    elaborated: bool,
    stats: TdfStats,
}

impl TdfCluster {
    pub fn new(name: impl Into<String>, config: &AmsConfig, diagnostics: Diagnostics) -> Self {
        Self {
            id: 0,
            name: name.into(),
            config: config.clone(),
            diagnostics,
            graph: TdfGraph::new(),
            behaviors: Vec::new(),
            schedule: Schedule::default(),
            period: SimTime::ZERO,
            period_start: SimTime::ZERO,
            cursor: 0,
            next: None,
            time: SimTime::ZERO,
            elaborated: false,
            stats: TdfStats::default(),
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Creates a signal carrying `T`.
    pub fn signal<T: SampleValue>(&mut self, name: impl Into<String>) -> Signal<T> {
        self.elaborated = false;
        Signal::new(self.graph.add_signal::<T>(name.into()))
    }

    /// Adds a module. `build` declares its ports and returns its behavior.
    pub fn add_module<F>(&mut self, name: impl Into<String>, build: F) -> ModuleId
    where
        F: FnOnce(&mut ModuleBuilder<'_>) -> Box<dyn TdfModule>,
    {
        let id = self.graph.add_module(name.into());
        let behavior = build(&mut ModuleBuilder::new(&mut self.graph, id));
        self.behaviors.push(behavior);
        self.elaborated = false;
        id
    }

    pub fn bind_input<T: SampleValue>(&mut self, port: InPort<T>, signal: Signal<T>) -> Result<()> {
        self.elaborated = false;
        self.graph.bind(port.id(), signal.id())
    }

    pub fn bind_output<T: SampleValue>(&mut self, port: OutPort<T>, signal: Signal<T>) -> Result<()> {
        self.elaborated = false;
        self.graph.bind(port.id(), signal.id())
    }

    pub fn module<M: TdfModule>(&self, id: ModuleId) -> Option<&M> {
        self.behaviors.get(id)?.as_ref().as_any().downcast_ref::<M>()
    }

    pub fn module_mut<M: TdfModule>(&mut self, id: ModuleId) -> Option<&mut M> {
        self.behaviors.get_mut(id)?.as_mut().as_any_mut().downcast_mut::<M>()
    }

    pub fn module_info(&self, id: ModuleId) -> Option<&ModuleInfo> {
        self.graph.modules.get(id)
    }

    pub fn port_info(&self, port: impl PortHandle) -> Option<&PortInfo> {
        self.graph.ports.get(port.port_id())
    }

    /// Calls per period of a module after elaboration.
    pub fn calls(&self, id: ModuleId) -> Option<u64> {
        self.graph.modules.get(id).map(|m| m.calls)
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn period(&self) -> SimTime {
        self.period
    }

    pub fn graph(&self) -> &TdfGraph {
        &self.graph
    }

    pub fn stats(&self) -> &TdfStats {
        &self.stats
    }

    /// Latest sample written to a signal.
    pub fn signal_value<T: SampleValue>(&self, signal: Signal<T>) -> Option<T> {
        let typed = self.graph.typed_signal::<T>(signal.id(), &self.name).ok()?;
        typed.latest().map(|(_, v)| v.clone())
    }

    /// Sample `index` of a signal, if still buffered.
    pub fn signal_sample<T: SampleValue>(&self, signal: Signal<T>, index: u64) -> Option<T> {
        let typed = self.graph.typed_signal::<T>(signal.id(), &self.name).ok()?;
        typed.get(index).cloned()
    }

    /// Typed access to a converter input, e.g. to register trace callbacks.
    pub fn de_input_port<T: SampleValue>(&mut self, port: DeIn<T>) -> Result<&mut DeToTdf<T>> {
        self.graph.typed_converter_mut::<DeToTdf<T>>(port.id())
    }

    pub fn de_output_port<T: SampleValue>(&mut self, port: DeOut<T>) -> Result<&mut TdfToDe<T>> {
        self.graph.typed_converter_mut::<TdfToDe<T>>(port.id())
    }

    /// Forces a converter port to the value parsed from `input`.
    ///
    /// A string that does not convert is reported as a warning and leaves
    /// the port unchanged.
    pub fn force_from_str(&mut self, port: impl PortHandle, input: &str) -> Result<()> {
        let converter = self.graph.converter_mut(port.port_id())?;
        let name = converter.name().to_string();
        let outcome = converter.force_from_str(input);
        if let Err(err) = &outcome {
            self.diagnostics.report_error(name, err, Some(self.time));
        }
        outcome
    }

    pub fn release_force(&mut self, port: impl PortHandle) -> Result<()> {
        self.graph.converter_mut(port.port_id())?.release_force();
        Ok(())
    }

    fn fail<T>(&self, err: AmsError) -> Result<T> {
        self.diagnostics.report_error(self.name.clone(), &err, Some(self.time));
        Err(err)
    }

    /// Runs one callback on every module in the given phase.
    fn call_modules<F>(&mut self, phase: Phase, time: SimTime, mut f: F) -> Result<()>
    where
        F: FnMut(&mut dyn TdfModule, &mut TdfContext<'_>) -> Result<()>,
    {
        for (m, behavior) in self.behaviors.iter_mut().enumerate() {
            let mut ctx = TdfContext::new(phase, m, &mut self.graph, &self.diagnostics, time);
            f(behavior.as_mut(), &mut ctx)?;
        }
        Ok(())
    }

    /// Propagates attributes until `change_attributes` stops changing them.
    fn settle(&mut self, time: SimTime) -> Result<()> {
        let limit = self.config.max_propagation_iterations.max(1);
        for pass in 0..limit {
            propagate::solve_rates(&mut self.graph)?;
            propagate::propagate_timesteps(&mut self.graph)?;
            self.stats.propagation_passes += 1;

            self.graph.clear_changed();
            self.call_modules(Phase::ChangeAttributes, time, |m, ctx| m.change_attributes(ctx))?;
            if !self.graph.any_changed() {
                tracing::debug!(cluster = %self.name, passes = pass + 1, "attributes settled");
                return Ok(());
            }
        }
        Err(AmsError::PropagationNotConverged {
            cluster: self.name.clone(),
            iterations: limit,
        })
    }

    fn rebuild_schedule(&mut self) -> Result<()> {
        self.schedule = schedule::build(&self.graph)?;
        let first = &self.graph.modules[0];
        self.period = first.timestep * first.calls;
        self.cursor = 0;
        Ok(())
    }

    /// Resolves attributes and the schedule.
    pub fn elaborate_cluster(&mut self) -> Result<()> {
        let outcome = self.try_elaborate();
        match outcome {
            Ok(()) => Ok(()),
            Err(err) => self.fail(err),
        }
    }

    fn try_elaborate(&mut self) -> Result<()> {
        if let Some(err) = self.graph.binding_errors.drain(..).next() {
            return Err(err);
        }
        check_bindings(&self.graph)?;
        propagate::check_connected(&self.graph, &self.name)?;
        for (id, links) in self.graph.links.iter().enumerate() {
            if links.readers.is_empty() {
                self.diagnostics
                    .warning(self.name.clone(), format!("signal `{}` has no reader", self.graph.signal_name(id)));
            }
        }

        self.graph.initialized = false;
        self.call_modules(Phase::SetAttributes, SimTime::ZERO, |m, ctx| m.set_attributes(ctx))?;
        self.settle(SimTime::ZERO)?;
        self.rebuild_schedule()?;
        self.elaborated = true;

        tracing::info!(
            cluster = %self.name,
            modules = self.graph.modules.len(),
            signals = self.graph.signals.len(),
            firings = self.schedule.len(),
            period = %self.period,
            "tdf cluster elaborated"
        );
        Ok(())
    }

    fn call_time(&self, module: ModuleId) -> SimTime {
        let info = &self.graph.modules[module];
        self.period_start + info.timestep * info.call_index
    }

    fn flush_notifications(&mut self, kernel: &mut dyn HostKernel) -> Result<()> {
        let now = kernel.now();
        for (port, time) in std::mem::take(&mut self.graph.notifications) {
            let aligned = self
                .config
                .converter_alignment
                .align(time, self.config.de_resolution)
                .ok_or_else(|| AmsError::TimestepInconsistent {
                    location: self.graph.ports[port].name.clone(),
                    message: format!(
                        "sample time {} is not on the DE resolution grid {}",
                        time, self.config.de_resolution
                    ),
                })?;
            if aligned < now {
                tracing::debug!(port = %self.graph.ports[port].name, sample = %time, now = %now, "late DE output");
            }
            kernel.notify(Event::converter_update(aligned.max(now), self.id, port))?;
            self.stats.converter_updates += 1;
        }
        Ok(())
    }

    fn fire(&mut self, module: ModuleId, kernel: &mut dyn HostKernel) -> Result<()> {
        let time = self.call_time(module);
        {
            let behavior = &mut self.behaviors[module];
            let mut ctx = TdfContext::new(Phase::Processing, module, &mut self.graph, &self.diagnostics, time);
            behavior.processing(&mut ctx)?;
        }
        let ports = self.graph.modules[module].ports.clone();
        for p in ports {
            let port = &mut self.graph.ports[p];
            port.position += port.rate as u64;
        }
        let info = &mut self.graph.modules[module];
        info.call_index += 1;
        info.activations += 1;
        self.stats.firings += 1;
        self.time = self.time.max(time);
        self.flush_notifications(kernel)
    }

    /// Drops samples every reader has consumed.
    fn release_buffers(&mut self) {
        let graph = &mut self.graph;
        for (id, links) in graph.links.iter().enumerate() {
            let end = graph.signals[id].end_index();
            let needed = links
                .readers
                .iter()
                .map(|&r| graph.ports[r].position.saturating_sub(graph.ports[r].delay as u64))
                .min()
                .unwrap_or(end);
            graph.signals[id].release_before(needed.min(end.saturating_sub(1)));
        }
        for port in &graph.ports {
            if port.kind == PortKind::DeIn {
                if let Some(c) = port.converter {
                    graph.converters[c].release_before(port.position);
                }
            }
        }
    }

    fn end_period(&mut self, kernel: &mut dyn HostKernel) -> Result<()> {
        self.stats.periods += 1;
        self.release_buffers();
        self.period_start = self.period_start.saturating_add(self.period);
        self.cursor = 0;
        for module in &mut self.graph.modules {
            module.call_index = 0;
        }

        let start = self.period_start;
        self.graph.clear_changed();
        self.call_modules(Phase::ChangeAttributes, start, |m, ctx| m.change_attributes(ctx))?;
        if self.graph.any_changed() {
            self.settle(start)?;
            self.rebuild_schedule()?;
            self.call_modules(Phase::Reinitialize, start, |m, ctx| m.reinitialize(ctx))?;
            self.flush_notifications(kernel)?;
            self.stats.reschedules += 1;
            tracing::info!(cluster = %self.name, period = %self.period, at = %start, "tdf cluster rescheduled");
        }
        Ok(())
    }

    fn run_due(&mut self, kernel: &mut dyn HostKernel) -> Result<()> {
        let now = kernel.now();
        loop {
            if self.cursor == 0 && self.period_start > now {
                self.next = Some(self.period_start);
                return Ok(());
            }
            let module = self.schedule.firings[self.cursor];
            let time = self.call_time(module);
            if time > now && self.graph.has_de_inputs(module) {
                self.next = Some(time);
                return Ok(());
            }
            self.fire(module, kernel)?;
            self.cursor += 1;
            if self.cursor == self.schedule.len() {
                self.end_period(kernel)?;
            }
        }
    }
}

impl ClusterExecutor for TdfCluster {
    fn id(&self) -> ExecutorId {
        self.id
    }

    fn set_id(&mut self, id: ExecutorId) {
        self.id = id;
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn elaborate(&mut self) -> Result<()> {
        self.elaborate_cluster()
    }

    fn initialize(&mut self, kernel: &mut dyn HostKernel) -> Result<()> {
        if !self.elaborated {
            self.elaborate_cluster()?;
        }
        let now = kernel.now();
        self.period_start = now;
        self.time = now;
        self.cursor = 0;
        let outcome = self
            .call_modules(Phase::Initialize, now, |m, ctx| m.initialize(ctx))
            .and_then(|_| self.flush_notifications(kernel));
        self.graph.initialized = true;
        self.next = Some(now);
        outcome.or_else(|err| self.fail(err))
    }

    fn next_activation(&self) -> Option<SimTime> {
        self.next
    }

    fn activate(&mut self, kernel: &mut dyn HostKernel) -> Result<()> {
        if !self.elaborated || self.schedule.is_empty() {
            return Ok(());
        }
        let outcome = self.run_due(kernel);
        outcome.or_else(|err| {
            self.next = None;
            self.fail(err)
        })
    }

    fn handle_event(&mut self, event: &Event, kernel: &mut dyn HostKernel) -> Result<()> {
        if let EventPayload::ConverterUpdate { executor, port } = event.payload {
            if executor != self.id {
                return Ok(());
            }
            let now = kernel.now();
            let converter = self.graph.converter_mut(port)?;
            if !converter.de_callback(now) {
                self.diagnostics.report(
                    Severity::Warning,
                    converter.name().to_string(),
                    "DE update without a produced sample",
                    Some(now),
                );
            }
        }
        Ok(())
    }

    fn export_stats(&self) -> serde_json::Value {
        let modules: Vec<serde_json::Value> = self
            .graph
            .modules
            .iter()
            .map(|m| {
                json!({
                    "name": m.name,
                    "timestep": m.timestep,
                    "calls": m.calls,
                    "activations": m.activations,
                })
            })
            .collect();
        json!({
            "kind": "tdf",
            "id": self.id,
            "name": self.name,
            "period": self.period,
            "current_time": self.time,
            "stats": self.stats,
            "modules": modules,
        })
    }

    fn current_time(&self) -> SimTime {
        self.time
    }
}

impl std::fmt::Debug for TdfCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TdfCluster")
            .field("name", &self.name)
            .field("graph", &self.graph)
            .field("period", &self.period)
            .finish()
    }
}
