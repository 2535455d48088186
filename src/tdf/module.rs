//! TDF module behavior and the builder used to declare its ports.

use crate::converter::DeSignal;
use crate::eqn::AsAny;
use crate::error::{AmsError, Result};
use crate::tdf::context::TdfContext;
use crate::tdf::graph::TdfGraph;
use crate::tdf::port::{DeIn, DeOut, InPort, OutPort, PortKind, Signal};
use crate::tdf::SampleValue;
use crate::types::ModuleId;

/// Attribute callbacks.
///
/// `set_attributes` runs once before propagation. `change_attributes` runs
/// after every propagation pass and after every cluster period; any
/// attribute it changes triggers another propagation.
pub trait RateNegotiable {
    fn set_attributes(&mut self, _ctx: &mut TdfContext<'_>) -> Result<()> {
        Ok(())
    }

    fn change_attributes(&mut self, _ctx: &mut TdfContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// A TDF module. `processing` is called `calls_per_period` times per cluster period.
pub trait TdfModule: RateNegotiable + AsAny + Send {
    fn initialize(&mut self, _ctx: &mut TdfContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Called after a run-time attribute change has been propagated.
    fn reinitialize(&mut self, _ctx: &mut TdfContext<'_>) -> Result<()> {
        Ok(())
    }

    fn processing(&mut self, ctx: &mut TdfContext<'_>) -> Result<()>;
}

/// Declares the ports of a module being added to a cluster.
pub struct ModuleBuilder<'a> {
    graph: &'a mut TdfGraph,
    module: ModuleId,
}

impl<'a> ModuleBuilder<'a> {
    pub(crate) fn new(graph: &'a mut TdfGraph, module: ModuleId) -> Self {
        Self { graph, module }
    }

    pub fn id(&self) -> ModuleId {
        self.module
    }

    pub fn name(&self) -> &str {
        &self.graph.modules[self.module].name
    }

    fn bind_or_record(&mut self, port: usize, signal: usize) {
        if let Err(err) = self.graph.bind(port, signal) {
            self.graph.binding_errors.push(err);
        }
    }

    /// Input bound to `signal`.
    pub fn input<T: SampleValue>(&mut self, name: &str, signal: Signal<T>) -> InPort<T> {
        let port = self.graph.add_port::<T>(self.module, name, PortKind::In);
        self.bind_or_record(port, signal.id());
        InPort::new(port)
    }

    /// Output driving `signal`.
    pub fn output<T: SampleValue>(&mut self, name: &str, signal: Signal<T>) -> OutPort<T> {
        let port = self.graph.add_port::<T>(self.module, name, PortKind::Out);
        self.bind_or_record(port, signal.id());
        OutPort::new(port)
    }

    /// Input to be bound later with [`TdfCluster::bind_input`](crate::tdf::TdfCluster::bind_input).
    pub fn input_unbound<T: SampleValue>(&mut self, name: &str) -> InPort<T> {
        InPort::new(self.graph.add_port::<T>(self.module, name, PortKind::In))
    }

    pub fn output_unbound<T: SampleValue>(&mut self, name: &str) -> OutPort<T> {
        OutPort::new(self.graph.add_port::<T>(self.module, name, PortKind::Out))
    }

    /// Converter input sampling `signal`.
    pub fn de_input<T: SampleValue>(&mut self, name: &str, signal: &DeSignal<T>) -> DeIn<T> {
        DeIn::new(
            self.graph
                .add_converter_port(self.module, name, PortKind::DeIn, signal),
        )
    }

    /// Converter output driving `signal`.
    pub fn de_output<T: SampleValue>(&mut self, name: &str, signal: &DeSignal<T>) -> DeOut<T> {
        DeOut::new(
            self.graph
                .add_converter_port(self.module, name, PortKind::DeOut, signal),
        )
    }
}

/// Checks that every TDF port is bound and every read signal has a writer.
pub(crate) fn check_bindings(graph: &TdfGraph) -> Result<()> {
    for port in &graph.ports {
        if !port.kind.is_converter() && port.signal.is_none() {
            let terminal = port.name.rsplit('.').next().unwrap_or_default().to_string();
            return Err(AmsError::UnboundTerminal {
                component: graph.modules[port.module].name.clone(),
                terminal,
            });
        }
    }
    for (id, links) in graph.links.iter().enumerate() {
        if links.writer.is_none() && !links.readers.is_empty() {
            return Err(AmsError::Elaboration {
                component: graph.signal_name(id).to_string(),
                message: "signal is read but never written".to_string(),
            });
        }
    }
    Ok(())
}
