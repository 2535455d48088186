//! Structural store of a TDF cluster: modules, ports, signals and converters.

use serde::Serialize;

use crate::converter::{Converter, DeSignal, DeToTdf, TdfToDe};
use crate::error::{AmsError, Result};
use crate::tdf::port::{PortInfo, PortKind};
use crate::tdf::signal::{ErasedSignal, TypedSignal};
use crate::tdf::SampleValue;
use crate::types::{ModuleId, PortId, SignalId, SimTime};

#[derive(Clone, Debug, Serialize)]
pub struct ModuleInfo {
    pub name: String,
    pub ports: Vec<PortId>,
    pub assigned_timestep: Option<SimTime>,
    pub timestep: SimTime,
    /// Calls per cluster period.
    pub calls: u64,
    /// Calls already made in the current period.
    pub call_index: u64,
    pub activations: u64,
    pub changed: bool,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct SignalLinks {
    pub writer: Option<PortId>,
    pub readers: Vec<PortId>,
}

impl SignalLinks {
    pub fn ports(&self) -> impl Iterator<Item = PortId> + '_ {
        self.writer.iter().copied().chain(self.readers.iter().copied())
    }
}

#[derive(Default)]
pub struct TdfGraph {
    pub(crate) modules: Vec<ModuleInfo>,
    pub(crate) ports: Vec<PortInfo>,
    pub(crate) signals: Vec<Box<dyn ErasedSignal>>,
    pub(crate) links: Vec<SignalLinks>,
    pub(crate) converters: Vec<Box<dyn Converter>>,
    /// DE output samples produced since the last flush.
    pub(crate) notifications: Vec<(PortId, SimTime)>,
    /// Binding problems found while modules were built.
    pub(crate) binding_errors: Vec<AmsError>,
    /// Set once modules have been initialized; delays are frozen from then on.
    pub(crate) initialized: bool,
}

impl TdfGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn modules(&self) -> &[ModuleInfo] {
        &self.modules
    }

    pub fn ports(&self) -> &[PortInfo] {
        &self.ports
    }

    pub fn links(&self) -> &[SignalLinks] {
        &self.links
    }

    pub fn signal_name(&self, signal: SignalId) -> &str {
        self.signals.get(signal).map(|s| s.name()).unwrap_or("?")
    }

    pub(crate) fn add_module(&mut self, name: String) -> ModuleId {
        self.modules.push(ModuleInfo {
            name,
            ports: Vec::new(),
            assigned_timestep: None,
            timestep: SimTime::ZERO,
            calls: 1,
            call_index: 0,
            activations: 0,
            changed: false,
        });
        self.modules.len() - 1
    }

    pub(crate) fn add_signal<T: SampleValue>(&mut self, name: String) -> SignalId {
        self.signals.push(Box::new(TypedSignal::<T>::new(name)));
        self.links.push(SignalLinks::default());
        self.signals.len() - 1
    }

    pub(crate) fn add_port<T: SampleValue>(&mut self, module: ModuleId, name: &str, kind: PortKind) -> PortId {
        let full = format!("{}.{}", self.modules[module].name, name);
        self.ports.push(PortInfo::new(full, module, kind, T::type_name()));
        let id = self.ports.len() - 1;
        self.modules[module].ports.push(id);
        id
    }

    pub(crate) fn add_converter_port<T: SampleValue>(
        &mut self,
        module: ModuleId,
        name: &str,
        kind: PortKind,
        signal: &DeSignal<T>,
    ) -> PortId {
        let id = self.add_port::<T>(module, name, kind);
        let port_name = self.ports[id].name.clone();
        let converter: Box<dyn Converter> = match kind {
            PortKind::DeOut => Box::new(TdfToDe::new(port_name, signal.clone())),
            _ => Box::new(DeToTdf::new(port_name, signal.clone())),
        };
        self.converters.push(converter);
        self.ports[id].converter = Some(self.converters.len() - 1);
        id
    }

    /// Connects a TDF port to a signal.
    pub(crate) fn bind(&mut self, port: PortId, signal: SignalId) -> Result<()> {
        let info = self.ports.get(port).ok_or(AmsError::UnknownId { kind: "port", id: port })?;
        let sig = self
            .signals
            .get(signal)
            .ok_or(AmsError::UnknownId { kind: "signal", id: signal })?;
        if info.kind.is_converter() {
            return Err(AmsError::Elaboration {
                component: info.name.clone(),
                message: "converter ports bind to DE signals only".to_string(),
            });
        }
        if info.type_name != sig.type_name() {
            return Err(AmsError::TypeMismatch {
                port: info.name.clone(),
                expected: info.type_name,
                found: sig.type_name(),
            });
        }
        if info.signal.is_some() {
            return Err(AmsError::Elaboration {
                component: info.name.clone(),
                message: "port is already bound".to_string(),
            });
        }
        let links = &mut self.links[signal];
        match info.kind {
            PortKind::Out => {
                if let Some(writer) = links.writer {
                    return Err(AmsError::Elaboration {
                        component: sig.name().to_string(),
                        message: format!(
                            "signal already driven by `{}`, cannot add `{}`",
                            self.ports[writer].name, info.name
                        ),
                    });
                }
                links.writer = Some(port);
            }
            _ => links.readers.push(port),
        }
        self.ports[port].signal = Some(signal);
        Ok(())
    }

    pub(crate) fn port(&self, port: PortId) -> Result<&PortInfo> {
        self.ports.get(port).ok_or(AmsError::UnknownId { kind: "port", id: port })
    }

    pub(crate) fn port_mut(&mut self, port: PortId) -> Result<&mut PortInfo> {
        self.ports
            .get_mut(port)
            .ok_or(AmsError::UnknownId { kind: "port", id: port })
    }

    pub(crate) fn typed_signal<T: SampleValue>(&self, signal: SignalId, port: &str) -> Result<&TypedSignal<T>> {
        let erased = self
            .signals
            .get(signal)
            .map(|s| &**s)
            .ok_or(AmsError::UnknownId { kind: "signal", id: signal })?;
        let found = erased.type_name();
        erased
            .as_any()
            .downcast_ref::<TypedSignal<T>>()
            .ok_or_else(|| AmsError::TypeMismatch {
                port: port.to_string(),
                expected: found,
                found: T::type_name(),
            })
    }

    pub(crate) fn typed_signal_mut<T: SampleValue>(
        &mut self,
        signal: SignalId,
        port: &str,
    ) -> Result<&mut TypedSignal<T>> {
        let erased = self
            .signals
            .get_mut(signal)
            .map(|s| &mut **s)
            .ok_or(AmsError::UnknownId { kind: "signal", id: signal })?;
        let found = erased.type_name();
        erased
            .as_any_mut()
            .downcast_mut::<TypedSignal<T>>()
            .ok_or_else(|| AmsError::TypeMismatch {
                port: port.to_string(),
                expected: found,
                found: T::type_name(),
            })
    }

    pub(crate) fn converter_mut(&mut self, port: PortId) -> Result<&mut Box<dyn Converter>> {
        let info = self.port(port)?;
        let name = info.name.clone();
        let index = info.converter.ok_or_else(|| AmsError::Elaboration {
            component: name,
            message: "not a converter port".to_string(),
        })?;
        self.converters
            .get_mut(index)
            .ok_or(AmsError::UnknownId { kind: "converter", id: index })
    }

    pub(crate) fn typed_converter_mut<C: Converter>(&mut self, port: PortId) -> Result<&mut C> {
        let converter = self.converter_mut(port)?;
        let name = converter.name().to_string();
        let found = converter.value_type();
        (**converter)
            .as_any_mut()
            .downcast_mut::<C>()
            .ok_or(AmsError::TypeMismatch {
                port: name,
                expected: found,
                found: std::any::type_name::<C>(),
            })
    }

    /// Whether module `m` samples a DE signal.
    pub fn has_de_inputs(&self, module: ModuleId) -> bool {
        self.modules[module]
            .ports
            .iter()
            .any(|&p| self.ports[p].kind == PortKind::DeIn)
    }

    pub(crate) fn clear_changed(&mut self) {
        self.modules.iter_mut().for_each(|m| m.changed = false);
        self.ports.iter_mut().for_each(|p| p.changed = false);
    }

    pub(crate) fn any_changed(&self) -> bool {
        self.modules.iter().any(|m| m.changed) || self.ports.iter().any(|p| p.changed)
    }
}

impl std::fmt::Debug for TdfGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TdfGraph")
            .field("modules", &self.modules.len())
            .field("ports", &self.ports.len())
            .field("signals", &self.signals.len())
            .field("converters", &self.converters.len())
            .finish()
    }
}
