//! Phase-tagged access to ports and attributes.
//!
//! Every module callback receives a [`TdfContext`]. All port reads and
//! writes and all attribute changes go through it, and it checks them
//! against the current [`Phase`]:
//!
//! | Operation | Permitted in |
//! |-----------|--------------|
//! | `read`, `read_de` | processing, initialize, reinitialize |
//! | `write`, `write_de` | processing |
//! | `initialize_value`, `initialize_input` | initialize, reinitialize |
//! | attribute setters | set_attributes, change_attributes |
//!
//! A call outside its phases is reported to the diagnostics sink and has
//! no effect; a read returns `T::default()`.

use crate::converter::{DeToTdf, TdfToDe};
use crate::error::{AmsError, Result};
use crate::report::Diagnostics;
use crate::tdf::graph::TdfGraph;
use crate::tdf::port::{DeIn, DeOut, InPort, OutPort, PortHandle, PortInfo, PortKind};
use crate::tdf::{Phase, SampleValue};
use crate::types::{ModuleId, PortId, SimTime};

pub struct TdfContext<'a> {
    phase: Phase,
    module: ModuleId,
    graph: &'a mut TdfGraph,
    diagnostics: &'a Diagnostics,
    time: SimTime,
}

impl<'a> TdfContext<'a> {
    pub(crate) fn new(
        phase: Phase,
        module: ModuleId,
        graph: &'a mut TdfGraph,
        diagnostics: &'a Diagnostics,
        time: SimTime,
    ) -> Self {
        Self {
            phase,
            module,
            graph,
            diagnostics,
            time,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn module_name(&self) -> &str {
        &self.graph.modules[self.module].name
    }

    /// Start time of the current call.
    pub fn time(&self) -> SimTime {
        self.time
    }

    /// Calls of this module per cluster period.
    pub fn calls_per_period(&self) -> u64 {
        self.graph.modules[self.module].calls
    }

    /// Total calls of `processing` so far.
    pub fn activations(&self) -> u64 {
        self.graph.modules[self.module].activations
    }

    fn own_port(&self, port: PortId) -> Result<&PortInfo> {
        let info = self.graph.port(port)?;
        if info.module != self.module {
            return Err(AmsError::ForeignPort {
                port: info.name.clone(),
            });
        }
        Ok(info)
    }

    fn own_port_mut(&mut self, port: PortId) -> Result<&mut PortInfo> {
        let module = self.module;
        let info = self.graph.port_mut(port)?;
        if info.module != module {
            return Err(AmsError::ForeignPort {
                port: info.name.clone(),
            });
        }
        Ok(info)
    }

    /// Reports an access outside the permitted phases.
    fn violation(&self, port: &str, operation: &'static str) {
        let err = AmsError::AccessViolation {
            port: port.to_string(),
            operation,
            phase: self.phase,
        };
        self.diagnostics.report_error(port, &err, Some(self.time));
    }

    fn check_rate(info: &PortInfo, k: usize) -> Result<()> {
        if k >= info.rate {
            return Err(AmsError::SampleIdExceedsRate {
                port: info.name.clone(),
                sample: k,
                rate: info.rate,
            });
        }
        Ok(())
    }

    fn check_delay(info: &PortInfo, k: usize) -> Result<()> {
        if k >= info.delay {
            return Err(AmsError::SampleIdExceedsDelay {
                port: info.name.clone(),
                sample: k,
                delay: info.delay,
            });
        }
        Ok(())
    }

    fn bound_signal(info: &PortInfo) -> Result<usize> {
        info.signal.ok_or_else(|| AmsError::UnboundTerminal {
            component: info.name.clone(),
            terminal: info.name.rsplit('.').next().unwrap_or_default().to_string(),
        })
    }

    /// Reads sample `k` of the current call.
    pub fn read<T: SampleValue>(&mut self, port: InPort<T>, k: usize) -> Result<T> {
        let info = self.own_port(port.id())?.clone();
        if !self.phase.allows_read() {
            self.violation(&info.name, "read");
            return Ok(T::default());
        }
        Self::check_rate(&info, k)?;
        let signal = Self::bound_signal(&info)?;
        let j = info.position + k as u64;
        let delay = info.delay as u64;
        let typed = self.graph.typed_signal::<T>(signal, &info.name)?;
        if j < delay {
            return Ok(typed.reader_initial(port.id(), j as usize));
        }
        let index = j - delay;
        typed
            .get(index)
            .cloned()
            .ok_or(AmsError::SampleNotAvailable { port: info.name, index })
    }

    /// Writes sample `k` of the current call.
    pub fn write<T: SampleValue>(&mut self, port: OutPort<T>, k: usize, value: T) -> Result<()> {
        let info = self.own_port(port.id())?.clone();
        if !self.phase.allows_write() {
            self.violation(&info.name, "write");
            return Ok(());
        }
        Self::check_rate(&info, k)?;
        let signal = Self::bound_signal(&info)?;
        let index = info.position + (k + info.delay) as u64;
        if !self.graph.typed_signal_mut::<T>(signal, &info.name)?.write(index, value) {
            tracing::warn!(port = %info.name, index, "write to a released sample");
        }
        Ok(())
    }

    /// Sets delayed output sample `k`, which readers see before the first written sample.
    pub fn initialize_value<T: SampleValue>(&mut self, port: OutPort<T>, k: usize, value: T) -> Result<()> {
        let info = self.own_port(port.id())?.clone();
        if !self.phase.allows_initial_values() {
            self.violation(&info.name, "initialize");
            return Ok(());
        }
        Self::check_delay(&info, k)?;
        let signal = Self::bound_signal(&info)?;
        let index = info.position + k as u64;
        self.graph.typed_signal_mut::<T>(signal, &info.name)?.write(index, value);
        Ok(())
    }

    /// Sets the value this input reads for its delayed sample `k`.
    pub fn initialize_input<T: SampleValue>(&mut self, port: InPort<T>, k: usize, value: T) -> Result<()> {
        let info = self.own_port(port.id())?.clone();
        if !self.phase.allows_initial_values() {
            self.violation(&info.name, "initialize");
            return Ok(());
        }
        Self::check_delay(&info, k)?;
        let signal = Self::bound_signal(&info)?;
        self.graph
            .typed_signal_mut::<T>(signal, &info.name)?
            .set_reader_initial(port.id(), k, info.delay, value);
        Ok(())
    }

    /// Samples the DE signal behind a converter input. A port delay of `d`
    /// reads the value `d` port timesteps earlier.
    pub fn read_de<T: SampleValue>(&mut self, port: DeIn<T>, k: usize) -> Result<T> {
        let info = self.own_port(port.id())?.clone();
        if !self.phase.allows_read() {
            self.violation(&info.name, "read");
            return Ok(T::default());
        }
        Self::check_rate(&info, k)?;
        let index = info.position + k as u64;
        let lag = info.timestep * info.delay as u64;
        let time = self.port_sample_time(&info, k).saturating_sub(lag);
        let converter = self.graph.typed_converter_mut::<DeToTdf<T>>(port.id())?;
        Ok(converter.sample(index, time))
    }

    /// Queues a value for the DE signal behind a converter output.
    pub fn write_de<T: SampleValue>(&mut self, port: DeOut<T>, k: usize, value: T) -> Result<()> {
        let info = self.own_port(port.id())?.clone();
        if !self.phase.allows_write() {
            self.violation(&info.name, "write");
            return Ok(());
        }
        Self::check_rate(&info, k)?;
        let time = self.port_sample_time(&info, k + info.delay);
        self.graph
            .typed_converter_mut::<TdfToDe<T>>(port.id())?
            .push(time, value);
        self.graph.notifications.push((port.id(), time));
        Ok(())
    }

    /// Sets an initial DE output value for delayed sample `k`.
    pub fn initialize_de<T: SampleValue>(&mut self, port: DeOut<T>, k: usize, value: T) -> Result<()> {
        let info = self.own_port(port.id())?.clone();
        if !self.phase.allows_initial_values() {
            self.violation(&info.name, "initialize");
            return Ok(());
        }
        Self::check_delay(&info, k)?;
        let time = self.port_sample_time(&info, k);
        self.graph
            .typed_converter_mut::<TdfToDe<T>>(port.id())?
            .push(time, value);
        self.graph.notifications.push((port.id(), time));
        Ok(())
    }

    fn port_sample_time(&self, info: &PortInfo, k: usize) -> SimTime {
        self.time
            .saturating_add(info.timestep * k as u64)
            .saturating_add(info.timeoffset)
    }

    /// Time of sample `k` of the current call on `port`.
    pub fn sample_time(&self, port: impl PortHandle, k: usize) -> Result<SimTime> {
        let info = self.own_port(port.port_id())?;
        Ok(self.port_sample_time(info, k))
    }

    fn attribute_guard(&self, port: Option<PortId>) -> Result<bool> {
        if self.phase.allows_attribute_change() {
            return Ok(true);
        }
        let name = match port {
            Some(p) => self.graph.port(p)?.name.clone(),
            None => self.module_name().to_string(),
        };
        self.violation(&name, "attribute change");
        Ok(false)
    }

    pub fn set_rate(&mut self, port: impl PortHandle, rate: usize) -> Result<()> {
        if !self.attribute_guard(Some(port.port_id()))? {
            return Ok(());
        }
        let info = self.own_port_mut(port.port_id())?;
        if rate == 0 {
            return Err(AmsError::RateInconsistent {
                location: info.name.clone(),
                message: "rate must be at least 1".to_string(),
            });
        }
        if info.rate != rate {
            info.rate = rate;
            info.changed = true;
        }
        Ok(())
    }

    pub fn set_delay(&mut self, port: impl PortHandle, delay: usize) -> Result<()> {
        if !self.attribute_guard(Some(port.port_id()))? {
            return Ok(());
        }
        let frozen = self.graph.initialized;
        let info = self.own_port_mut(port.port_id())?;
        if info.delay == delay {
            return Ok(());
        }
        if frozen {
            return Err(AmsError::Elaboration {
                component: info.name.clone(),
                message: "port delay cannot change after initialization".to_string(),
            });
        }
        info.delay = delay;
        info.changed = true;
        Ok(())
    }

    pub fn set_timestep(&mut self, port: impl PortHandle, timestep: SimTime) -> Result<()> {
        if !self.attribute_guard(Some(port.port_id()))? {
            return Ok(());
        }
        let info = self.own_port_mut(port.port_id())?;
        if info.assigned_timestep != Some(timestep) {
            info.assigned_timestep = Some(timestep);
            info.changed = true;
        }
        Ok(())
    }

    pub fn set_timeoffset(&mut self, port: impl PortHandle, offset: SimTime) -> Result<()> {
        if !self.attribute_guard(Some(port.port_id()))? {
            return Ok(());
        }
        let info = self.own_port_mut(port.port_id())?;
        if info.timeoffset != offset {
            info.timeoffset = offset;
            info.changed = true;
        }
        Ok(())
    }

    /// Requests a timestep for this module.
    pub fn set_module_timestep(&mut self, timestep: SimTime) -> Result<()> {
        if !self.attribute_guard(None)? {
            return Ok(());
        }
        let module = &mut self.graph.modules[self.module];
        if module.assigned_timestep != Some(timestep) {
            module.assigned_timestep = Some(timestep);
            module.changed = true;
        }
        Ok(())
    }

    pub fn rate(&self, port: impl PortHandle) -> Result<usize> {
        Ok(self.own_port(port.port_id())?.rate)
    }

    pub fn delay(&self, port: impl PortHandle) -> Result<usize> {
        Ok(self.own_port(port.port_id())?.delay)
    }

    /// Propagated timestep of a port.
    pub fn timestep(&self, port: impl PortHandle) -> Result<SimTime> {
        Ok(self.own_port(port.port_id())?.timestep)
    }

    pub fn timeoffset(&self, port: impl PortHandle) -> Result<SimTime> {
        Ok(self.own_port(port.port_id())?.timeoffset)
    }

    /// Propagated timestep of this module.
    pub fn module_timestep(&self) -> SimTime {
        self.graph.modules[self.module].timestep
    }

    /// Whether `port` is a TDF input or a converter input.
    pub fn is_input(&self, port: impl PortHandle) -> Result<bool> {
        Ok(self.own_port(port.port_id())?.kind.is_input())
    }

    pub fn port_kind(&self, port: impl PortHandle) -> Result<PortKind> {
        Ok(self.own_port(port.port_id())?.kind)
    }
}
