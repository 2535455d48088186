//! Tests for DE/TDF converter ports.
//!
//! These tests verify:
//! - Sampling of DE signals at TDF sample times, with and without port delay
//! - Declustering of multirate TDF output onto a DE signal
//! - Forcing and releasing converter values

use mixsig::config::AmsConfig;
use mixsig::converter::DeSignal;
use mixsig::report::Severity;
use mixsig::tdf::{DeIn, DeOut, Logic, RateNegotiable, SampleValue, TdfCluster, TdfContext, TdfModule};
use mixsig::{AmsError, AmsSimulator, ExecutorId, HostKernel, ModuleId, Result, SimTime};

fn us(v: u64) -> SimTime {
    SimTime::from_us(v)
}

// ============================================================================
// Test Modules
// ============================================================================

/// Samples a DE signal once per microsecond.
struct Sampler<T: SampleValue> {
    inp: DeIn<T>,
    delay: usize,
    seen: Vec<T>,
}

impl<T: SampleValue> RateNegotiable for Sampler<T> {
    fn set_attributes(&mut self, ctx: &mut TdfContext<'_>) -> Result<()> {
        ctx.set_delay(self.inp, self.delay)?;
        ctx.set_module_timestep(us(1))
    }
}

impl<T: SampleValue> TdfModule for Sampler<T> {
    fn processing(&mut self, ctx: &mut TdfContext<'_>) -> Result<()> {
        let v = ctx.read_de(self.inp, 0)?;
        self.seen.push(v);
        Ok(())
    }
}

/// Emits 1, 2, 3, ... with `rate` samples per call.
struct Emitter {
    out: DeOut<i64>,
    rate: usize,
    timestep: SimTime,
    n: i64,
}

impl RateNegotiable for Emitter {
    fn set_attributes(&mut self, ctx: &mut TdfContext<'_>) -> Result<()> {
        ctx.set_rate(self.out, self.rate)?;
        ctx.set_module_timestep(self.timestep)
    }
}

impl TdfModule for Emitter {
    fn processing(&mut self, ctx: &mut TdfContext<'_>) -> Result<()> {
        for k in 0..self.rate {
            self.n += 1;
            ctx.write_de(self.out, k, self.n)?;
        }
        Ok(())
    }
}

fn sampler_sim<T: SampleValue>(de: &DeSignal<T>, delay: usize) -> (AmsSimulator, ExecutorId, ModuleId, DeIn<T>) {
    let mut sim = AmsSimulator::new(AmsConfig::default());
    let mut cluster = TdfCluster::new("sampling", sim.config(), sim.diagnostics().clone());
    let mut port = None;
    let m = cluster.add_module("sampler", |b| {
        let inp = b.de_input("in", de);
        port = Some(inp);
        Box::new(Sampler {
            inp,
            delay,
            seen: Vec::new(),
        })
    });
    let id = sim.add_executor(Box::new(cluster));
    (sim, id, m, port.unwrap())
}

fn seen<T: SampleValue>(sim: &AmsSimulator, id: ExecutorId, m: ModuleId) -> Vec<T> {
    sim.executor_as::<TdfCluster>(id)
        .unwrap()
        .module::<Sampler<T>>(m)
        .unwrap()
        .seen
        .clone()
}

// ============================================================================
// DE to TDF
// ============================================================================

#[test]
fn test_de_input_samples_at_call_times() {
    let de = DeSignal::new("ctrl", 0.0);
    de.write_at(us(2), 3.0);
    let (mut sim, id, m, _) = sampler_sim(&de, 0);
    sim.run(us(4)).unwrap();
    assert_eq!(seen::<f64>(&sim, id, m), vec![0.0, 0.0, 3.0, 3.0, 3.0]);
}

#[test]
fn test_de_input_delay_reads_earlier_values() {
    let de = DeSignal::new("ctrl", 0.0);
    de.write_at(us(2), 3.0);
    let (mut sim, id, m, _) = sampler_sim(&de, 1);
    sim.run(us(4)).unwrap();
    assert_eq!(seen::<f64>(&sim, id, m), vec![0.0, 0.0, 0.0, 3.0, 3.0]);
}

#[test]
fn test_forced_input_ignores_signal_until_released() {
    let de = DeSignal::new("enable", Logic::Zero);
    let (mut sim, id, m, port) = sampler_sim(&de, 0);
    sim.executor_as_mut::<TdfCluster>(id)
        .unwrap()
        .force_from_str(port, "1")
        .unwrap();
    sim.run(us(1)).unwrap();

    sim.executor_as_mut::<TdfCluster>(id)
        .unwrap()
        .release_force(port)
        .unwrap();
    sim.run(us(3)).unwrap();

    assert_eq!(
        seen::<Logic>(&sim, id, m),
        vec![Logic::One, Logic::One, Logic::Zero, Logic::Zero]
    );
}

#[test]
fn test_unparsable_force_is_a_warning() {
    let de = DeSignal::new("enable", Logic::Zero);
    let (mut sim, id, _, port) = sampler_sim(&de, 0);
    let cluster = sim.executor_as_mut::<TdfCluster>(id).unwrap();
    let err = cluster.force_from_str(port, "maybe").unwrap_err();
    assert!(matches!(err, AmsError::Conversion { .. }));
    assert_eq!(cluster.diagnostics().count(Severity::Warning), 1);
    assert!(!cluster.diagnostics().has_errors());
}

// ============================================================================
// TDF to DE
// ============================================================================

fn emitter_sim(de: &DeSignal<i64>, rate: usize, timestep: SimTime) -> (AmsSimulator, ExecutorId, DeOut<i64>) {
    let mut sim = AmsSimulator::new(AmsConfig::default());
    let mut cluster = TdfCluster::new("emitting", sim.config(), sim.diagnostics().clone());
    let mut port = None;
    cluster.add_module("emitter", |b| {
        let out = b.de_output("out", de);
        port = Some(out);
        Box::new(Emitter {
            out,
            rate,
            timestep,
            n: 0,
        })
    });
    let id = sim.add_executor(Box::new(cluster));
    (sim, id, port.unwrap())
}

#[test]
fn test_de_output_writes_each_sample() {
    let de = DeSignal::new("count", 0i64);
    let (mut sim, _, _) = emitter_sim(&de, 1, us(1));
    sim.run(us(3)).unwrap();

    let times: Vec<SimTime> = de.history().into_iter().map(|(t, _)| t).collect();
    assert_eq!(times, vec![us(0), us(1), us(2), us(3)]);
    assert_eq!(de.read_at(us(2)), 3);
    assert_eq!(de.change_count(), 4);
}

#[test]
fn test_multirate_output_is_declustered() {
    let de = DeSignal::new("count", 0i64);
    let (mut sim, id, port) = emitter_sim(&de, 2, us(2));
    sim.run(us(3)).unwrap();

    // two samples per 2 us call, one DE write per microsecond
    assert_eq!(
        de.history(),
        vec![(us(0), 1), (us(1), 2), (us(2), 3), (us(3), 4)]
    );
    let cluster = sim.executor_as_mut::<TdfCluster>(id).unwrap();
    assert_eq!(cluster.de_output_port(port).unwrap().writes(), 4);
    assert_eq!(cluster.stats().converter_updates, 4);
}

#[test]
fn test_forced_output_overrides_produced_values() {
    let de = DeSignal::new("count", 0i64);
    let (mut sim, id, port) = emitter_sim(&de, 1, us(1));
    sim.run(us(1)).unwrap();
    sim.executor_as_mut::<TdfCluster>(id)
        .unwrap()
        .force_from_str(port, "-7")
        .unwrap();
    sim.run(us(3)).unwrap();

    assert_eq!(de.read_at(us(1)), 2);
    assert_eq!(de.read_at(us(2)), -7);
    assert_eq!(de.read_at(us(3)), -7);
    assert_eq!(sim.kernel().now(), us(3));
}
