//! RC low-pass filter example.
//!
//! The same first-order RC network is analysed twice: a small-signal AC
//! sweep of the bare network, then a transient run where the network is
//! embedded in a TDF cluster, driven by a sampled sine and watched by a
//! comparator that drives a discrete-event signal.

use std::f64::consts::PI;

use mixsig::config::AmsConfigBuilder;
use mixsig::converter::DeSignal;
use mixsig::eln::{Capacitor, Resistor, TdfVsource, Vsource};
use mixsig::network::Network;
use mixsig::report::Diagnostics;
use mixsig::tdf::{ContinuousModule, DeOut, InPort, OutPort, RateNegotiable, TdfCluster, TdfContext, TdfModule};
use mixsig::{AmsConfig, AmsSimulator, NodeId, PrimitiveId, Result, SimTime};

const R: f64 = 1e3;
const C: f64 = 100e-9;
const SIGNAL_HZ: f64 = 1e3;
const TIMESTEP: SimTime = SimTime::from_us(10);
const SIM_TIME: SimTime = SimTime::from_ms(3);

// -----------------------------------------------------------------------------
// Network
// -----------------------------------------------------------------------------

/// R from `in` to `out`, C from `out` to ground. Returns the network, the
/// driven source and the output node.
fn rc_network(config: &AmsConfig, diagnostics: Diagnostics, tdf_driven: bool) -> (Network, PrimitiveId, NodeId) {
    let mut net = Network::new("rc", config, diagnostics);
    let gnd = net.ground();
    let vin = net.add_node("in");
    let out = net.add_node("out");
    let source = if tdf_driven {
        net.add_primitive(Box::new(TdfVsource::new("vin", vin, gnd)))
    } else {
        net.add_primitive(Box::new(Vsource::dc("vin", vin, gnd, 0.0).with_ac(1.0, 0.0)))
    };
    net.add_primitive(Box::new(Resistor::new("r", vin, out, R)));
    net.add_primitive(Box::new(Capacitor::new("c", out, gnd, C)));
    (net, source, out)
}

fn ac_sweep(config: &AmsConfig) -> Result<()> {
    let (mut net, _, out) = rc_network(config, Diagnostics::new(), false);
    let corner = 1.0 / (2.0 * PI * R * C);
    println!("AC sweep (corner at {:.0} Hz)", corner);
    println!("{:>10}  {:>9}  {:>9}", "freq [Hz]", "gain [dB]", "phase [°]");
    for exponent in 1..=5 {
        for mantissa in [1.0, 3.0] {
            let freq = mantissa * 10f64.powi(exponent);
            net.ac(2.0 * PI * freq)?;
            let h = net.ac_value(out).unwrap_or_default();
            println!(
                "{:>10.0}  {:>9.2}  {:>9.1}",
                freq,
                20.0 * h.norm().log10(),
                h.arg().to_degrees()
            );
        }
    }
    Ok(())
}

// -----------------------------------------------------------------------------
// TDF modules
// -----------------------------------------------------------------------------

struct SineSource {
    out: OutPort<f64>,
}

impl RateNegotiable for SineSource {
    fn set_attributes(&mut self, ctx: &mut TdfContext<'_>) -> Result<()> {
        ctx.set_module_timestep(TIMESTEP)
    }
}

impl TdfModule for SineSource {
    fn processing(&mut self, ctx: &mut TdfContext<'_>) -> Result<()> {
        let t = ctx.time().as_secs_f64();
        ctx.write(self.out, 0, (2.0 * PI * SIGNAL_HZ * t).sin())
    }
}

/// Records the filtered signal and raises a flag while it is above `threshold`.
struct Comparator {
    inp: InPort<f64>,
    flag: DeOut<bool>,
    threshold: f64,
    trace: Vec<(SimTime, f64)>,
}

impl RateNegotiable for Comparator {}

impl TdfModule for Comparator {
    fn processing(&mut self, ctx: &mut TdfContext<'_>) -> Result<()> {
        let v = ctx.read(self.inp, 0)?;
        self.trace.push((ctx.time(), v));
        ctx.write_de(self.flag, 0, v > self.threshold)
    }
}

// -----------------------------------------------------------------------------
// Main simulation
// -----------------------------------------------------------------------------

fn main() -> Result<()> {
    mixsig::init_logging("warn");

    let config = AmsConfigBuilder::new()
        .name("rc_lowpass")
        .de_resolution(SimTime::from_us(1))
        .build()?;

    println!("==== RC low-pass example ====\n");
    ac_sweep(&config)?;

    let mut sim = AmsSimulator::new(config);
    let (net, source, out) = rc_network(sim.config(), sim.diagnostics().clone(), true);

    let above = DeSignal::new("above", false);
    let mut cluster = TdfCluster::new("filter", sim.config(), sim.diagnostics().clone());
    let vin = cluster.signal::<f64>("vin");
    let vout = cluster.signal::<f64>("vout");
    cluster.add_module("sine", |b| Box::new(SineSource { out: b.output("out", vin) }));
    cluster.add_module("rc", |b| {
        Box::new(
            ContinuousModule::new(net)
                .with_input(b.input("in", vin), source)
                .with_node_output(b.output("out", vout), out),
        )
    });
    let probe = cluster.add_module("comparator", |b| {
        Box::new(Comparator {
            inp: b.input("in", vout),
            flag: b.de_output("above", &above),
            threshold: 0.5,
            trace: Vec::new(),
        })
    });
    let id = sim.add_executor(Box::new(cluster));
    sim.run(SIM_TIME)?;

    println!("\nTransient at {} Hz", SIGNAL_HZ);
    println!("{:>10}  {:>9}", "time", "v(out)");
    if let Some(comparator) = sim
        .executor_as::<TdfCluster>(id)
        .and_then(|c| c.module::<Comparator>(probe))
    {
        for (t, v) in comparator.trace.iter().step_by(10) {
            println!("{:>10}  {:>9.4}", t.to_string(), v);
        }
        let peak = comparator
            .trace
            .iter()
            .skip(comparator.trace.len() / 2)
            .map(|(_, v)| v.abs())
            .fold(0.0, f64::max);
        println!("steady-state peak: {:.3} (expected {:.3})", peak, 1.0 / (1.0 + (2.0 * PI * SIGNAL_HZ * R * C).powi(2)).sqrt());
    }

    let edges: Vec<String> = above
        .history()
        .windows(2)
        .filter(|w| w[0].1 != w[1].1)
        .map(|w| format!("{}->{} at {}", w[0].1 as u8, w[1].1 as u8, w[1].0))
        .collect();
    println!("\ncomparator edges: {}", edges.join(", "));

    let stats = sim.collect_stats();
    println!("\n{}", stats.summary());
    Ok(())
}
