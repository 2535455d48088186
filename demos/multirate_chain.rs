//! Multirate TDF example with discrete-event coupling.
//!
//! An acquisition cluster samples a noisy ramp, averages blocks of four
//! samples and smooths the averages with a first-order IIR filter whose
//! feedback path carries a one-sample delay. The smoothed value leaves the
//! cluster on a DE signal. A second cluster polls that signal at a slower
//! rate and raises an alarm. Halfway through, the sensor doubles its sample
//! rate at run time and the acquisition cluster is rescheduled.

use mixsig::config::AmsConfigBuilder;
use mixsig::converter::DeSignal;
use mixsig::tdf::{DeIn, DeOut, InPort, Logic, OutPort, RateNegotiable, TdfCluster, TdfContext, TdfModule};
use mixsig::{AmsSimulator, Result, SimTime};

const SLOW_STEP: SimTime = SimTime::from_us(1);
const FAST_STEP: SimTime = SimTime::from_ns(500);
const SPEED_UP_AT: SimTime = SimTime::from_us(100);
const MONITOR_STEP: SimTime = SimTime::from_us(10);
const SIM_TIME: SimTime = SimTime::from_us(200);

// -----------------------------------------------------------------------------
// Acquisition cluster
// -----------------------------------------------------------------------------

/// Ramp of 10 units per millisecond with a deterministic ripple.
struct Sensor {
    out: OutPort<f64>,
    fast: bool,
}

impl RateNegotiable for Sensor {
    fn set_attributes(&mut self, ctx: &mut TdfContext<'_>) -> Result<()> {
        ctx.set_module_timestep(SLOW_STEP)
    }

    fn change_attributes(&mut self, ctx: &mut TdfContext<'_>) -> Result<()> {
        if !self.fast && ctx.time() >= SPEED_UP_AT {
            self.fast = true;
            ctx.set_module_timestep(FAST_STEP)?;
        }
        Ok(())
    }
}

impl TdfModule for Sensor {
    fn processing(&mut self, ctx: &mut TdfContext<'_>) -> Result<()> {
        let t_us = ctx.time().as_secs_f64() * 1e6;
        let ripple = if ctx.activations() % 2 == 0 { 0.05 } else { -0.05 };
        ctx.write(self.out, 0, t_us * 0.01 + ripple)
    }
}

/// `y[n] = a * mean(x) + (1 - a) * y[n-1]`, four input samples per call.
struct Smoother {
    x: InPort<f64>,
    prev: InPort<f64>,
    y: OutPort<f64>,
    out: DeOut<f64>,
    alpha: f64,
}

impl RateNegotiable for Smoother {
    fn set_attributes(&mut self, ctx: &mut TdfContext<'_>) -> Result<()> {
        ctx.set_rate(self.x, 4)?;
        ctx.set_delay(self.y, 1)
    }
}

impl TdfModule for Smoother {
    fn initialize(&mut self, ctx: &mut TdfContext<'_>) -> Result<()> {
        ctx.initialize_value(self.y, 0, 0.0)
    }

    fn processing(&mut self, ctx: &mut TdfContext<'_>) -> Result<()> {
        let mut sum = 0.0;
        for k in 0..4 {
            sum += ctx.read(self.x, k)?;
        }
        let prev = ctx.read(self.prev, 0)?;
        let y = self.alpha * sum / 4.0 + (1.0 - self.alpha) * prev;
        ctx.write(self.y, 0, y)?;
        ctx.write_de(self.out, 0, y)
    }
}

// -----------------------------------------------------------------------------
// Monitor cluster
// -----------------------------------------------------------------------------

struct Monitor {
    inp: DeIn<f64>,
    alarm: DeOut<Logic>,
    threshold: f64,
}

impl RateNegotiable for Monitor {
    fn set_attributes(&mut self, ctx: &mut TdfContext<'_>) -> Result<()> {
        ctx.set_module_timestep(MONITOR_STEP)
    }
}

impl TdfModule for Monitor {
    fn processing(&mut self, ctx: &mut TdfContext<'_>) -> Result<()> {
        let level = ctx.read_de(self.inp, 0)?;
        ctx.write_de(self.alarm, 0, Logic::from_bool(level > self.threshold))
    }
}

// -----------------------------------------------------------------------------
// Main simulation
// -----------------------------------------------------------------------------

fn describe(cluster: &TdfCluster) -> String {
    let firings: Vec<&str> = cluster
        .schedule()
        .firings
        .iter()
        .filter_map(|&m| cluster.module_info(m).map(|info| info.name.as_str()))
        .collect();
    format!("period {} firings [{}]", cluster.period(), firings.join(" "))
}

fn main() -> Result<()> {
    mixsig::init_logging("info");

    let config = AmsConfigBuilder::new()
        .name("multirate_chain")
        .collect_stats(true)
        .build()?;
    let mut sim = AmsSimulator::new(config);

    let smoothed = DeSignal::new("smoothed", 0.0);
    let alarm = DeSignal::new("alarm", Logic::X);

    let mut acquisition = TdfCluster::new("acquisition", sim.config(), sim.diagnostics().clone());
    let raw = acquisition.signal::<f64>("raw");
    let feedback = acquisition.signal::<f64>("feedback");
    acquisition.add_module("sensor", |b| {
        Box::new(Sensor {
            out: b.output("out", raw),
            fast: false,
        })
    });
    acquisition.add_module("smoother", |b| {
        Box::new(Smoother {
            x: b.input("x", raw),
            prev: b.input("prev", feedback),
            y: b.output("y", feedback),
            out: b.de_output("out", &smoothed),
            alpha: 0.25,
        })
    });
    acquisition.elaborate_cluster()?;
    println!("acquisition: {}", describe(&acquisition));

    let mut monitor = TdfCluster::new("monitor", sim.config(), sim.diagnostics().clone());
    monitor.add_module("monitor", |b| {
        Box::new(Monitor {
            inp: b.de_input("in", &smoothed),
            alarm: b.de_output("alarm", &alarm),
            threshold: 1.0,
        })
    });

    let acq = sim.add_executor(Box::new(acquisition));
    sim.add_executor(Box::new(monitor));
    sim.run(SIM_TIME)?;

    if let Some(acquisition) = sim.executor_as::<TdfCluster>(acq) {
        println!("acquisition after speed-up: {}", describe(acquisition));
        println!("reschedules: {}", acquisition.stats().reschedules);
    }

    println!("\nsmoothed level every 20 us:");
    for t in (0..=200).step_by(20) {
        let at = SimTime::from_us(t);
        println!("  {:>6}  {:>7.4}  alarm {}", at.to_string(), smoothed.read_at(at), alarm.read_at(at));
    }

    let changes: Vec<String> = alarm
        .history()
        .windows(2)
        .filter(|w| w[0].1 != w[1].1)
        .map(|w| format!("{} at {}", w[1].1, w[1].0))
        .collect();
    println!("alarm changes: {}", changes.join(", "));

    let diagnostics = sim.diagnostics().entries();
    if !diagnostics.is_empty() {
        println!("\ndiagnostics:");
        for d in &diagnostics {
            println!("  [{}] {}: {}", d.severity, d.source, d.message);
        }
    }

    println!("\n{}", serde_json::to_string_pretty(&sim.export_stats()).unwrap_or_default());
    println!("{}", sim.collect_stats().summary());
    Ok(())
}
