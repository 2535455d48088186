//! Tests for ELN primitives solved through a network.
//!
//! These tests verify:
//! - DC operating points of controlled sources, nullor and transformer circuits
//! - Transient response of an RL circuit
//! - Small-signal AC response of an RC low-pass
//! - Run-time parameter changes and singular systems

use std::f64::consts::FRAC_PI_4;

use approx::assert_relative_eq;
use mixsig::config::AmsConfig;
use mixsig::eln::{
    Capacitor, Gyrator, IdealTransformer, Inductor, Isource, Nullor, Resistor, Vcvs, Vccs, Vsource,
    Waveform,
};
use mixsig::network::Network;
use mixsig::report::Diagnostics;
use mixsig::{AmsError, SimTime};

fn network(name: &str) -> Network {
    Network::new(name, &AmsConfig::default(), Diagnostics::new())
}

fn ns(v: u64) -> SimTime {
    SimTime::from_ns(v)
}

// ============================================================================
// DC Operating Points
// ============================================================================

#[test]
fn test_nullor_inverting_amplifier() {
    let mut net = network("inverting");
    let gnd = net.ground();
    let vin = net.add_node("in");
    let vn = net.add_node("n");
    let out = net.add_node("out");
    net.add_primitive(Box::new(Vsource::dc("vs", vin, gnd, 1.0)));
    net.add_primitive(Box::new(Resistor::new("r1", vin, vn, 1e3)));
    net.add_primitive(Box::new(Resistor::new("r2", vn, out, 10e3)));
    net.add_primitive(Box::new(Nullor::new("op", gnd, vn, out, gnd)));
    net.dc(SimTime::ZERO).unwrap();

    assert_relative_eq!(net.node_value(vn), 0.0, epsilon = 1e-12);
    assert_relative_eq!(net.node_value(out), -10.0, epsilon = 1e-9);
}

#[test]
fn test_parallel_resistors_add_conductance() {
    let mut net = network("parallel");
    let gnd = net.ground();
    let top = net.add_node("top");
    let vs = net.add_primitive(Box::new(Vsource::dc("vs", top, gnd, 2.0)));
    let r1 = net.add_primitive(Box::new(Resistor::new("r1", top, gnd, 1e3)));
    net.add_primitive(Box::new(Resistor::new("r2", top, gnd, 2e3)));
    net.dc(SimTime::ZERO).unwrap();

    let source = net.primitive::<Vsource>(vs).unwrap();
    assert_relative_eq!(source.current().abs(), 2.0 * (1.0 / 1e3 + 1.0 / 2e3), epsilon = 1e-12);
    assert_relative_eq!(net.primitive::<Resistor>(r1).unwrap().current(), 2e-3, epsilon = 1e-12);
}

#[test]
fn test_vcvs_drives_load() {
    let mut net = network("vcvs");
    let gnd = net.ground();
    let ctrl = net.add_node("ctrl");
    let out = net.add_node("out");
    net.add_primitive(Box::new(Vsource::dc("vs", ctrl, gnd, 0.5)));
    net.add_primitive(Box::new(Vcvs::new("e1", ctrl, gnd, out, gnd, 4.0)));
    net.add_primitive(Box::new(Resistor::new("load", out, gnd, 50.0)));
    net.dc(SimTime::ZERO).unwrap();

    assert_relative_eq!(net.node_value(out), 2.0, epsilon = 1e-12);
}

#[test]
fn test_vccs_into_resistor() {
    let mut net = network("vccs");
    let gnd = net.ground();
    let ctrl = net.add_node("ctrl");
    let out = net.add_node("out");
    net.add_primitive(Box::new(Vsource::dc("vs", ctrl, gnd, 2.0)));
    // 2 V * 1 mS = 2 mA pulled out of `out` through the source
    net.add_primitive(Box::new(Vccs::new("g1", ctrl, gnd, out, gnd, 1e-3)));
    net.add_primitive(Box::new(Resistor::new("r", out, gnd, 1e3)));
    net.dc(SimTime::ZERO).unwrap();

    assert_relative_eq!(net.node_value(out), -2.0, epsilon = 1e-12);
}

#[test]
fn test_current_source_and_gyrator() {
    let mut net = network("gyrator");
    let gnd = net.ground();
    let a = net.add_node("a");
    let b = net.add_node("b");
    net.add_primitive(Box::new(Isource::dc("i1", gnd, a, 1e-3)));
    net.add_primitive(Box::new(Gyrator::new("gy", a, gnd, b, gnd, 2e-3, 2e-3)));
    net.add_primitive(Box::new(Resistor::new("load", b, gnd, 1e3)));
    net.dc(SimTime::ZERO).unwrap();

    // input resistance 1 / (g1 * g2 * R) = 250 ohm
    assert_relative_eq!(net.node_value(a), 0.25, epsilon = 1e-12);
    assert_relative_eq!(net.node_value(b), 0.5, epsilon = 1e-12);
}

#[test]
fn test_ideal_transformer_steps_down() {
    let mut net = network("transformer");
    let gnd = net.ground();
    let p = net.add_node("primary");
    let s = net.add_node("secondary");
    net.add_primitive(Box::new(Vsource::dc("vs", p, gnd, 10.0)));
    let xfmr = net.add_primitive(Box::new(IdealTransformer::new("t1", p, gnd, s, gnd, 2.0)));
    net.add_primitive(Box::new(Resistor::new("load", s, gnd, 100.0)));
    net.dc(SimTime::ZERO).unwrap();

    assert_relative_eq!(net.node_value(s), 5.0, epsilon = 1e-12);
    // 5 V into 100 ohm is 0.25 W, drawn from 10 V
    let i1 = net.primitive::<IdealTransformer>(xfmr).unwrap().primary_current();
    assert_relative_eq!(i1.abs(), 0.025, epsilon = 1e-12);
}

#[test]
fn test_parameter_change_updates_solution() {
    let mut net = network("divider");
    let gnd = net.ground();
    let top = net.add_node("top");
    let mid = net.add_node("mid");
    net.add_primitive(Box::new(Vsource::dc("vs", top, gnd, 3.0)));
    net.add_primitive(Box::new(Resistor::new("r1", top, mid, 1e3)));
    let r2 = net.add_primitive(Box::new(Resistor::new("r2", mid, gnd, 1e3)));
    net.dc(SimTime::ZERO).unwrap();
    assert_relative_eq!(net.node_value(mid), 1.5, epsilon = 1e-12);

    net.with_primitive::<Resistor, _>(r2, |r| r.set_resistance(2e3))
        .unwrap()
        .unwrap();
    net.dc(SimTime::ZERO).unwrap();
    assert_relative_eq!(net.node_value(mid), 2.0, epsilon = 1e-12);

    let err = net.with_primitive::<Capacitor, _>(r2, |_| ()).unwrap_err();
    assert!(matches!(err, AmsError::TypeMismatch { .. }));
}

#[test]
fn test_two_sources_in_parallel_are_singular() {
    let mut net = network("short");
    let gnd = net.ground();
    let a = net.add_node("a");
    net.add_primitive(Box::new(Vsource::dc("v1", a, gnd, 1.0)));
    net.add_primitive(Box::new(Vsource::dc("v2", a, gnd, 2.0)));
    let err = net.dc(SimTime::ZERO).unwrap_err();
    assert!(matches!(err, AmsError::SingularSystem { .. }));
    assert!(net.diagnostics().has_errors());
    assert_eq!(net.stats().failures, 1);
}

#[test]
fn test_high_impedance_divider_is_solvable() {
    let mut net = network("megohm");
    let gnd = net.ground();
    let a = net.add_node("a");
    let b = net.add_node("b");
    net.add_primitive(Box::new(Vsource::dc("vs", a, gnd, 1.0)));
    net.add_primitive(Box::new(Resistor::new("r1", a, b, 10e12)));
    net.add_primitive(Box::new(Resistor::new("r2", b, gnd, 10e12)));
    net.dc(SimTime::ZERO).unwrap();
    assert_relative_eq!(net.node_value(b), 0.5, epsilon = 1e-9);

    net.ac(1e3).unwrap();
    assert_relative_eq!(net.ac_value(b).unwrap().re, 0.0, epsilon = 1e-9);
}

#[test]
fn test_floating_resistor_pair_is_singular() {
    let mut net = network("floating");
    let a = net.add_node("a");
    let b = net.add_node("b");
    net.add_primitive(Box::new(Resistor::new("r", a, b, 1e3)));
    let err = net.dc(SimTime::ZERO).unwrap_err();
    assert!(matches!(err, AmsError::SingularSystem { .. }));
}

// ============================================================================
// Transient
// ============================================================================

#[test]
fn test_rl_current_rises_with_time_constant() {
    let mut net = network("rl");
    let gnd = net.ground();
    let top = net.add_node("top");
    let mid = net.add_node("mid");
    let step = Waveform::Step {
        before: 0.0,
        after: 1.0,
        at: SimTime::from_us(1),
    };
    net.add_primitive(Box::new(Vsource::new("vs", top, gnd, step)));
    net.add_primitive(Box::new(Resistor::new("r", top, mid, 1e3)));
    let l = net.add_primitive(Box::new(Inductor::new("l", mid, gnd, 1e-3)));

    net.dc(SimTime::ZERO).unwrap();
    assert_eq!(net.primitive::<Inductor>(l).unwrap().current(), 0.0);

    // tau = L / R = 1 us
    let h = ns(10);
    let mut at_one_tau = 0.0;
    for k in 1..=1100u64 {
        net.step(ns(10 * k), h).unwrap();
        if k == 200 {
            at_one_tau = net.primitive::<Inductor>(l).unwrap().current();
        }
    }
    let i_end = net.primitive::<Inductor>(l).unwrap().current();

    assert_relative_eq!(at_one_tau, 1e-3 * (1.0 - (-1.0f64).exp()), max_relative = 0.01);
    assert_relative_eq!(i_end, 1e-3, max_relative = 1e-3);
    assert_relative_eq!(net.node_value(mid), 0.0, epsilon = 1e-3);
    assert_eq!(net.stats().steps, 1100);
}

// ============================================================================
// AC
// ============================================================================

#[test]
fn test_rc_lowpass_corner() {
    let mut net = network("lowpass");
    let gnd = net.ground();
    let vin = net.add_node("in");
    let out = net.add_node("out");
    net.add_primitive(Box::new(Vsource::dc("vs", vin, gnd, 0.0).with_ac(1.0, 0.0)));
    net.add_primitive(Box::new(Resistor::new("r", vin, out, 1e3)));
    net.add_primitive(Box::new(Capacitor::new("c", out, gnd, 1e-6)));

    // corner at 1 / RC = 1000 rad/s
    net.ac(1000.0).unwrap();
    let v = net.ac_value(out).unwrap();
    assert_relative_eq!(v.norm(), std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-9);
    assert_relative_eq!(v.arg(), -FRAC_PI_4, epsilon = 1e-9);

    net.ac(1e6).unwrap();
    assert!(net.ac_value(out).unwrap().norm() < 2e-3);
    assert_relative_eq!(net.ac_value(vin).unwrap().re, 1.0, epsilon = 1e-12);
}
