//! # mixsig
//!
//! An analog/mixed-signal simulation core built from three models of
//! computation:
//!
//! - **ELN**: electrical linear networks of primitives such as resistors,
//!   capacitors and controlled sources. Each primitive stamps its
//!   contribution into the linear system `A·dx/dt + B·x = q`.
//! - **LSF**: linear signal flow, the same equation machinery over
//!   directed real-valued signals.
//! - **TDF**: timed data flow. Modules exchange samples at fixed rates and
//!   are fired by a static schedule once per cluster period.
//!
//! Network nodes are partitioned into independently solvable clusters with
//! union-find. TDF clusters resolve rates and timesteps by propagation and
//! talk to the discrete-event world through converter ports.
//!
//! ## Features
//!
//! - `parallel` - Solve the equation clusters of a network on the rayon pool
//!
//! ## Quick Start
//!
//! ```rust
//! use mixsig::config::AmsConfig;
//! use mixsig::eln::{Resistor, Vsource};
//! use mixsig::network::{Network, NetworkExecutor};
//! use mixsig::{AmsSimulator, SimTime};
//!
//! let mut sim = AmsSimulator::new(AmsConfig::default());
//! let mut net = Network::new("divider", sim.config(), sim.diagnostics().clone());
//! let gnd = net.ground();
//! let top = net.add_node("top");
//! let mid = net.add_node("mid");
//! net.add_primitive(Box::new(Vsource::dc("v", top, gnd, 2.0)));
//! net.add_primitive(Box::new(Resistor::new("r1", top, mid, 1e3)));
//! net.add_primitive(Box::new(Resistor::new("r2", mid, gnd, 1e3)));
//!
//! let id = sim.add_executor(Box::new(NetworkExecutor::new(net, SimTime::from_ns(100))));
//! sim.run(SimTime::from_us(1)).unwrap();
//!
//! let net = sim.executor_as::<NetworkExecutor>(id).unwrap().network();
//! assert!((net.node_value(mid) - 1.0).abs() < 1e-12);
//! println!("{}", sim.export_stats());
//! ```
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use mixsig::config::AmsConfig;
//!
//! let config = AmsConfig::from_yaml_file("simulation.yaml")?;
//! mixsig::init_logging(&config.log_level);
//! let sim = mixsig::AmsSimulator::new(config);
//! ```

pub mod time;
pub mod types;
pub mod error;
pub mod report;
pub mod config;
pub mod param;
pub mod buffer;
pub mod eqn;
pub mod eln;
pub mod lsf;
pub mod network;
pub mod trace;
pub mod tdf;
pub mod converter;
pub mod event;
pub mod kernel;
pub mod executor;
pub mod simulator;
pub mod stats;

// Re-export commonly used types
pub use types::{ExecutorId, ModuleId, NodeId, PrimitiveId, SimTime};
pub use error::{AmsError, Result};
pub use report::{Diagnostic, Diagnostics, Severity};
pub use config::{AmsConfig, AmsConfigBuilder, ConfigError};
pub use eqn::{ContributesEquations, IntegrationMethod};
pub use network::{Network, NetworkExecutor};
pub use tdf::{
    ContinuousModule, DeIn, DeOut, InPort, OutPort, RateNegotiable, SampleValue, Signal, TdfCluster,
    TdfContext, TdfModule,
};
pub use converter::{DeSignal, TimeAlignment};
pub use event::{Event, EventPayload};
pub use kernel::{HostKernel, LocalKernel};
pub use executor::ClusterExecutor;
pub use simulator::AmsSimulator;
pub use stats::{SimulationStats, StatsCollector, Timer};

/// Initialize the tracing subscriber for logging.
///
/// `RUST_LOG` overrides `level` when set.
///
/// # Example
///
/// ```rust,ignore
/// mixsig::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
