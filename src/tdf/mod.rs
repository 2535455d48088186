//! Timed data flow.
//!
//! A [`TdfCluster`] groups modules connected through typed [`Signal`]s.
//! Modules declare ports through a [`ModuleBuilder`], negotiate rates,
//! delays and timesteps in [`RateNegotiable`], and are fired according to a
//! static [`Schedule`] once per cluster period. Converter ports ([`DeIn`],
//! [`DeOut`]) connect a cluster to discrete-event signals.

pub mod cluster;
pub mod context;
pub mod embed;
pub mod graph;
pub mod module;
pub mod phase;
pub mod port;
pub(crate) mod propagate;
pub mod schedule;
pub mod signal;
pub mod value;

pub use cluster::{TdfCluster, TdfStats};
pub use context::TdfContext;
pub use embed::{ContinuousModule, OutputSource};
pub use graph::{ModuleInfo, TdfGraph};
pub use module::{ModuleBuilder, RateNegotiable, TdfModule};
pub use phase::Phase;
pub use port::{DeIn, DeOut, InPort, OutPort, PortHandle, PortInfo, PortKind, Signal};
pub use schedule::Schedule;
pub use value::{Logic, SampleValue};
