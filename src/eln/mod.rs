//! Electrical linear network primitives.
//!
//! Conservative primitives connect to electrical nodes of a
//! [`Network`](crate::network::Network) and stamp Kirchhoff current law rows.
//! Node rows hold the sum of currents leaving the node; sources put their
//! injected currents on the right-hand side.
//!
//! | Primitive | Extra unknowns |
//! |-----------|----------------|
//! | [`Resistor`], [`Capacitor`], [`Vccs`], [`Gyrator`], [`Isource`] | none |
//! | [`Inductor`], [`Vsource`], [`Vcvs`], [`Nullor`], [`IdealTransformer`] | one branch current |

pub mod controlled;
pub mod passive;
pub mod sources;
pub mod tdf;

pub use controlled::{Gyrator, IdealTransformer, Nullor, Vccs, Vcvs};
pub use passive::{Capacitor, Inductor, Resistor};
pub use sources::{Isource, Vsource, Waveform};
pub use tdf::{TdfIsource, TdfVsink, TdfVsource};
