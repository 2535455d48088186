//! Sample and history buffers.
//!
//! - [`DelayBuffer`]: time-indexed history with linear interpolation
//! - [`SampleBuffer`]: integer-indexed storage behind TDF signals and converter ports
//! - [`DeclusterQueue`]: one-value-per-activation hand-over across time grids

pub mod decluster;
pub mod delay;
pub mod sample;

pub use decluster::DeclusterQueue;
pub use delay::{DelayBuffer, Interpolate, Lookup, LookupStatus, NextSample};
pub use sample::SampleBuffer;
