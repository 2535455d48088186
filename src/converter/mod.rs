//! Bridges between the discrete-event host and TDF clusters.

pub mod alignment;
pub mod de;
pub mod ports;

pub use alignment::TimeAlignment;
pub use de::DeSignal;
pub use ports::{Converter, ConverterDirection, DeToTdf, TdfToDe};
