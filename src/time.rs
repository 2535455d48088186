//! Simulation time representation.
//!
//! All analog and dataflow computation shares one timeline measured in
//! integer ticks of one femtosecond. Integer ticks keep timestep propagation
//! exact: a module timestep divided by a port rate either divides evenly or
//! is rejected, never rounded.
//!
//! [`SignedTime`] extends [`SimTime`] with a sign flag so that delay
//! arithmetic (for example `t - delay` before the first sample) can go below
//! zero without wrapping.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Rem, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// Number of ticks in one second (one tick is one femtosecond).
pub const TICKS_PER_SECOND: u64 = 1_000_000_000_000_000;

/// A non-negative point in simulation time or a non-negative duration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimTime(u64);

impl SimTime {
    /// Time zero.
    pub const ZERO: SimTime = SimTime(0);

    /// The largest representable time. Used as "never".
    pub const MAX: SimTime = SimTime(u64::MAX);

    /// Creates a time from raw femtosecond ticks.
    pub const fn from_ticks(ticks: u64) -> Self {
        Self(ticks)
    }

    pub const fn from_fs(fs: u64) -> Self {
        Self(fs)
    }

    pub const fn from_ps(ps: u64) -> Self {
        Self(ps * 1_000)
    }

    pub const fn from_ns(ns: u64) -> Self {
        Self(ns * 1_000_000)
    }

    pub const fn from_us(us: u64) -> Self {
        Self(us * 1_000_000_000)
    }

    pub const fn from_ms(ms: u64) -> Self {
        Self(ms * 1_000_000_000_000)
    }

    /// Converts seconds to the nearest tick. Negative or NaN input maps to zero.
    pub fn from_secs_f64(secs: f64) -> Self {
        if !(secs > 0.0) {
            return Self::ZERO;
        }
        let ticks = (secs * TICKS_PER_SECOND as f64).round();
        if ticks >= u64::MAX as f64 {
            Self::MAX
        } else {
            Self(ticks as u64)
        }
    }

    /// Returns the raw tick count.
    pub const fn ticks(self) -> u64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / TICKS_PER_SECOND as f64
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// True for [`SimTime::MAX`].
    pub const fn is_never(self) -> bool {
        self.0 == u64::MAX
    }

    pub fn checked_add(self, rhs: SimTime) -> Option<SimTime> {
        self.0.checked_add(rhs.0).map(SimTime)
    }

    pub fn checked_sub(self, rhs: SimTime) -> Option<SimTime> {
        self.0.checked_sub(rhs.0).map(SimTime)
    }

    pub fn saturating_add(self, rhs: SimTime) -> SimTime {
        SimTime(self.0.saturating_add(rhs.0))
    }

    pub fn saturating_sub(self, rhs: SimTime) -> SimTime {
        SimTime(self.0.saturating_sub(rhs.0))
    }

    /// Divides by an integer, returning `None` when the division is not exact.
    pub fn checked_div_exact(self, divisor: u64) -> Option<SimTime> {
        if divisor == 0 || self.0 % divisor != 0 {
            None
        } else {
            Some(SimTime(self.0 / divisor))
        }
    }

    pub fn checked_mul(self, factor: u64) -> Option<SimTime> {
        self.0.checked_mul(factor).map(SimTime)
    }
}

impl Add for SimTime {
    type Output = SimTime;

    fn add(self, rhs: SimTime) -> SimTime {
        SimTime(self.0 + rhs.0)
    }
}

impl AddAssign for SimTime {
    fn add_assign(&mut self, rhs: SimTime) {
        self.0 += rhs.0;
    }
}

impl Sub for SimTime {
    type Output = SimTime;

    fn sub(self, rhs: SimTime) -> SimTime {
        SimTime(self.0 - rhs.0)
    }
}

impl SubAssign for SimTime {
    fn sub_assign(&mut self, rhs: SimTime) {
        self.0 -= rhs.0;
    }
}

impl Mul<u64> for SimTime {
    type Output = SimTime;

    fn mul(self, rhs: u64) -> SimTime {
        SimTime(self.0 * rhs)
    }
}

impl Div<u64> for SimTime {
    type Output = SimTime;

    fn div(self, rhs: u64) -> SimTime {
        SimTime(self.0 / rhs)
    }
}

impl Rem for SimTime {
    type Output = SimTime;

    fn rem(self, rhs: SimTime) -> SimTime {
        SimTime(self.0 % rhs.0)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_never() {
            return write!(f, "never");
        }
        const UNITS: [(u64, &str); 6] = [
            (1_000_000_000_000_000, "s"),
            (1_000_000_000_000, "ms"),
            (1_000_000_000, "us"),
            (1_000_000, "ns"),
            (1_000, "ps"),
            (1, "fs"),
        ];
        if self.0 == 0 {
            return write!(f, "0 s");
        }
        for (scale, unit) in UNITS {
            if self.0 % scale == 0 {
                return write!(f, "{} {}", self.0 / scale, unit);
            }
        }
        write!(f, "{} fs", self.0)
    }
}

/// A signed duration or time offset.
///
/// Stored as a magnitude plus a negative flag. Zero is always non-negative.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "SignedTimeRepr")]
pub struct SignedTime {
    magnitude: SimTime,
    negative: bool,
}

#[derive(Deserialize)]
struct SignedTimeRepr {
    magnitude: SimTime,
    negative: bool,
}

impl From<SignedTimeRepr> for SignedTime {
    fn from(repr: SignedTimeRepr) -> Self {
        Self::new(repr.magnitude, repr.negative)
    }
}

impl SignedTime {
    pub const ZERO: SignedTime = SignedTime {
        magnitude: SimTime::ZERO,
        negative: false,
    };

    pub fn new(magnitude: SimTime, negative: bool) -> Self {
        Self {
            magnitude,
            negative: negative && !magnitude.is_zero(),
        }
    }

    pub fn positive(magnitude: SimTime) -> Self {
        Self::new(magnitude, false)
    }

    pub fn negative(magnitude: SimTime) -> Self {
        Self::new(magnitude, true)
    }

    pub fn magnitude(self) -> SimTime {
        self.magnitude
    }

    pub fn is_negative(self) -> bool {
        self.negative
    }

    /// Returns the time as a [`SimTime`] when it is non-negative.
    pub fn to_sim_time(self) -> Option<SimTime> {
        if self.negative {
            None
        } else {
            Some(self.magnitude)
        }
    }

    /// Clamps negative values to zero.
    pub fn clamp_to_sim_time(self) -> SimTime {
        self.to_sim_time().unwrap_or(SimTime::ZERO)
    }

    pub fn as_secs_f64(self) -> f64 {
        let secs = self.magnitude.as_secs_f64();
        if self.negative {
            -secs
        } else {
            secs
        }
    }
}

impl From<SimTime> for SignedTime {
    fn from(t: SimTime) -> Self {
        Self::positive(t)
    }
}

impl Neg for SignedTime {
    type Output = SignedTime;

    fn neg(self) -> SignedTime {
        SignedTime::new(self.magnitude, !self.negative)
    }
}

impl Add for SignedTime {
    type Output = SignedTime;

    fn add(self, rhs: SignedTime) -> SignedTime {
        if self.negative == rhs.negative {
            return SignedTime::new(self.magnitude + rhs.magnitude, self.negative);
        }
        if self.magnitude >= rhs.magnitude {
            SignedTime::new(self.magnitude - rhs.magnitude, self.negative)
        } else {
            SignedTime::new(rhs.magnitude - self.magnitude, rhs.negative)
        }
    }
}

impl Sub for SignedTime {
    type Output = SignedTime;

    fn sub(self, rhs: SignedTime) -> SignedTime {
        self + (-rhs)
    }
}

impl Add<SimTime> for SignedTime {
    type Output = SignedTime;

    fn add(self, rhs: SimTime) -> SignedTime {
        self + SignedTime::from(rhs)
    }
}

impl Sub<SimTime> for SignedTime {
    type Output = SignedTime;

    fn sub(self, rhs: SimTime) -> SignedTime {
        self - SignedTime::from(rhs)
    }
}

impl Ord for SignedTime {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.negative, other.negative) {
            (false, false) => self.magnitude.cmp(&other.magnitude),
            (true, true) => other.magnitude.cmp(&self.magnitude),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
        }
    }
}

impl PartialOrd for SignedTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SignedTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-{}", self.magnitude)
        } else {
            write!(f, "{}", self.magnitude)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_constructors() {
        assert_eq!(SimTime::from_ns(1).ticks(), 1_000_000);
        assert_eq!(SimTime::from_us(2), SimTime::from_ns(2000));
        assert_eq!(SimTime::from_ms(1), SimTime::from_us(1000));
        assert_eq!(SimTime::from_secs_f64(1e-9), SimTime::from_ns(1));
        assert_eq!(SimTime::from_secs_f64(-1.0), SimTime::ZERO);
    }

    #[test]
    fn test_exact_division() {
        let t = SimTime::from_us(6);
        assert_eq!(t.checked_div_exact(3), Some(SimTime::from_us(2)));
        assert_eq!(SimTime::from_ticks(7).checked_div_exact(2), None);
        assert_eq!(t.checked_div_exact(0), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(SimTime::from_ns(10).to_string(), "10 ns");
        assert_eq!(SimTime::from_us(3).to_string(), "3 us");
        assert_eq!(SimTime::ZERO.to_string(), "0 s");
        assert_eq!(SimTime::MAX.to_string(), "never");
    }

    #[test]
    fn test_signed_arithmetic() {
        let a = SignedTime::from(SimTime::from_ns(5));
        let b = SimTime::from_ns(8);
        let diff = a - b;
        assert!(diff.is_negative());
        assert_eq!(diff.magnitude(), SimTime::from_ns(3));
        assert_eq!((diff + SimTime::from_ns(3)), SignedTime::ZERO);
        assert!(!(diff + SimTime::from_ns(3)).is_negative());
        assert_eq!((diff + b).to_sim_time(), Some(SimTime::from_ns(5)));
    }

    #[test]
    fn test_signed_ordering() {
        let neg = SignedTime::negative(SimTime::from_ns(2));
        let more_neg = SignedTime::negative(SimTime::from_ns(4));
        let pos = SignedTime::positive(SimTime::from_ns(1));
        assert!(more_neg < neg);
        assert!(neg < SignedTime::ZERO);
        assert!(SignedTime::ZERO < pos);
        assert_eq!(SignedTime::negative(SimTime::ZERO), SignedTime::ZERO);
    }

    #[test]
    fn test_signed_deserialize_normalizes_zero() {
        let zero: SignedTime = serde_json::from_str(r#"{"magnitude":0,"negative":true}"#).unwrap();
        assert_eq!(zero, SignedTime::ZERO);

        let back = SignedTime::negative(SimTime::from_ns(3));
        let json = serde_json::to_string(&back).unwrap();
        assert_eq!(serde_json::from_str::<SignedTime>(&json).unwrap(), back);
    }
}
