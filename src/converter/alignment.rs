//! Mapping of event times onto a sample grid.
//!
//! A TDF to DE converter produces samples at TDF sample times, but the DE
//! side only sees times on its own resolution grid. The alignment rule
//! decides where a sample time that is off-grid lands.
//!
//! | Rule | Result |
//! |------|--------|
//! | CeilToSample | `ceil(t / p) * p` |
//! | FloorToSample | `floor(t / p) * p` |
//! | StrictSampleBoundary | `t` if `t % p == 0`, otherwise rejected |

use serde::{Deserialize, Serialize};

use crate::types::SimTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TimeAlignment {
    /// Never makes a value visible before it was produced.
    #[default]
    CeilToSample,
    FloorToSample,
    StrictSampleBoundary,
}

impl TimeAlignment {
    /// Aligns `time` to multiples of `period`. A zero period leaves the time unchanged.
    ///
    /// ```
    /// use mixsig::converter::TimeAlignment;
    /// use mixsig::types::SimTime;
    ///
    /// let p = SimTime::from_ns(10);
    /// assert_eq!(TimeAlignment::CeilToSample.align(SimTime::from_ns(103), p), Some(SimTime::from_ns(110)));
    /// assert_eq!(TimeAlignment::FloorToSample.align(SimTime::from_ns(103), p), Some(SimTime::from_ns(100)));
    /// assert_eq!(TimeAlignment::StrictSampleBoundary.align(SimTime::from_ns(103), p), None);
    /// ```
    pub fn align(&self, time: SimTime, period: SimTime) -> Option<SimTime> {
        if period.is_zero() {
            return Some(time);
        }
        match self {
            TimeAlignment::CeilToSample => Some(ceil_to(time, period)),
            TimeAlignment::FloorToSample => Some(floor_to(time, period)),
            TimeAlignment::StrictSampleBoundary => {
                if is_on_boundary(time, period) {
                    Some(time)
                } else {
                    None
                }
            }
        }
    }
}

pub fn ceil_to(time: SimTime, period: SimTime) -> SimTime {
    if period.is_zero() {
        return time;
    }
    let rem = time % period;
    if rem.is_zero() {
        time
    } else {
        time.saturating_add(period - rem)
    }
}

pub fn floor_to(time: SimTime, period: SimTime) -> SimTime {
    if period.is_zero() {
        return time;
    }
    time - time % period
}

pub fn is_on_boundary(time: SimTime, period: SimTime) -> bool {
    period.is_zero() || (time % period).is_zero()
}

/// Index of the sample of a grid starting at `origin` with spacing
/// `period` that is current at `time`, or `None` before `origin`.
pub fn sample_index(time: SimTime, origin: SimTime, period: SimTime) -> Option<u64> {
    let offset = time.checked_sub(origin)?;
    if period.is_zero() {
        return Some(0);
    }
    Some(offset.ticks() / period.ticks())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns(v: u64) -> SimTime {
        SimTime::from_ns(v)
    }

    #[test]
    fn test_ceil_and_floor() {
        assert_eq!(ceil_to(ns(0), ns(10)), ns(0));
        assert_eq!(ceil_to(ns(1), ns(10)), ns(10));
        assert_eq!(ceil_to(ns(20), ns(10)), ns(20));
        assert_eq!(floor_to(ns(29), ns(10)), ns(20));
        assert_eq!(ceil_to(ns(7), SimTime::ZERO), ns(7));
    }

    #[test]
    fn test_strict() {
        let strict = TimeAlignment::StrictSampleBoundary;
        assert_eq!(strict.align(ns(30), ns(10)), Some(ns(30)));
        assert_eq!(strict.align(ns(31), ns(10)), None);
    }

    #[test]
    fn test_sample_index() {
        assert_eq!(sample_index(ns(25), ns(5), ns(10)), Some(2));
        assert_eq!(sample_index(ns(4), ns(5), ns(10)), None);
        assert_eq!(sample_index(ns(5), ns(5), ns(10)), Some(0));
    }
}
