//! Lockable, string-convertible parameters.
//!
//! Primitive coefficients (resistance, gain, delay) are held in
//! [`Parameter`] so they can be changed between steps, frozen after
//! elaboration and set from text.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamError {
    #[error("parameter `{name}` is locked")]
    Locked { name: String },

    #[error("parameter `{name}`: cannot convert `{input}`")]
    Conversion { name: String, input: String },
}

/// A named value with a lock and a change flag.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameter<T> {
    name: String,
    value: T,
    locked: bool,
    changed: bool,
}

impl<T> Parameter<T>
where
    T: Clone + PartialEq + fmt::Display + FromStr,
{
    pub fn new(name: impl Into<String>, value: T) -> Self {
        Self {
            name: name.into(),
            value,
            locked: false,
            changed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// Sets a new value. Setting an equal value does not raise the change flag.
    pub fn set(&mut self, value: T) -> Result<(), ParamError> {
        if self.locked {
            return Err(ParamError::Locked {
                name: self.name.clone(),
            });
        }
        if self.value != value {
            self.value = value;
            self.changed = true;
        }
        Ok(())
    }

    /// Parses and sets a value from text.
    pub fn convert_from_string(&mut self, input: &str) -> Result<(), ParamError> {
        let parsed = input
            .trim()
            .parse::<T>()
            .map_err(|_| ParamError::Conversion {
                name: self.name.clone(),
                input: input.to_string(),
            })?;
        self.set(parsed)
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Returns whether the value changed since the last call and clears the flag.
    pub fn take_changed(&mut self) -> bool {
        std::mem::replace(&mut self.changed, false)
    }
}

impl<T: fmt::Display> fmt::Display for Parameter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_change_flag() {
        let mut r = Parameter::new("r1.value", 1000.0);
        assert!(!r.take_changed());

        r.set(1000.0).unwrap();
        assert!(!r.take_changed());

        r.set(2200.0).unwrap();
        assert!(r.take_changed());
        assert!(!r.take_changed());
        assert_eq!(*r.get(), 2200.0);
    }

    #[test]
    fn test_locked() {
        let mut k = Parameter::new("gain.k", 2.0);
        k.lock();
        assert_eq!(
            k.set(3.0),
            Err(ParamError::Locked {
                name: "gain.k".to_string()
            })
        );
        k.unlock();
        assert!(k.set(3.0).is_ok());
    }

    #[test]
    fn test_string_conversion() {
        let mut rate = Parameter::new("rate", 1usize);
        rate.convert_from_string(" 4 ").unwrap();
        assert_eq!(*rate.get(), 4);
        assert_eq!(rate.to_string(), "4");

        let err = rate.convert_from_string("four").unwrap_err();
        assert!(matches!(err, ParamError::Conversion { .. }));
        assert_eq!(*rate.get(), 4);
    }
}
