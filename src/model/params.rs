//! Container-wide channel parameters.

use std::fmt;
use std::str::FromStr;

use crate::util::{Error, Result};

/// Speed of light in vacuum, m/s.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// How multipath delays are represented in a container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DelayRepresentation {
    /// Each echo keeps its exact real-valued delay.
    Continuous,
    /// Amplitudes sampled on a uniform delay grid.
    Discrete,
}

impl DelayRepresentation {
    /// Stored name of the representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Continuous => "continuous-delay",
            Self::Discrete => "discrete-delay",
        }
    }
}

impl fmt::Display for DelayRepresentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DelayRepresentation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "continuous-delay" => Ok(Self::Continuous),
            "discrete-delay" => Ok(Self::Discrete),
            other => Err(Error::schema(format!("unknown delay representation '{}'", other))),
        }
    }
}

/// Global parameters shared by every link of a container.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChannelParameters {
    /// Propagation speed, m/s.
    pub speed_of_light: f64,
    /// Snapshot (CIR) rate, Hz.
    pub snapshot_rate: f64,
    /// Carrier frequency of the transmitter, Hz.
    pub transmitter_frequency: f64,
}

impl ChannelParameters {
    /// Parameters with the vacuum speed of light.
    pub fn new(snapshot_rate: f64, transmitter_frequency: f64) -> Self {
        Self {
            speed_of_light: SPEED_OF_LIGHT,
            snapshot_rate,
            transmitter_frequency,
        }
    }

    /// Check that every parameter is finite and the rates are positive.
    pub fn validate(&self) -> Result<()> {
        if !(self.speed_of_light.is_finite() && self.speed_of_light > 0.0) {
            return Err(Error::validation(format!(
                "speed of light must be positive, got {}",
                self.speed_of_light
            )));
        }
        if !(self.snapshot_rate.is_finite() && self.snapshot_rate > 0.0) {
            return Err(Error::validation(format!(
                "snapshot rate must be positive, got {}",
                self.snapshot_rate
            )));
        }
        if !self.transmitter_frequency.is_finite() || self.transmitter_frequency < 0.0 {
            return Err(Error::validation(format!(
                "transmitter frequency must be non-negative, got {}",
                self.transmitter_frequency
            )));
        }
        Ok(())
    }

    /// Time between two snapshots, seconds.
    #[inline]
    pub fn snapshot_interval(&self) -> f64 {
        1.0 / self.snapshot_rate
    }

    /// Carrier wavelength, metres.
    pub fn wavelength(&self) -> f64 {
        self.speed_of_light / self.transmitter_frequency
    }
}

impl Default for ChannelParameters {
    fn default() -> Self {
        Self::new(1000.0, 1.0e9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_representation_names() {
        for repr in [DelayRepresentation::Continuous, DelayRepresentation::Discrete] {
            assert_eq!(repr.as_str().parse::<DelayRepresentation>().unwrap(), repr);
        }
        assert!(matches!(
            "sampled".parse::<DelayRepresentation>(),
            Err(Error::Schema(_))
        ));
    }

    #[test]
    fn test_validate() {
        assert!(ChannelParameters::default().validate().is_ok());
        assert!(ChannelParameters::new(0.0, 1e9).validate().is_err());
        assert!(ChannelParameters::new(f64::NAN, 1e9).validate().is_err());
        assert!(ChannelParameters::new(100.0, -1.0).validate().is_err());
    }

    #[test]
    fn test_derived_values() {
        let p = ChannelParameters::new(250.0, SPEED_OF_LIGHT);
        assert_eq!(p.snapshot_interval(), 0.004);
        assert!((p.wavelength() - 1.0).abs() < 1e-12);
    }
}
