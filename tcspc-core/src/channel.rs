//! Detector channels and the series derived from them.

use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One of the two tracked detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Detector {
    /// Donor emission ("green").
    Donor,
    /// Acceptor emission ("red").
    Acceptor,
}

impl Detector {
    /// Storage index of this detector.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Detector::Donor => 0,
            Detector::Acceptor => 1,
        }
    }

    /// The trace series a photon from this detector lands in when unclassified.
    #[must_use]
    pub fn raw_series(self) -> TraceSeries {
        match self {
            Detector::Donor => TraceSeries::Green,
            Detector::Acceptor => TraceSeries::Red,
        }
    }
}

/// A trace series. `Transfer` is derived from acceptor photons by the FRET classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum TraceSeries {
    /// Raw donor counts.
    Green,
    /// Raw acceptor counts outside the acceptance window.
    Red,
    /// Acceptor counts inside the acceptance window.
    Transfer,
}

impl TraceSeries {
    /// Storage index of this series.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            TraceSeries::Green => 0,
            TraceSeries::Red => 1,
            TraceSeries::Transfer => 2,
        }
    }

    /// Parses a series name as used on the control surface.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "green" | "donor" => Some(TraceSeries::Green),
            "red" | "acceptor" => Some(TraceSeries::Red),
            "transfer" | "fret" => Some(TraceSeries::Transfer),
            _ => None,
        }
    }
}

/// Maps routing channel numbers to detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ChannelMap {
    /// Acceptor (red) channel number.
    pub acceptor: u8,
    /// Donor (green) channel number.
    pub donor: u8,
}

impl Default for ChannelMap {
    fn default() -> Self {
        Self {
            acceptor: 1,
            donor: 2,
        }
    }
}

impl ChannelMap {
    /// Returns the detector wired to `channel`, if any.
    #[inline]
    #[must_use]
    pub fn detector(&self, channel: u8) -> Option<Detector> {
        if channel == self.donor {
            Some(Detector::Donor)
        } else if channel == self.acceptor {
            Some(Detector::Acceptor)
        } else {
            None
        }
    }

    /// Checks the two channels are distinct and representable in a T3 record.
    ///
    /// # Errors
    /// Returns [`Error::InvalidChannelMap`] on a duplicate or out-of-range channel.
    pub fn validate(&self) -> Result<()> {
        if self.acceptor == self.donor {
            return Err(Error::InvalidChannelMap(format!(
                "acceptor and donor share channel {}",
                self.acceptor
            )));
        }
        // 0x3F is reserved for overflow markers
        for channel in [self.acceptor, self.donor] {
            if channel >= 0x3F {
                return Err(Error::InvalidChannelMap(format!(
                    "channel {channel} is outside 0..63"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_map() {
        let map = ChannelMap::default();
        assert_eq!(map.detector(1), Some(Detector::Acceptor));
        assert_eq!(map.detector(2), Some(Detector::Donor));
        assert_eq!(map.detector(3), None);
        assert_eq!(map.detector(0), None);
    }

    #[test]
    fn test_validate() {
        assert!(ChannelMap::default().validate().is_ok());
        assert!(ChannelMap {
            acceptor: 4,
            donor: 4
        }
        .validate()
        .is_err());
        assert!(ChannelMap {
            acceptor: 0x3F,
            donor: 2
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_series_names() {
        assert_eq!(TraceSeries::from_name("Green"), Some(TraceSeries::Green));
        assert_eq!(TraceSeries::from_name("fret"), Some(TraceSeries::Transfer));
        assert_eq!(TraceSeries::from_name("blue"), None);
        assert_eq!(Detector::Acceptor.raw_series(), TraceSeries::Red);
    }
}
