//! T3 record types and bit field decoding.

use crate::{Error, Result};

/// Size of one T3 record in bytes.
pub const RECORD_SIZE: usize = 4;

/// PTU record types sharing the generic T3 layout
/// (1-bit special, 6-bit channel, 15-bit dtime, 10-bit nsync).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RecordFormat {
    /// HydraHarp T3, version 1 (single-overflow records).
    HydraHarpT3 = 0x0001_0304,
    /// HydraHarp T3, version 2.
    HydraHarp2T3 = 0x0101_0304,
    /// TimeHarp 260 N T3.
    TimeHarp260NT3 = 0x0001_0305,
    /// TimeHarp 260 P T3.
    TimeHarp260PT3 = 0x0001_0306,
    /// MultiHarp T3.
    MultiHarpT3 = 0x0001_0307,
}

impl RecordFormat {
    /// Creates a `RecordFormat` from the `TTResultFormat_TTTRRecType` header value.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedRecordType`] for PicoHarp T3, any T2 format,
    /// or an unknown code.
    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            0x0001_0304 => Ok(RecordFormat::HydraHarpT3),
            0x0101_0304 => Ok(RecordFormat::HydraHarp2T3),
            0x0001_0305 => Ok(RecordFormat::TimeHarp260NT3),
            0x0001_0306 => Ok(RecordFormat::TimeHarp260PT3),
            0x0001_0307 => Ok(RecordFormat::MultiHarpT3),
            _ => Err(Error::UnsupportedRecordType(code)),
        }
    }

    /// Raw record type code.
    #[must_use]
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Instrument name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            RecordFormat::HydraHarpT3 => "HydraHarp T3",
            RecordFormat::HydraHarp2T3 => "HydraHarp2 T3",
            RecordFormat::TimeHarp260NT3 => "TimeHarp260N T3",
            RecordFormat::TimeHarp260PT3 => "TimeHarp260P T3",
            RecordFormat::MultiHarpT3 => "MultiHarp T3",
        }
    }
}

/// A decoded T3 record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum T3Event {
    /// Macro-time counter wrapped `units` times.
    Overflow {
        /// Number of elapsed wraps (never zero).
        units: u32,
    },
    /// Photon detected on a routing channel.
    Photon {
        /// Routing channel (0..=62).
        channel: u8,
        /// Arrival time after the last sync, in resolution ticks.
        micro_time: u16,
        /// Sync count within the current wrap.
        nsync: u16,
    },
    /// External marker input (special record that is not an overflow).
    Marker {
        /// Marker bit pattern.
        markers: u8,
    },
}

/// Raw 32-bit T3 record with bit field accessors.
///
/// Layout, MSB first: `special:1 | channel:6 | dtime:15 | nsync:10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct T3Record(pub u32);

impl T3Record {
    /// Channel value reserved for overflow markers.
    pub const OVERFLOW_CHANNEL: u8 = 0x3F;

    /// Creates a record from its little-endian byte representation.
    #[inline]
    #[must_use]
    pub fn from_le_bytes(bytes: [u8; RECORD_SIZE]) -> Self {
        Self(u32::from_le_bytes(bytes))
    }

    /// Special flag (bit 31).
    #[inline]
    #[must_use]
    pub fn special(self) -> bool {
        self.0 >> 31 == 1
    }

    /// Channel field (bits 25-30).
    #[inline]
    #[must_use]
    pub fn channel(self) -> u8 {
        ((self.0 >> 25) & 0x3F) as u8
    }

    /// Micro-time field (bits 10-24).
    #[inline]
    #[must_use]
    pub fn dtime(self) -> u16 {
        ((self.0 >> 10) & 0x7FFF) as u16
    }

    /// Macro-time low field (bits 0-9).
    #[inline]
    #[must_use]
    pub fn nsync(self) -> u16 {
        (self.0 & 0x3FF) as u16
    }

    /// Returns true if this is an overflow marker.
    #[inline]
    #[must_use]
    pub fn is_overflow(self) -> bool {
        self.special() && self.channel() == Self::OVERFLOW_CHANNEL
    }

    /// Returns true if this is a regular photon record.
    #[inline]
    #[must_use]
    pub fn is_photon(self) -> bool {
        !self.special()
    }

    /// Classifies the record.
    ///
    /// An overflow with `nsync == 0` is the legacy single-overflow encoding
    /// and counts as one wrap.
    #[inline]
    #[must_use]
    pub fn decode(self) -> T3Event {
        if !self.special() {
            return T3Event::Photon {
                channel: self.channel(),
                micro_time: self.dtime(),
                nsync: self.nsync(),
            };
        }
        if self.channel() == Self::OVERFLOW_CHANNEL {
            let units = match self.nsync() {
                0 => 1,
                n => u32::from(n),
            };
            T3Event::Overflow { units }
        } else {
            T3Event::Marker {
                markers: self.channel(),
            }
        }
    }

    /// Builds a photon record.
    #[must_use]
    pub fn photon(channel: u8, micro_time: u16, nsync: u16) -> Self {
        Self(
            (u32::from(channel & 0x3F) << 25)
                | (u32::from(micro_time & 0x7FFF) << 10)
                | u32::from(nsync & 0x3FF),
        )
    }

    /// Builds an overflow record carrying `units` wraps (0 is the legacy single overflow).
    #[must_use]
    pub fn overflow(units: u16) -> Self {
        Self((1 << 31) | (u32::from(Self::OVERFLOW_CHANNEL) << 25) | u32::from(units & 0x3FF))
    }
}

impl From<u32> for T3Record {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_format_from_code() {
        assert_eq!(
            RecordFormat::from_code(0x0001_0307).unwrap(),
            RecordFormat::MultiHarpT3
        );
        assert_eq!(RecordFormat::HydraHarp2T3.code(), 0x0101_0304);
        // PicoHarp T3 uses a 4/12/16 layout
        assert!(RecordFormat::from_code(0x0001_0303).is_err());
        // T2 formats carry no micro-time
        assert!(RecordFormat::from_code(0x0001_0204).is_err());
    }

    #[test]
    fn test_bit_fields() {
        // special=0, channel=2, dtime=0x1234, nsync=0x155
        let raw = (2u32 << 25) | (0x1234 << 10) | 0x155;
        let record = T3Record(raw);
        assert!(!record.special());
        assert_eq!(record.channel(), 2);
        assert_eq!(record.dtime(), 0x1234);
        assert_eq!(record.nsync(), 0x155);
        assert!(record.is_photon());
        assert!(!record.is_overflow());
    }

    #[test]
    fn test_legacy_overflow_counts_one() {
        let record = T3Record(0xFE00_0000);
        assert!(record.is_overflow());
        assert_eq!(record.decode(), T3Event::Overflow { units: 1 });
    }

    #[test]
    fn test_overflow_counts_nsync() {
        for n in [1u16, 2, 17, 1023] {
            assert_eq!(
                T3Record::overflow(n).decode(),
                T3Event::Overflow { units: u32::from(n) }
            );
        }
    }

    #[test]
    fn test_overflow_ignores_dtime_bits() {
        // Overflow records may carry garbage in dtime
        let raw = T3Record::overflow(5).0 | (0x7FFF << 10);
        assert_eq!(T3Record(raw).decode(), T3Event::Overflow { units: 5 });
    }

    #[test]
    fn test_marker_is_neither_photon_nor_overflow() {
        let raw = (1u32 << 31) | (4 << 25) | 12;
        let record = T3Record(raw);
        assert!(!record.is_photon());
        assert!(!record.is_overflow());
        assert_eq!(record.decode(), T3Event::Marker { markers: 4 });
    }

    #[test]
    fn test_photon_builder() {
        let record = T3Record::photon(1, 3750, 99);
        assert_eq!(
            record.decode(),
            T3Event::Photon {
                channel: 1,
                micro_time: 3750,
                nsync: 99
            }
        );
        assert_eq!(T3Record::from_le_bytes(record.0.to_le_bytes()), record);
    }
}
