//! Stream configuration.

use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Where a tail starts reading records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum StartPosition {
    /// First record after the header (replays what is already written).
    Beginning,
    /// Current end of file (live data only).
    #[default]
    End,
}

/// Configuration for the producer side of a live stream.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StreamConfig {
    /// Buffer occupancy, in records, at which a pile-up is reported.
    pub buffer_capacity: usize,
    /// Maximum bytes read from the file per poll.
    pub read_chunk_bytes: usize,
    /// Sleep between polls that found no new data, in milliseconds.
    pub poll_interval_ms: u64,
    /// Stop after this long without new data. `None` follows the file forever.
    pub idle_timeout_ms: Option<u64>,
    /// Where the tail starts.
    pub start: StartPosition,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 1_000_000,
            read_chunk_bytes: 1 << 20,
            poll_interval_ms: 10,
            idle_timeout_ms: None,
            start: StartPosition::End,
        }
    }
}

impl StreamConfig {
    /// Set the pile-up threshold.
    #[must_use]
    pub fn with_buffer_capacity(mut self, records: usize) -> Self {
        self.buffer_capacity = records;
        self
    }

    /// Set the per-poll read size.
    #[must_use]
    pub fn with_read_chunk_bytes(mut self, bytes: usize) -> Self {
        self.read_chunk_bytes = bytes;
        self
    }

    /// Set the idle poll interval.
    #[must_use]
    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Stop after `ms` without new data.
    #[must_use]
    pub fn with_idle_timeout_ms(mut self, ms: u64) -> Self {
        self.idle_timeout_ms = Some(ms);
        self
    }

    /// Set where the tail starts.
    #[must_use]
    pub fn with_start(mut self, start: StartPosition) -> Self {
        self.start = start;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the buffer capacity or read chunk is zero.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(Error::InvalidConfig(
                "buffer_capacity must be at least 1".to_string(),
            ));
        }
        if self.read_chunk_bytes == 0 {
            return Err(Error::InvalidConfig(
                "read_chunk_bytes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = StreamConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.start, StartPosition::End);
        assert_eq!(config.idle_timeout_ms, None);
    }

    #[test]
    fn test_rejects_zero_sizes() {
        assert!(StreamConfig::default()
            .with_buffer_capacity(0)
            .validate()
            .is_err());
        assert!(StreamConfig::default()
            .with_read_chunk_bytes(0)
            .validate()
            .is_err());
    }
}
