//! Bounded FIFO between newly appended file bytes and the decoder.
//!
//! The buffer never evicts. Its capacity is a high-water mark: reaching it
//! raises a pile-up alert once, and dropping back below it clears the alert
//! once. Producers are expected to slow down or accept the added latency.

use std::collections::VecDeque;
use tcspc_ptu::{T3Record, RECORD_SIZE};

/// Occupancy transition reported by the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferAlert {
    /// Occupancy reached the capacity.
    PileUp {
        /// Records queued when the alert fired.
        occupancy: usize,
    },
    /// Occupancy dropped back below the capacity.
    Cleared {
        /// Records queued when the alert cleared.
        occupancy: usize,
    },
}

/// Counters kept over the buffer's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Records admitted.
    pub records_in: u64,
    /// Records handed to the consumer.
    pub records_out: u64,
    /// Number of pile-up alerts raised.
    pub pile_ups: u64,
    /// Number of pile-up alerts cleared.
    pub clears: u64,
    /// Highest occupancy observed.
    pub peak_occupancy: usize,
}

/// Record FIFO with pile-up signalling.
#[derive(Debug)]
pub struct StreamBuffer {
    records: VecDeque<T3Record>,
    partial: [u8; RECORD_SIZE],
    partial_len: usize,
    capacity: usize,
    piled_up: bool,
    stats: BufferStats,
}

impl StreamBuffer {
    /// Creates a buffer alerting at `capacity` records (at least 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity.min(1 << 16)),
            partial: [0; RECORD_SIZE],
            partial_len: 0,
            capacity,
            piled_up: false,
            stats: BufferStats::default(),
        }
    }

    /// High-water mark in records.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of queued records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no complete record is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Bytes held back because they do not form a complete record yet.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.partial_len
    }

    /// Lifetime counters.
    #[must_use]
    pub fn stats(&self) -> BufferStats {
        self.stats
    }

    /// Queues one record.
    ///
    /// Returns [`BufferAlert::PileUp`] on the push that brings the occupancy to the capacity.
    pub fn push(&mut self, record: T3Record) -> Option<BufferAlert> {
        self.records.push_back(record);
        self.stats.records_in += 1;
        self.stats.peak_occupancy = self.stats.peak_occupancy.max(self.records.len());
        self.check_transition()
    }

    /// Appends raw little-endian bytes.
    ///
    /// Complete records are queued in order; a trailing partial record is held
    /// until the rest of its bytes arrive. At most one alert can result, since
    /// pushing never lowers the occupancy.
    pub fn extend_from_slice(&mut self, mut bytes: &[u8]) -> Option<BufferAlert> {
        let mut alert = None;

        if self.partial_len > 0 {
            let take = (RECORD_SIZE - self.partial_len).min(bytes.len());
            self.partial[self.partial_len..self.partial_len + take].copy_from_slice(&bytes[..take]);
            self.partial_len += take;
            bytes = &bytes[take..];
            if self.partial_len < RECORD_SIZE {
                return None;
            }
            self.partial_len = 0;
            alert = alert.or(self.push(T3Record::from_le_bytes(self.partial)));
        }

        let mut chunks = bytes.chunks_exact(RECORD_SIZE);
        for chunk in &mut chunks {
            let mut raw = [0u8; RECORD_SIZE];
            raw.copy_from_slice(chunk);
            alert = alert.or(self.push(T3Record::from_le_bytes(raw)));
        }

        let rest = chunks.remainder();
        self.partial[..rest.len()].copy_from_slice(rest);
        self.partial_len = rest.len();

        alert
    }

    /// Takes the oldest record.
    ///
    /// The alert is [`BufferAlert::Cleared`] when this pop brings the occupancy back below capacity.
    pub fn pop(&mut self) -> Option<(T3Record, Option<BufferAlert>)> {
        let record = self.records.pop_front()?;
        self.stats.records_out += 1;
        Some((record, self.check_transition()))
    }

    /// Ends the stream, discarding and returning the count of bytes that never formed a record.
    ///
    /// Queued records are kept; the consumer must still drain them.
    pub fn finish(&mut self) -> usize {
        let dangling = self.partial_len;
        if dangling > 0 {
            log::warn!("stream ended with {dangling} trailing byte(s) of an incomplete record");
        }
        self.partial_len = 0;
        dangling
    }

    fn check_transition(&mut self) -> Option<BufferAlert> {
        let occupancy = self.records.len();
        match (self.piled_up, occupancy >= self.capacity) {
            (false, true) => {
                self.piled_up = true;
                self.stats.pile_ups += 1;
                log::warn!(
                    "stream buffer pile-up: {occupancy} records queued (capacity {}), display may lag the measurement",
                    self.capacity
                );
                Some(BufferAlert::PileUp { occupancy })
            }
            (true, false) => {
                self.piled_up = false;
                self.stats.clears += 1;
                log::info!("stream buffer pile-up cleared: {occupancy} records queued");
                Some(BufferAlert::Cleared { occupancy })
            }
            _ => None,
        }
    }
}
