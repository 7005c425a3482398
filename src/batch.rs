//! Micro-batch aggregation for warehouse writes
//!
//! Buffers accepted position events and decides when the buffer is due for a
//! flush. Two triggers exist: the buffer reaching its size limit, and the
//! oldest buffered event reaching the configured wait. When both hold at the
//! same instant the size trigger is reported. An empty buffer is never due.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::BatchConfig;
use crate::models::PositionEvent;

/// Why a batch was handed to the warehouse writer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Buffer reached the size limit
    Size,
    /// Oldest buffered event reached the wait limit
    Deadline,
    /// Shutdown drain, whatever is buffered goes out
    Drain,
}

impl FlushReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushReason::Size => "size",
            FlushReason::Deadline => "deadline",
            FlushReason::Drain => "drain",
        }
    }
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Event buffer with size and age flush triggers
pub struct BatchAggregator {
    max_size: usize,
    max_wait: Duration,
    buffer: Vec<PositionEvent>,
    oldest_at: Option<Instant>,
}

impl BatchAggregator {
    pub fn new(config: &BatchConfig) -> Self {
        Self::with_limits(config.max_batch_size, config.max_batch_wait())
    }

    pub fn with_limits(max_size: usize, max_wait: Duration) -> Self {
        Self {
            max_size,
            max_wait,
            buffer: Vec::with_capacity(max_size),
            oldest_at: None,
        }
    }

    /// Append an event to the buffer
    ///
    /// The wait clock starts when an event enters an empty buffer and is not
    /// reset by later events.
    pub fn push(&mut self, event: PositionEvent) {
        if self.buffer.is_empty() {
            self.oldest_at = Some(Instant::now());
        }
        self.buffer.push(event);
    }

    /// Number of buffered events
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Check whether the buffer is due for a flush right now
    pub fn flush_reason(&self) -> Option<FlushReason> {
        self.flush_reason_at(Instant::now())
    }

    /// Check whether the buffer is due for a flush at the given instant
    pub fn flush_reason_at(&self, now: Instant) -> Option<FlushReason> {
        if self.buffer.is_empty() {
            return None;
        }
        if self.buffer.len() >= self.max_size {
            return Some(FlushReason::Size);
        }
        if let Some(oldest_at) = self.oldest_at {
            if now.duration_since(oldest_at) >= self.max_wait {
                return Some(FlushReason::Deadline);
            }
        }
        None
    }

    /// Instant at which the deadline trigger will fire, if anything is
    /// buffered
    pub fn next_deadline(&self) -> Option<Instant> {
        self.oldest_at.map(|oldest_at| oldest_at + self.max_wait)
    }

    /// Take all buffered events and reset the wait clock
    pub fn drain(&mut self) -> Vec<PositionEvent> {
        self.oldest_at = None;
        std::mem::take(&mut self.buffer)
    }
}
