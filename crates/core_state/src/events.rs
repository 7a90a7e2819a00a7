//! Bounded, ordered log of applied state events.
//!
//! The buffer is a diagnostic/replay aid, not a transaction log: losing it
//! costs history, never state. Oldest entries are evicted first, by count or
//! by age, whichever bound is configured.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the event buffer.
#[derive(Debug, Error)]
pub enum BufferError {
    /// Sequence numbers must be strictly increasing; a violation is an
    /// internal programming error, not recoverable input.
    #[error("non-monotonic sequence number {got} after {last}")]
    NonMonotonicSeq { last: u64, got: u64 },
}

/// Where an event entered the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// Ingested from the window manager's event stream.
    Wm,
    /// Synthesized by the recovery/validation subsystem.
    Recovery,
    /// Produced while serving a client request (e.g. layout restore).
    Client,
}

/// One applied event, as recorded in the buffer and streamed to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEntry {
    /// Strictly increasing, never reused.
    pub seq: u64,
    pub source: EventSource,
    /// Event kind tag (e.g. "window_opened").
    pub kind: String,
    /// Full event payload.
    pub payload: serde_json::Value,
    /// Unix timestamp in milliseconds, assigned by the daemon.
    pub timestamp_ms: u64,
}

/// Retention bounds for the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferLimits {
    /// Maximum entry count; oldest evicted beyond this.
    pub max_entries: usize,
    /// Maximum entry age; `None` disables age-based pruning.
    pub max_age_ms: Option<u64>,
}

impl Default for BufferLimits {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_age_ms: None,
        }
    }
}

/// Bounded FIFO of event entries.
pub struct EventBuffer {
    entries: VecDeque<EventEntry>,
    limits: BufferLimits,
    last_seq: Option<u64>,
}

impl EventBuffer {
    pub fn new(limits: BufferLimits) -> Self {
        Self {
            entries: VecDeque::new(),
            limits,
            last_seq: None,
        }
    }

    /// Restore a buffer from persisted entries. Entries violating ordering
    /// are discarded from the corruption point on.
    pub fn restore(limits: BufferLimits, persisted: Vec<EventEntry>) -> Self {
        let mut buffer = Self::new(limits);
        for entry in persisted {
            if buffer.append(entry).is_err() {
                tracing::warn!("Discarding out-of-order tail of persisted event log");
                break;
            }
        }
        buffer
    }

    /// Append an entry. Evicts from the front when over capacity.
    pub fn append(&mut self, entry: EventEntry) -> Result<(), BufferError> {
        if let Some(last) = self.last_seq {
            if entry.seq <= last {
                return Err(BufferError::NonMonotonicSeq {
                    last,
                    got: entry.seq,
                });
            }
        }
        self.last_seq = Some(entry.seq);
        self.entries.push_back(entry);
        while self.entries.len() > self.limits.max_entries {
            self.entries.pop_front();
        }
        Ok(())
    }

    /// Entries with a sequence number strictly greater than `seq`, oldest
    /// first. A fresh call re-walks from the given sequence number.
    pub fn since(&self, seq: u64) -> Vec<EventEntry> {
        let start = self.entries.partition_point(|e| e.seq <= seq);
        self.entries.iter().skip(start).cloned().collect()
    }

    /// Evict entries older than the configured age bound.
    pub fn prune(&mut self, now_ms: u64) {
        let Some(max_age) = self.limits.max_age_ms else {
            return;
        };
        while let Some(front) = self.entries.front() {
            if now_ms.saturating_sub(front.timestamp_ms) > max_age {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest retained sequence number.
    pub fn first_seq(&self) -> Option<u64> {
        self.entries.front().map(|e| e.seq)
    }

    /// Newest appended sequence number, surviving pruning.
    pub fn last_seq(&self) -> Option<u64> {
        self.last_seq
    }

    /// All retained entries, for persistence.
    pub fn snapshot(&self) -> Vec<EventEntry> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(seq: u64, timestamp_ms: u64) -> EventEntry {
        EventEntry {
            seq,
            source: EventSource::Wm,
            kind: "window_opened".to_string(),
            payload: serde_json::json!({"id": seq}),
            timestamp_ms,
        }
    }

    #[test]
    fn sequence_numbers_strictly_increase() {
        let mut buffer = EventBuffer::new(BufferLimits::default());
        buffer.append(entry(1, 0)).unwrap();
        buffer.append(entry(2, 0)).unwrap();
        assert!(buffer.append(entry(2, 0)).is_err());
        assert!(buffer.append(entry(1, 0)).is_err());
        buffer.append(entry(3, 0)).unwrap();

        let seqs: Vec<u64> = buffer.since(0).iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn since_walks_from_the_given_seq() {
        let mut buffer = EventBuffer::new(BufferLimits::default());
        for seq in 1..=5 {
            buffer.append(entry(seq, 0)).unwrap();
        }
        let tail: Vec<u64> = buffer.since(3).iter().map(|e| e.seq).collect();
        assert_eq!(tail, vec![4, 5]);
        // restartable: a second walk sees the same entries
        let again: Vec<u64> = buffer.since(3).iter().map(|e| e.seq).collect();
        assert_eq!(again, tail);
        assert!(buffer.since(5).is_empty());
    }

    #[test]
    fn count_bound_evicts_oldest_first() {
        let mut buffer = EventBuffer::new(BufferLimits {
            max_entries: 3,
            max_age_ms: None,
        });
        for seq in 1..=5 {
            buffer.append(entry(seq, 0)).unwrap();
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.first_seq(), Some(3));
        assert_eq!(buffer.last_seq(), Some(5));
    }

    #[test]
    fn age_bound_prunes_old_entries() {
        let mut buffer = EventBuffer::new(BufferLimits {
            max_entries: 100,
            max_age_ms: Some(1_000),
        });
        buffer.append(entry(1, 0)).unwrap();
        buffer.append(entry(2, 500)).unwrap();
        buffer.append(entry(3, 2_000)).unwrap();

        buffer.prune(2_100);
        let seqs: Vec<u64> = buffer.since(0).iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![3]);
        // last_seq survives pruning so numbering never restarts
        assert_eq!(buffer.last_seq(), Some(3));
    }

    #[test]
    fn restore_discards_corrupt_tail() {
        let persisted = vec![entry(1, 0), entry(2, 0), entry(2, 0), entry(9, 0)];
        let buffer = EventBuffer::restore(BufferLimits::default(), persisted);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.last_seq(), Some(2));
    }

    #[test]
    fn entries_roundtrip_through_json() {
        let original = entry(42, 123);
        let json = serde_json::to_string(&original).unwrap();
        let back: EventEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(original, back);
    }
}
