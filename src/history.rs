//! Fixed-capacity snapshot history
//!
//! The engine keeps the most recent snapshots (one per update) for learning
//! and retroactive correction. The real heart rate of a snapshot can only be
//! filled in once, through [`HistoryBuffer::backfill`].

use crate::types::EngineState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One entry of the history ring buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub timestamp: DateTime<Utc>,
    pub apm: f64,
    /// Smoothed mouse speed at the time of the snapshot
    pub mouse_speed: f64,
    heart_rate: Option<u32>,
    pub state: EngineState,
}

impl HistorySnapshot {
    pub fn new(
        timestamp: DateTime<Utc>,
        apm: f64,
        mouse_speed: f64,
        heart_rate: Option<u32>,
        state: EngineState,
    ) -> Self {
        Self {
            timestamp,
            apm,
            mouse_speed,
            heart_rate,
            state,
        }
    }

    /// Real heart rate recorded for this moment, if any
    pub fn heart_rate(&self) -> Option<u32> {
        self.heart_rate
    }
}

/// FIFO ring buffer of snapshots
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    entries: VecDeque<HistorySnapshot>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a snapshot, evicting the oldest when full
    pub fn push(&mut self, snapshot: HistorySnapshot) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(snapshot);
    }

    pub fn get(&self, index: usize) -> Option<&HistorySnapshot> {
        self.entries.get(index)
    }

    pub fn latest(&self) -> Option<&HistorySnapshot> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &HistorySnapshot> + '_ {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Time span covered by the buffer, oldest to newest
    pub fn time_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.entries.front(), self.entries.back()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp)),
            _ => None,
        }
    }

    /// Fill in the real heart rate of snapshot `index`.
    ///
    /// Returns false if the index is out of range or a heart rate is already present.
    pub fn backfill(&mut self, index: usize, heart_rate: u32) -> bool {
        match self.entries.get_mut(index) {
            Some(entry) if entry.heart_rate.is_none() => {
                entry.heart_rate = Some(heart_rate);
                true
            }
            _ => false,
        }
    }

    /// Index of the snapshot closest to `timestamp`, within `window_seconds` inclusive.
    ///
    /// Ties go to the older snapshot.
    pub fn closest_index(&self, timestamp: DateTime<Utc>, window_seconds: f64) -> Option<usize> {
        let mut best: Option<(usize, i64)> = None;
        for (index, entry) in self.entries.iter().enumerate() {
            let distance = (entry.timestamp - timestamp).num_milliseconds().abs();
            if distance as f64 > window_seconds * 1000.0 {
                continue;
            }
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((index, distance));
            }
        }
        best.map(|(index, _)| index)
    }
}
