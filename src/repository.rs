//! Read-only collaborators that hold historical data
//!
//! The engine never opens a datastore. Everything it needs from storage is
//! reached through these traits, which keeps the simulation testable with
//! in-memory fakes.

use crate::error::EngineError;
use crate::types::{HeartRateSample, HourlyActivity, RelaxationSession};
use chrono::{DateTime, Duration, Timelike, Utc};

/// Historical heart-rate samples
pub trait HistoryRepository {
    /// Samples with `start <= timestamp <= end`, oldest first
    fn fetch_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HeartRateSample>, EngineError>;
}

/// Per-hour activity aggregates used to learn the chronotype
pub trait ActivityRepository {
    /// Average APM per local hour of day over observations made after `since`
    fn hourly_activity(&self, since: DateTime<Utc>) -> Result<Vec<HourlyActivity>, EngineError>;
}

/// Recorded relaxation sessions
pub trait SessionCalendar {
    /// Sessions overlapping `[start, end]`
    fn sessions_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RelaxationSession>, EngineError>;
}

/// One timestamped activity observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivityObservation {
    pub timestamp: DateTime<Utc>,
    pub apm: f64,
}

/// In-memory implementation of all repository traits
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    samples: Vec<HeartRateSample>,
    activity: Vec<ActivityObservation>,
    sessions: Vec<RelaxationSession>,
    utc_offset_seconds: i64,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bucket activity by local hour at this offset from UTC
    pub fn with_utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.utc_offset_seconds = i64::from(minutes) * 60;
        self
    }

    pub fn with_samples(mut self, samples: impl IntoIterator<Item = HeartRateSample>) -> Self {
        self.samples.extend(samples);
        self.samples.sort_by_key(|s| s.timestamp);
        self
    }

    pub fn with_activity(
        mut self,
        observations: impl IntoIterator<Item = ActivityObservation>,
    ) -> Self {
        self.activity.extend(observations);
        self
    }

    pub fn with_sessions(mut self, sessions: impl IntoIterator<Item = RelaxationSession>) -> Self {
        self.sessions.extend(sessions);
        self
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

impl HistoryRepository for InMemoryRepository {
    fn fetch_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HeartRateSample>, EngineError> {
        Ok(self
            .samples
            .iter()
            .filter(|s| s.timestamp >= start && s.timestamp <= end)
            .copied()
            .collect())
    }
}

impl ActivityRepository for InMemoryRepository {
    fn hourly_activity(&self, since: DateTime<Utc>) -> Result<Vec<HourlyActivity>, EngineError> {
        let mut sums = [0.0_f64; 24];
        let mut counts = [0_u64; 24];

        // Idle observations carry no chronotype signal
        for obs in self
            .activity
            .iter()
            .filter(|o| o.timestamp >= since && o.apm > 0.0)
        {
            let local = obs.timestamp + Duration::seconds(self.utc_offset_seconds);
            let hour = local.hour() as usize;
            sums[hour] += obs.apm;
            counts[hour] += 1;
        }

        Ok((0..24)
            .filter(|&h| counts[h] > 0)
            .map(|h| HourlyActivity {
                hour: h as u8,
                avg_apm: sums[h] / counts[h] as f64,
                count: counts[h],
            })
            .collect())
    }
}

impl SessionCalendar for InMemoryRepository {
    fn sessions_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RelaxationSession>, EngineError> {
        Ok(self
            .sessions
            .iter()
            .filter(|s| s.start <= end && s.end.map_or(true, |e| e >= start))
            .copied()
            .collect())
    }
}
