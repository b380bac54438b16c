//! Retroactive heart-rate correction
//!
//! Wearables deliver heart rate late and out of order. When a sample arrives
//! for a moment the engine has already simulated without real data, the
//! corrector backfills that snapshot and adjusts base energy by the difference
//! the sample would have made.

use crate::history::HistoryBuffer;
use crate::types::{HeartRateSample, HrSource, RelaxationSession};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// FP per BPM of deviation from baseline
pub const CORRECTION_COEFFICIENT: f64 = 0.015;

/// Recovery credited per snapshot inside a relaxation session
pub const SESSION_RECOVERY_PER_SNAPSHOT: f64 = 0.05 / 60.0;

/// How a matched snapshot was classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionKind {
    SessionRecovery,
    RestRecovery,
    Stress,
    Neutral,
}

/// Delayed data handed to one correction pass
#[derive(Debug, Clone, Copy)]
pub struct CorrectionInputs<'a> {
    pub now: DateTime<Utc>,
    pub baseline_hr: u32,
    /// Samples delivered with the current update
    pub stream: &'a [HeartRateSample],
    /// Samples fetched from the history repository
    pub repository: &'a [HeartRateSample],
    pub sessions: &'a [RelaxationSession],
}

/// Summary of one correction pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrectionReport {
    /// Snapshots that received a heart rate
    pub backfilled: usize,
    /// Snapshots whose correction was non-zero
    pub corrected: usize,
    /// Corrected snapshots matched to a repository sample
    pub from_repository: usize,
    pub rest_recoveries: usize,
    pub session_recoveries: usize,
    pub total_delta: f64,
    pub base_before: f64,
    pub base_after: f64,
}

impl CorrectionReport {
    pub fn applied(&self) -> bool {
        self.base_before != self.base_after
    }
}

/// Classify a late sample and compute the FP it should have cost or restored
pub fn correction_delta(
    readiness: f64,
    bpm: u32,
    baseline_hr: u32,
    source: HrSource,
) -> (CorrectionKind, f64) {
    let diff = bpm as f64 - baseline_hr as f64;

    if source == HrSource::Rest && diff < 0.0 {
        let recovery_multiplier = 0.5 + readiness / 200.0;
        return (
            CorrectionKind::RestRecovery,
            diff.abs() * CORRECTION_COEFFICIENT * recovery_multiplier,
        );
    }
    if diff > 0.0 {
        let stress_multiplier = (2.0 - readiness / 100.0).clamp(0.5, 2.0);
        return (
            CorrectionKind::Stress,
            -diff * CORRECTION_COEFFICIENT * stress_multiplier,
        );
    }
    (CorrectionKind::Neutral, 0.0)
}

/// Applies late samples to history and base energy, at most once per snapshot
#[derive(Debug, Clone)]
pub struct RetroactiveCorrector {
    processed: BTreeSet<DateTime<Utc>>,
    match_window_seconds: f64,
    retention: Duration,
}

impl RetroactiveCorrector {
    pub fn new(match_window_seconds: f64, retention_hours: f64) -> Self {
        Self {
            processed: BTreeSet::new(),
            match_window_seconds,
            retention: Duration::seconds((retention_hours * 3600.0) as i64),
        }
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    pub fn is_processed(&self, timestamp: DateTime<Utc>) -> bool {
        self.processed.contains(&timestamp)
    }

    /// Run one correction pass and return the corrected base energy in the report
    pub fn apply(
        &mut self,
        history: &mut HistoryBuffer,
        inputs: &CorrectionInputs<'_>,
        base_fp: f64,
    ) -> CorrectionReport {
        let mut report = CorrectionReport {
            base_before: base_fp,
            base_after: base_fp,
            ..Default::default()
        };

        // Stream samples take precedence over repository samples at the same instant
        let stream_times: HashSet<DateTime<Utc>> =
            inputs.stream.iter().map(|s| s.timestamp).collect();
        let candidates: Vec<(HeartRateSample, bool)> = inputs
            .stream
            .iter()
            .map(|s| (*s, false))
            .chain(
                inputs
                    .repository
                    .iter()
                    .filter(|s| !stream_times.contains(&s.timestamp))
                    .map(|s| (*s, true)),
            )
            .collect();

        if !candidates.is_empty() {
            let window_ms = (self.match_window_seconds * 1000.0) as i64;
            for index in 0..history.len() {
                let Some(snapshot) = history.get(index) else {
                    break;
                };
                if snapshot.heart_rate().is_some() || self.processed.contains(&snapshot.timestamp)
                {
                    continue;
                }
                let timestamp = snapshot.timestamp;
                let readiness = f64::from(snapshot.state.readiness);

                let mut best: Option<(HeartRateSample, bool, i64)> = None;
                for (sample, from_repository) in &candidates {
                    let distance = (sample.timestamp - timestamp).num_milliseconds().abs();
                    if distance > window_ms {
                        continue;
                    }
                    if best.map_or(true, |(_, _, d)| distance < d) {
                        best = Some((*sample, *from_repository, distance));
                    }
                }
                let Some((sample, from_repository, _)) = best else {
                    continue;
                };

                let in_session = inputs
                    .sessions
                    .iter()
                    .any(|s| s.contains(timestamp, inputs.now));
                let (kind, delta) = if in_session {
                    (CorrectionKind::SessionRecovery, SESSION_RECOVERY_PER_SNAPSHOT)
                } else {
                    correction_delta(readiness, sample.bpm, inputs.baseline_hr, sample.source)
                };

                if delta != 0.0 {
                    report.total_delta += delta;
                    report.corrected += 1;
                    if from_repository {
                        report.from_repository += 1;
                    }
                    match kind {
                        CorrectionKind::SessionRecovery => report.session_recoveries += 1,
                        CorrectionKind::RestRecovery => report.rest_recoveries += 1,
                        _ => {}
                    }
                }

                if history.backfill(index, sample.bpm) {
                    report.backfilled += 1;
                }
                self.processed.insert(timestamp);
            }
        }

        if report.total_delta != 0.0 {
            report.base_after = (base_fp + report.total_delta).clamp(10.0, 100.0);
            tracing::info!(
                corrected = report.corrected,
                from_repository = report.from_repository,
                rest = report.rest_recoveries,
                session = report.session_recoveries,
                delta = report.total_delta,
                base_before = report.base_before,
                base_after = report.base_after,
                "retroactive heart rate correction applied"
            );
        }

        self.prune(inputs.now);
        report
    }

    /// Forget markers older than the retention window
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.retention;
        self.processed = self.processed.split_off(&cutoff);
    }
}
