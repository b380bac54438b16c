//! Start-up state restoration
//!
//! A freshly constructed engine knows nothing about the hours before it was
//! started. Hydration replays the last day of heart-rate records so the first
//! states already reflect accumulated strain.

use crate::types::HeartRateSample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Deviation from baseline (BPM) at which load saturates
const LOAD_SATURATION_BPM: f64 = 40.0;

/// Deviation from baseline (BPM) counted as a high heart-rate minute
const HIGH_HR_DEVIATION_BPM: f64 = 20.0;

/// Outcome of replaying historical heart rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HydrationReport {
    pub records: usize,
    pub total_deviation: f64,
    pub total_load: f64,
    pub avg_deviation: f64,
    pub high_hr_minutes: u32,
    /// Readiness adjustment within -20 to +5
    pub readiness_adjustment: f64,
    pub estimated_readiness: f64,
    pub base_fp: f64,
    /// Newest sample, seeds the current heart rate
    pub latest: HeartRateSample,
}

impl HydrationReport {
    /// Whether the newest sample is too old to be used directly
    pub fn latest_is_stale(&self, now: DateTime<Utc>, stale_seconds: f64) -> bool {
        (now - self.latest.timestamp).num_milliseconds() as f64 / 1000.0 >= stale_seconds
    }
}

/// Replay samples (oldest first) against the starting readiness and base FP.
///
/// Returns `None` when there is nothing to replay.
pub fn hydrate(
    samples: &[HeartRateSample],
    baseline_hr: u32,
    readiness: f64,
    base_fp: f64,
) -> Option<HydrationReport> {
    let latest = *samples.iter().max_by_key(|s| s.timestamp)?;

    let mut total_deviation = 0.0;
    let mut total_load = 0.0;
    let mut high_hr_minutes = 0_u32;
    for sample in samples {
        let deviation = f64::from(sample.bpm) - f64::from(baseline_hr);
        total_deviation += deviation;
        if deviation > 0.0 {
            total_load += (deviation / LOAD_SATURATION_BPM).min(1.0);
            if deviation > HIGH_HR_DEVIATION_BPM {
                high_hr_minutes += 1;
            }
        }
    }

    let avg_deviation = total_deviation / samples.len() as f64;
    let readiness_adjustment = (-avg_deviation * 0.3).clamp(-20.0, 5.0);
    let estimated_readiness = (readiness + readiness_adjustment).clamp(30.0, 100.0);
    let penalty = (f64::from(high_hr_minutes) * 0.05).min(20.0);

    Some(HydrationReport {
        records: samples.len(),
        total_deviation,
        total_load,
        avg_deviation,
        high_hr_minutes,
        readiness_adjustment,
        estimated_readiness,
        base_fp: (base_fp - penalty).max(30.0),
        latest,
    })
}
