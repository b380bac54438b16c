//! Core types for the Synheart Focus engine
//!
//! This module defines the data that crosses the engine boundary: per-update
//! inputs, heart-rate samples, the immutable `EngineState` snapshot, and the
//! read-only reports produced by the accessors.

use crate::shadow_hr::CoefficientReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Intensity thresholds separating the activity states, in ascending order
pub const ACTIVITY_THRESHOLDS: [f64; 4] = [0.05, 0.2, 0.5, 0.8];

/// Activity classification derived from input intensity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
    Idle,
    Light,
    Moderate,
    DeepDive,
    Hyperfocus,
}

impl ActivityState {
    /// Classify an intensity score. Recomputed fresh on every update, no hysteresis.
    pub fn from_intensity(intensity: f64) -> Self {
        if intensity < ACTIVITY_THRESHOLDS[0] {
            ActivityState::Idle
        } else if intensity < ACTIVITY_THRESHOLDS[1] {
            ActivityState::Light
        } else if intensity < ACTIVITY_THRESHOLDS[2] {
            ActivityState::Moderate
        } else if intensity < ACTIVITY_THRESHOLDS[3] {
            ActivityState::DeepDive
        } else {
            ActivityState::Hyperfocus
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityState::Idle => "idle",
            ActivityState::Light => "light",
            ActivityState::Moderate => "moderate",
            ActivityState::DeepDive => "deep_dive",
            ActivityState::Hyperfocus => "hyperfocus",
        }
    }

    /// Display label used in status messages
    pub fn label(&self) -> &'static str {
        match self {
            ActivityState::Idle => "STANDBY",
            ActivityState::Light => "LIGHT",
            ActivityState::Moderate => "MODERATE",
            ActivityState::DeepDive => "DEEP DIVE",
            ActivityState::Hyperfocus => "HYPERFOCUS",
        }
    }
}

/// Context in which a heart-rate sample was recorded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HrSource {
    Awake,
    Rest,
    #[default]
    #[serde(other)]
    Unknown,
}

/// A single real heart-rate measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeartRateSample {
    /// When the sample was measured (not when it arrived)
    pub timestamp: DateTime<Utc>,
    /// Beats per minute
    pub bpm: u32,
    /// Recording context
    #[serde(default)]
    pub source: HrSource,
}

impl HeartRateSample {
    pub fn new(timestamp: DateTime<Utc>, bpm: u32, source: HrSource) -> Self {
        Self {
            timestamp,
            bpm,
            source,
        }
    }
}

/// Observed average activity for one hour of the day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourlyActivity {
    /// Hour of day (0-23)
    pub hour: u8,
    /// Average actions per minute during that hour
    pub avg_apm: f64,
    /// Number of observations behind the average
    pub count: u64,
}

/// A relaxation session during which elevated heart rate counts as recovery
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelaxationSession {
    pub start: DateTime<Utc>,
    /// `None` while the session is still running
    pub end: Option<DateTime<Utc>>,
}

impl RelaxationSession {
    /// Whether `timestamp` falls inside the session. Both ends are inclusive;
    /// an open session extends to `now`.
    pub fn contains(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let end = self.end.unwrap_or(now);
        self.start <= timestamp && timestamp <= end
    }
}

/// Monotonic counters maintained by the input collector
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CumulativeCounters {
    pub mouse_pixels: f64,
    pub keystrokes: u64,
    pub backspaces: u64,
    pub scroll_steps: u64,
}

/// New biometric baselines delivered by the wearable integration
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiometricRefresh {
    pub readiness: Option<u8>,
    pub sleep_score: Option<u8>,
    pub wake_time: Option<DateTime<Utc>>,
    pub baseline_hr: Option<u32>,
    pub main_sleep_seconds: Option<u32>,
}

/// Everything the sampling loop hands to one `update()` call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateInput {
    /// Instantaneous actions per minute
    pub apm: f64,
    /// Cumulative input counters
    pub counters: CumulativeCounters,
    /// Latest real heart-rate sample, if one arrived
    pub heart_rate: Option<HeartRateSample>,
    /// Delayed heart-rate stream slice used for retroactive correction
    pub hr_stream: Vec<HeartRateSample>,
    /// Cumulative nap minutes today
    pub total_nap_minutes: f64,
    /// Cumulative phantom recovery total
    pub phantom_recovery_sum: f64,
    /// A relaxation session is running right now
    pub relaxation_session_active: bool,
    /// Updated biometric baselines
    pub biometrics: Option<BiometricRefresh>,
    /// The user explicitly took a break
    pub break_taken: bool,
}

/// Immutable engine snapshot produced by every update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub timestamp: DateTime<Utc>,
    pub base_fp: f64,
    pub boost_fp: f64,
    /// Always within 10-100
    pub effective_fp: f64,
    /// Always within 0-10
    pub debt: f64,
    /// 0-1
    pub current_load: f64,
    pub readiness: u8,
    pub estimated_readiness: f64,
    pub continuous_work_hours: f64,
    pub decay_multiplier: f64,
    pub hours_since_wake: f64,
    pub activity_state: ActivityState,
    pub boost_efficiency: f64,
    pub correction_factor: f64,
    pub estimated_hr: Option<u32>,
    pub is_hr_estimated: bool,
    pub hr_last_update: Option<DateTime<Utc>>,
}

/// Future scenario simulated by the trajectory predictor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Continue,
    Rest,
}

/// One point of a predicted FP curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionPoint {
    pub timestamp: DateTime<Utc>,
    pub fp: f64,
    pub scenario: Scenario,
}

/// Parallel "continue working" and "rest now" FP curves
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    #[serde(rename = "continue")]
    pub continue_curve: Vec<PredictionPoint>,
    #[serde(rename = "rest")]
    pub rest_curve: Vec<PredictionPoint>,
}

/// Full diagnostic view of the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthMetrics {
    pub engine_instance_id: String,
    pub base_fp: f64,
    pub boost_fp: f64,
    pub effective_fp: f64,
    pub debt: f64,
    pub current_load: f64,
    pub readiness: u8,
    pub sleep_score: u8,
    pub estimated_readiness: f64,
    pub continuous_work_hours: f64,
    pub decay_multiplier: f64,
    pub hours_since_wake: f64,
    pub activity_state: ActivityState,
    pub boost_efficiency: f64,
    pub correction_factor: f64,
    pub session_mouse_pixels: f64,
    pub session_backspace_count: u64,
    pub session_scroll_steps: u64,
    pub continuous_idle_seconds: f64,
    pub chronotype_hour_efficiency: f64,
    pub chronotype_blend_ratio: f64,
    pub phantom_recovery_sum: f64,
    pub current_mouse_speed: f64,
    pub recent_correction_rate: f64,
    pub relaxation_session_active: bool,
    pub current_hr: Option<u32>,
    pub baseline_hr: u32,
    pub cumulative_hr_deviation: f64,
    pub cumulative_load: f64,
    pub hr_stress_factor: f64,
    pub estimated_hr: Option<u32>,
    pub is_hr_estimated: bool,
    pub hr_last_update: Option<DateTime<Utc>>,
    pub shadow_hr_coefficients: CoefficientReport,
    pub stress_index: f64,
    pub recovery_efficiency: f64,
    pub recovery_ceiling: f64,
    pub hydration_completed: bool,
}

/// Every intermediate term of the effective FP computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FpBreakdown {
    pub base_fp: f64,
    pub boost_fp: f64,
    pub boost_efficiency: f64,
    pub debt: f64,
    pub boosted_fp: f64,
    pub debt_penalty: f64,
    pub raw_fp: f64,
    pub effective_fp: f64,
    pub base_decay_rate: f64,
    pub work_multiplier: f64,
    pub debt_decay_multiplier: f64,
    pub friction_multiplier: f64,
    pub hr_stress_factor: f64,
    pub effective_decay_rate: f64,
    pub current_hr: Option<u32>,
    pub baseline_hr: u32,
    pub current_hour: u32,
    pub hour_efficiency: f64,
    pub using_default_chronotype: bool,
    pub chronotype_blend_ratio: f64,
    pub recovery_ceiling: f64,
    pub formula: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_activity_thresholds() {
        assert_eq!(ActivityState::from_intensity(0.0), ActivityState::Idle);
        assert_eq!(ActivityState::from_intensity(0.049), ActivityState::Idle);
        assert_eq!(ActivityState::from_intensity(0.05), ActivityState::Light);
        assert_eq!(ActivityState::from_intensity(0.2), ActivityState::Moderate);
        assert_eq!(ActivityState::from_intensity(0.5), ActivityState::DeepDive);
        assert_eq!(ActivityState::from_intensity(0.8), ActivityState::Hyperfocus);
        assert_eq!(ActivityState::from_intensity(1.0), ActivityState::Hyperfocus);
    }

    #[test]
    fn test_activity_states_are_ordered() {
        assert!(ActivityState::Idle < ActivityState::Light);
        assert!(ActivityState::DeepDive < ActivityState::Hyperfocus);
    }

    #[test]
    fn test_unknown_source_deserializes() {
        let sample: HeartRateSample = serde_json::from_str(
            r#"{"timestamp": "2024-01-15T10:00:00Z", "bpm": 72, "source": "workout"}"#,
        )
        .unwrap();
        assert_eq!(sample.source, HrSource::Unknown);

        let sample: HeartRateSample =
            serde_json::from_str(r#"{"timestamp": "2024-01-15T10:00:00Z", "bpm": 52}"#).unwrap();
        assert_eq!(sample.source, HrSource::Unknown);

        let sample: HeartRateSample = serde_json::from_str(
            r#"{"timestamp": "2024-01-15T10:00:00Z", "bpm": 52, "source": "rest"}"#,
        )
        .unwrap();
        assert_eq!(sample.source, HrSource::Rest);
    }

    #[test]
    fn test_session_bounds_inclusive() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 20, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 15, 21, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 22, 0, 0).unwrap();

        let closed = RelaxationSession {
            start,
            end: Some(end),
        };
        assert!(closed.contains(start, now));
        assert!(closed.contains(end, now));
        assert!(!closed.contains(end + chrono::Duration::seconds(1), now));

        let open = RelaxationSession { start, end: None };
        assert!(open.contains(now, now));
        assert!(!open.contains(now + chrono::Duration::seconds(1), now));
    }

    #[test]
    fn test_trajectory_field_names() {
        let json = serde_json::to_value(Trajectory::default()).unwrap();
        assert!(json.get("continue").is_some());
        assert!(json.get("rest").is_some());
    }

    #[test]
    fn test_update_input_defaults_from_partial_json() {
        let input: UpdateInput =
            serde_json::from_str(r#"{"apm": 42.0, "counters": {"keystrokes": 10}}"#).unwrap();
        assert_eq!(input.apm, 42.0);
        assert_eq!(input.counters.keystrokes, 10);
        assert!(input.heart_rate.is_none());
        assert!(input.hr_stream.is_empty());
    }
}
