//! Engine configuration
//!
//! Every tuning constant of the engine lives here so that deployments can
//! override them from a JSON file. Missing fields fall back to the defaults.

use crate::error::EngineError;
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default cardiac-drift scaling applied to `work_hours × gamma`.
pub const DEFAULT_CARDIAC_DRIFT_SCALE: f64 = 20.0;

/// Default number of snapshots kept in the history ring buffer.
pub const DEFAULT_HISTORY_CAPACITY: usize = 360;

/// Tunable parameters for [`crate::engine::BioEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Snapshots kept in the history ring buffer
    pub history_capacity: usize,
    /// Accumulated seconds between physics ticks
    pub physics_tick_seconds: f64,
    /// Age after which a real heart-rate sample is considered stale
    pub hr_stale_seconds: f64,
    /// Minimum seconds between retroactive correction passes
    pub retroactive_interval_seconds: f64,
    /// Maximum distance between a snapshot and a delayed sample
    pub retroactive_match_seconds: f64,
    /// Processed-timestamp markers older than this are pruned
    pub processed_marker_retention_hours: f64,
    /// Window for matching a real sample to an estimated snapshot
    pub shadow_learning_window_seconds: f64,
    /// Scaling of `work_hours × gamma` in the shadow predictor
    pub cardiac_drift_scale: f64,
    /// Trajectory cache lifetime
    pub trajectory_cache_seconds: f64,
    /// Effective FP below which a break is recommended
    pub break_threshold_fp: f64,
    /// Effective FP treated as exhaustion
    pub exhaustion_threshold_fp: f64,
    /// Minutes between recommended hydration breaks
    pub hydration_interval_minutes: i64,
    /// Continuous idle seconds that count as a break
    pub auto_break_idle_seconds: f64,
    /// Idle seconds that end a continuous work session
    pub work_idle_reset_seconds: f64,
    /// Resting heart rate used until a biometric refresh provides one
    pub default_baseline_hr: u32,
    /// Offset from UTC used to resolve the local hour of day
    pub utc_offset_minutes: i32,
    /// Lookback for start-up heart-rate hydration
    pub hydration_window_hours: i64,
    /// Lookback for chronotype learning
    pub chronotype_lookback_days: i64,
    /// Observed samples needed for the learned curve to fully replace the default
    pub chronotype_required_samples: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            physics_tick_seconds: 1.0,
            hr_stale_seconds: 300.0,
            retroactive_interval_seconds: 5.0,
            retroactive_match_seconds: 30.0,
            processed_marker_retention_hours: 6.0,
            shadow_learning_window_seconds: 120.0,
            cardiac_drift_scale: DEFAULT_CARDIAC_DRIFT_SCALE,
            trajectory_cache_seconds: 5.0,
            break_threshold_fp: 20.0,
            exhaustion_threshold_fp: 10.0,
            hydration_interval_minutes: 90,
            auto_break_idle_seconds: 900.0,
            work_idle_reset_seconds: 300.0,
            default_baseline_hr: 60,
            utc_offset_minutes: 0,
            hydration_window_hours: 24,
            chronotype_lookback_days: 7,
            chronotype_required_samples: 48,
        }
    }
}

impl EngineConfig {
    /// Check value ranges that would otherwise break the simulation
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.history_capacity == 0 {
            return Err(EngineError::Config(
                "history_capacity must be positive".to_string(),
            ));
        }
        if self.physics_tick_seconds <= 0.0 {
            return Err(EngineError::Config(
                "physics_tick_seconds must be positive".to_string(),
            ));
        }
        if self.default_baseline_hr == 0 {
            return Err(EngineError::Config(
                "default_baseline_hr must be positive".to_string(),
            ));
        }
        if self.chronotype_required_samples == 0 {
            return Err(EngineError::Config(
                "chronotype_required_samples must be positive".to_string(),
            ));
        }
        if self.utc_offset().is_none() {
            return Err(EngineError::Config(format!(
                "utc_offset_minutes out of range: {}",
                self.utc_offset_minutes
            )));
        }
        Ok(())
    }

    /// Local offset used for hour-of-day lookups
    pub fn utc_offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
    }

    /// Load configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load configuration from a file, or defaults if the file does not exist
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}
