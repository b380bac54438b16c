//! Time-of-day efficiency learning
//!
//! Every hour of the day gets an efficiency factor. The table starts from a
//! default circadian curve and shifts toward the user's observed activity
//! pattern as more observations accumulate.

use crate::repository::ActivityRepository;
use crate::types::HourlyActivity;
use chrono::{DateTime, Utc};

/// Hourly efficiency of an average person, indexed by local hour
pub const DEFAULT_CHRONOTYPE: [f64; 24] = [
    0.6, 0.5, 0.4, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.1, 1.2, 1.3, 1.1, 0.9, 0.8, 0.85, 0.95, 1.1, 1.2,
    1.15, 1.0, 0.9, 0.8, 0.7,
];

/// Observations needed for the learned curve to fully replace the default
pub const DEFAULT_REQUIRED_SAMPLES: u64 = 48;

/// Readiness factor bounds applied on top of the hourly efficiency
const READINESS_FACTOR_MIN: f64 = 0.5;
const READINESS_FACTOR_MAX: f64 = 1.2;

/// 24 hourly efficiency factors
#[derive(Debug, Clone, PartialEq)]
pub struct ChronotypeTable {
    efficiency: [f64; 24],
    daily_avg_apm: f64,
    blend_weight: f64,
    observed_samples: u64,
}

impl Default for ChronotypeTable {
    fn default() -> Self {
        Self {
            efficiency: DEFAULT_CHRONOTYPE,
            daily_avg_apm: 0.0,
            blend_weight: 0.0,
            observed_samples: 0,
        }
    }
}

impl ChronotypeTable {
    /// Blend observed hourly activity into the default curve
    pub fn from_activity(hourly: &[HourlyActivity], required_samples: u64) -> Self {
        let total: u64 = hourly.iter().map(|h| h.count).sum();
        if total == 0 {
            return Self::default();
        }

        let weighted: f64 = hourly.iter().map(|h| h.avg_apm * h.count as f64).sum();
        let daily_avg = weighted / total as f64;
        if daily_avg <= 0.0 {
            return Self::default();
        }

        let required = required_samples.max(1) as f64;
        let weight = (total as f64 / required).min(1.0);

        let mut efficiency = DEFAULT_CHRONOTYPE;
        for entry in hourly.iter().filter(|h| h.count > 0) {
            let hour = usize::from(entry.hour);
            if hour >= 24 {
                continue;
            }
            let learned = entry.avg_apm / daily_avg;
            efficiency[hour] = learned * weight + DEFAULT_CHRONOTYPE[hour] * (1.0 - weight);
        }

        Self {
            efficiency,
            daily_avg_apm: daily_avg,
            blend_weight: weight,
            observed_samples: total,
        }
    }

    /// Query the activity repository and build the table.
    ///
    /// Falls back to the default curve when the repository fails or has no data.
    pub fn learn(
        repository: &dyn ActivityRepository,
        since: DateTime<Utc>,
        required_samples: u64,
    ) -> Self {
        match repository.hourly_activity(since) {
            Ok(hourly) if !hourly.is_empty() => {
                let table = Self::from_activity(&hourly, required_samples);
                tracing::info!(
                    samples = table.observed_samples,
                    blend = table.blend_weight,
                    daily_avg_apm = table.daily_avg_apm,
                    "chronotype learned from activity history"
                );
                table
            }
            Ok(_) => {
                tracing::warn!("no activity history, using default chronotype");
                Self::default()
            }
            Err(e) => {
                tracing::warn!(error = %e, "activity history unavailable, using default chronotype");
                Self::default()
            }
        }
    }

    /// Efficiency factor for a local hour (0-23)
    pub fn hour_efficiency(&self, hour: u32) -> f64 {
        self.efficiency[(hour % 24) as usize]
    }

    /// Boost efficiency for a local hour, scaled by readiness
    pub fn boost_efficiency(&self, hour: u32, readiness: f64) -> f64 {
        let readiness_factor = (readiness / 75.0).clamp(READINESS_FACTOR_MIN, READINESS_FACTOR_MAX);
        self.hour_efficiency(hour) * readiness_factor
    }

    /// Weight of the learned curve (0-1)
    pub fn blend_weight(&self) -> f64 {
        self.blend_weight
    }

    /// True while the learned curve weighs less than half
    pub fn using_default(&self) -> bool {
        self.blend_weight < 0.5
    }

    pub fn daily_avg_apm(&self) -> f64 {
        self.daily_avg_apm
    }

    pub fn observed_samples(&self) -> u64 {
        self.observed_samples
    }

    pub fn efficiencies(&self) -> &[f64; 24] {
        &self.efficiency
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use chrono::TimeZone;

    struct FailingRepository;

    impl ActivityRepository for FailingRepository {
        fn hourly_activity(
            &self,
            _since: DateTime<Utc>,
        ) -> Result<Vec<HourlyActivity>, EngineError> {
            Err(EngineError::Repository("database locked".to_string()))
        }
    }

    fn hourly(hour: u8, avg_apm: f64, count: u64) -> HourlyActivity {
        HourlyActivity {
            hour,
            avg_apm,
            count,
        }
    }

    #[test]
    fn test_no_data_uses_default_curve() {
        let table = ChronotypeTable::from_activity(&[], 48);
        assert_eq!(table.efficiencies(), &DEFAULT_CHRONOTYPE);
        assert!(table.using_default());
        assert_eq!(table.hour_efficiency(11), 1.3);
    }

    #[test]
    fn test_full_weight_replaces_observed_hours() {
        // Two hours, 24 observations each: W = 1
        let table = ChronotypeTable::from_activity(&[hourly(9, 30.0, 24), hourly(14, 90.0, 24)], 48);

        assert!((table.daily_avg_apm() - 60.0).abs() < 1e-9);
        assert_eq!(table.blend_weight(), 1.0);
        assert!(!table.using_default());
        assert!((table.hour_efficiency(9) - 0.5).abs() < 1e-9);
        assert!((table.hour_efficiency(14) - 1.5).abs() < 1e-9);
        // Unobserved hours keep the default
        assert_eq!(table.hour_efficiency(3), 0.4);
    }

    #[test]
    fn test_partial_weight_blends() {
        // 12 observations: W = 0.25
        let table = ChronotypeTable::from_activity(&[hourly(10, 50.0, 12)], 48);

        assert!((table.blend_weight() - 0.25).abs() < 1e-9);
        assert!(table.using_default());
        // learned 1.0, default 1.2
        assert!((table.hour_efficiency(10) - (0.25 + 1.2 * 0.75)).abs() < 1e-9);
    }

    #[test]
    fn test_boost_efficiency_readiness_clamp() {
        let table = ChronotypeTable::default();
        assert!((table.boost_efficiency(10, 75.0) - 1.2).abs() < 1e-9);
        assert!((table.boost_efficiency(10, 100.0) - 1.2 * 1.2).abs() < 1e-9);
        assert!((table.boost_efficiency(10, 10.0) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_repository_failure_falls_back() {
        let since = Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap();
        let table = ChronotypeTable::learn(&FailingRepository, since, 48);
        assert_eq!(table, ChronotypeTable::default());
    }
}
