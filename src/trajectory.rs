//! Future FP trajectories
//!
//! Simulates two futures from the current engine state in 5-minute steps:
//! keep working at the current pace, or stop and rest now. Results are cached
//! for a few seconds so that dashboards polling several accessors share one
//! simulation.

use crate::debt::{DEBT_PENALTY_MULTIPLIER, MAX_DEBT};
use crate::types::{PredictionPoint, Scenario, Trajectory};
use chrono::{DateTime, Duration, Utc};
use std::cell::RefCell;

/// Simulation step in minutes
pub const STEP_MINUTES: u32 = 5;

/// Horizon searched for a recommended break
pub const BREAK_HORIZON_MINUTES: u32 = 240;

/// Horizon searched for exhaustion
pub const EXHAUSTION_HORIZON_MINUTES: u32 = 480;

/// Decay fraction that still applies while resting
const REST_DECAY_FACTOR: f64 = 0.3;

/// FP regained per hour of rest
const REST_RECOVERY_PER_HOUR: f64 = 3.0;

/// Boost retained per step while working
const CONTINUE_BOOST_RETENTION: f64 = 0.98;

/// Boost retained per step while resting
const REST_BOOST_RETENTION: f64 = 0.7;

/// Engine values the simulation starts from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryInputs {
    pub now: DateTime<Utc>,
    pub base_fp: f64,
    pub boost_fp: f64,
    pub debt: f64,
    /// Base decay rate cached at the last physics tick
    pub decay_rate: f64,
    pub work_multiplier: f64,
    pub boost_efficiency: f64,
    /// Debt repayment per second
    pub repayment_rate: f64,
}

#[derive(Debug, Clone)]
struct CachedTrajectory {
    computed_at: DateTime<Utc>,
    horizon_minutes: u32,
    trajectory: Trajectory,
}

/// Cached two-scenario simulator
#[derive(Debug)]
pub struct TrajectoryPredictor {
    ttl: Duration,
    cache: RefCell<Option<CachedTrajectory>>,
}

impl TrajectoryPredictor {
    pub fn new(ttl_seconds: f64) -> Self {
        Self {
            ttl: Duration::milliseconds((ttl_seconds * 1000.0) as i64),
            cache: RefCell::new(None),
        }
    }

    /// Predict `minutes` ahead.
    ///
    /// A cached result younger than the TTL is reused when it covers the
    /// requested horizon; it is not invalidated by state changes.
    pub fn predict(&self, inputs: &TrajectoryInputs, minutes: u32) -> Trajectory {
        if let Some(cached) = self.cache.borrow().as_ref() {
            let age = inputs.now - cached.computed_at;
            if age < self.ttl && age >= Duration::zero() && cached.horizon_minutes >= minutes {
                return truncate(&cached.trajectory, minutes);
            }
        }

        let trajectory = simulate(inputs, minutes);
        *self.cache.borrow_mut() = Some(CachedTrajectory {
            computed_at: inputs.now,
            horizon_minutes: minutes,
            trajectory: trajectory.clone(),
        });
        trajectory
    }

    pub fn invalidate(&self) {
        self.cache.borrow_mut().take();
    }
}

/// Run both scenarios without caching
pub fn simulate(inputs: &TrajectoryInputs, minutes: u32) -> Trajectory {
    let dt_hours = f64::from(STEP_MINUTES) / 60.0;
    let step_seconds = f64::from(STEP_MINUTES) * 60.0;

    let (mut base_c, mut boost_c, mut debt_c) = (inputs.base_fp, inputs.boost_fp, inputs.debt);
    let (mut base_r, mut boost_r, mut debt_r) = (inputs.base_fp, inputs.boost_fp, inputs.debt);

    let mut trajectory = Trajectory::default();
    let steps = minutes / STEP_MINUTES;
    for step in 0..=steps {
        let minute = step * STEP_MINUTES;
        if minute > 0 {
            let decay = inputs.decay_rate * inputs.work_multiplier * (1.0 + debt_c * 0.1);
            base_c *= (-decay * dt_hours).exp();
            boost_c *= CONTINUE_BOOST_RETENTION;
            debt_c = (debt_c + boost_c * 0.001 * step_seconds).min(MAX_DEBT);

            base_r *= (-inputs.decay_rate * REST_DECAY_FACTOR * dt_hours).exp();
            base_r = (base_r + REST_RECOVERY_PER_HOUR * dt_hours).min(100.0);
            boost_r *= REST_BOOST_RETENTION;
            debt_r = (debt_r - inputs.repayment_rate * step_seconds).max(0.0);
        }

        let timestamp = inputs.now + Duration::minutes(i64::from(minute));
        trajectory.continue_curve.push(PredictionPoint {
            timestamp,
            fp: effective(base_c, boost_c, debt_c, inputs.boost_efficiency),
            scenario: Scenario::Continue,
        });
        trajectory.rest_curve.push(PredictionPoint {
            timestamp,
            fp: effective(base_r, boost_r, debt_r, inputs.boost_efficiency),
            scenario: Scenario::Rest,
        });
    }
    trajectory
}

fn effective(base: f64, boost: f64, debt: f64, boost_efficiency: f64) -> f64 {
    (base + boost * boost_efficiency - debt * DEBT_PENALTY_MULTIPLIER).clamp(10.0, 100.0)
}

fn truncate(trajectory: &Trajectory, minutes: u32) -> Trajectory {
    let points = (minutes / STEP_MINUTES) as usize + 1;
    Trajectory {
        continue_curve: trajectory.continue_curve.iter().take(points).copied().collect(),
        rest_curve: trajectory.rest_curve.iter().take(points).copied().collect(),
    }
}

/// First point of the continue curve below `threshold`
pub fn first_below(trajectory: &Trajectory, threshold: f64) -> Option<DateTime<Utc>> {
    trajectory
        .continue_curve
        .iter()
        .find(|p| p.fp < threshold)
        .map(|p| p.timestamp)
}

/// Earlier of the hydration deadline and the moment FP drops below the break threshold
pub fn recommended_break_time(
    trajectory: &Trajectory,
    now: DateTime<Utc>,
    last_break: DateTime<Utc>,
    hydration_interval_minutes: i64,
    break_threshold: f64,
) -> DateTime<Utc> {
    let hydration_limit = last_break + Duration::minutes(hydration_interval_minutes);
    let fp_limit = first_below(trajectory, break_threshold)
        .unwrap_or_else(|| now + Duration::minutes(i64::from(BREAK_HORIZON_MINUTES)));
    hydration_limit.min(fp_limit)
}

/// Moment FP drops below the exhaustion threshold, or the end of the horizon
pub fn exhaustion_time(
    trajectory: &Trajectory,
    now: DateTime<Utc>,
    exhaustion_threshold: f64,
) -> DateTime<Utc> {
    first_below(trajectory, exhaustion_threshold)
        .unwrap_or_else(|| now + Duration::minutes(i64::from(EXHAUSTION_HORIZON_MINUTES)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
    }

    fn inputs(now: DateTime<Utc>, base: f64) -> TrajectoryInputs {
        TrajectoryInputs {
            now,
            base_fp: base,
            boost_fp: 0.0,
            debt: 0.0,
            decay_rate: 0.07,
            work_multiplier: 1.0,
            boost_efficiency: 1.0,
            repayment_rate: 0.002,
        }
    }

    #[test]
    fn test_point_count_and_spacing() {
        let trajectory = simulate(&inputs(t0(), 70.0), 60);

        assert_eq!(trajectory.continue_curve.len(), 13);
        assert_eq!(trajectory.rest_curve.len(), 13);
        assert_eq!(trajectory.continue_curve[0].fp, 70.0);
        assert_eq!(
            trajectory.continue_curve[12].timestamp,
            t0() + Duration::minutes(60)
        );
        assert_eq!(trajectory.rest_curve[3].scenario, Scenario::Rest);
    }

    #[test]
    fn test_rest_beats_continue() {
        let mut start = inputs(t0(), 60.0);
        start.boost_fp = 20.0;
        start.debt = 2.0;
        start.work_multiplier = 1.5;
        let trajectory = simulate(&start, 240);

        let last_continue = trajectory.continue_curve.last().unwrap().fp;
        let last_rest = trajectory.rest_curve.last().unwrap().fp;
        assert!(last_rest > last_continue);
    }

    #[test]
    fn test_continue_decay_one_hour() {
        let trajectory = simulate(&inputs(t0(), 70.0), 60);
        let expected = 70.0 * (-0.07_f64).exp();
        assert!((trajectory.continue_curve[12].fp - expected).abs() < 1e-6);
    }

    #[test]
    fn test_cache_within_ttl() {
        let predictor = TrajectoryPredictor::new(5.0);
        let first = predictor.predict(&inputs(t0(), 70.0), 240);

        // State changed, but the cached result is still served
        let later = t0() + Duration::seconds(3);
        let second = predictor.predict(&inputs(later, 40.0), 240);
        assert_eq!(first, second);

        let shorter = predictor.predict(&inputs(later, 40.0), 60);
        assert_eq!(shorter.continue_curve.len(), 13);
        assert_eq!(shorter.continue_curve[..], first.continue_curve[..13]);
    }

    #[test]
    fn test_cache_expires_and_longer_horizon_recomputes() {
        let predictor = TrajectoryPredictor::new(5.0);
        let first = predictor.predict(&inputs(t0(), 70.0), 60);

        let longer = predictor.predict(&inputs(t0() + Duration::seconds(1), 40.0), 120);
        assert_eq!(longer.continue_curve.len(), 25);
        assert_eq!(longer.continue_curve[0].fp, 40.0);

        let expired = predictor.predict(&inputs(t0() + Duration::seconds(7), 50.0), 120);
        assert_ne!(expired, first);
        assert_eq!(expired.continue_curve[0].fp, 50.0);
    }

    #[test]
    fn test_break_time_prefers_hydration() {
        let trajectory = simulate(&inputs(t0(), 90.0), BREAK_HORIZON_MINUTES);
        let last_break = t0() - Duration::minutes(30);

        let at = recommended_break_time(&trajectory, t0(), last_break, 90, 20.0);
        assert_eq!(at, t0() + Duration::minutes(60));
    }

    #[test]
    fn test_break_time_when_fp_low() {
        let trajectory = simulate(&inputs(t0(), 15.0), BREAK_HORIZON_MINUTES);
        let at = recommended_break_time(&trajectory, t0(), t0(), 90, 20.0);
        assert_eq!(at, t0());
    }

    #[test]
    fn test_exhaustion_default_horizon() {
        let trajectory = simulate(&inputs(t0(), 90.0), EXHAUSTION_HORIZON_MINUTES);
        assert_eq!(
            exhaustion_time(&trajectory, t0(), 10.0),
            t0() + Duration::hours(8)
        );
    }
}
