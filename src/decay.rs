//! Base energy decay
//!
//! Base FP decays exponentially. The hourly rate is bucketed by readiness and
//! adjusted by sleep quality, then scaled by continuous work duration, fatigue
//! debt, heart-rate stress and typing friction.

/// Base energy never decays below this floor
pub const BASE_FP_FLOOR: f64 = 5.0;

/// Continuous-work thresholds (hours) and their decay multipliers
pub const WORK_DECAY_MULTIPLIERS: [(f64, f64); 4] = [(2.0, 1.2), (3.0, 1.5), (4.0, 1.8), (5.0, 2.0)];

/// Readiness bucket selecting the hourly decay rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecayBucket {
    High,
    Mid,
    Low,
    Critical,
}

impl DecayBucket {
    pub fn for_readiness(readiness: i32) -> Self {
        if readiness >= 85 {
            DecayBucket::High
        } else if readiness >= 60 {
            DecayBucket::Mid
        } else if readiness >= 40 {
            DecayBucket::Low
        } else {
            DecayBucket::Critical
        }
    }

    /// Fraction of base energy lost per hour
    pub fn hourly_rate(&self) -> f64 {
        match self {
            DecayBucket::High => 0.04,
            DecayBucket::Mid => 0.07,
            DecayBucket::Low => 0.12,
            DecayBucket::Critical => 0.18,
        }
    }
}

/// Terms multiplied into the effective decay rate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayTerms {
    pub base_rate: f64,
    pub work_multiplier: f64,
    pub debt_multiplier: f64,
    pub hr_stress_factor: f64,
    pub friction_multiplier: f64,
}

impl DecayTerms {
    pub fn effective_rate(&self) -> f64 {
        self.base_rate
            * self.work_multiplier
            * self.debt_multiplier
            * self.hr_stress_factor
            * self.friction_multiplier
    }
}

/// Decay rate model
pub struct DecayModel;

impl DecayModel {
    /// Hourly base decay rate for the given readiness and sleep score
    pub fn decay_rate(readiness: i32, sleep_score: i32) -> f64 {
        let mut rate = DecayBucket::for_readiness(readiness).hourly_rate();
        if sleep_score < 70 {
            rate *= 1.2;
        } else if sleep_score > 85 {
            rate *= 0.9;
        }
        rate
    }

    /// Step multiplier for continuous work time
    pub fn work_duration_multiplier(continuous_work_hours: f64) -> f64 {
        WORK_DECAY_MULTIPLIERS
            .iter()
            .rev()
            .find(|(hours, _)| continuous_work_hours >= *hours)
            .map(|(_, multiplier)| *multiplier)
            .unwrap_or(1.0)
    }

    pub fn debt_multiplier(debt: f64) -> f64 {
        1.0 + debt * 0.1
    }

    /// Typing friction: more corrections mean faster decay
    pub fn friction_multiplier(correction_factor: f64) -> f64 {
        1.0 + (1.0 - correction_factor) * 2.0
    }

    /// Heart-rate stress factor within 1-3.
    ///
    /// Returns 1.0 when there is no heart rate or no usable baseline.
    pub fn hr_stress_factor(effective_hr: Option<u32>, baseline_hr: u32) -> f64 {
        match effective_hr {
            Some(hr) if baseline_hr > 0 => {
                let ratio = hr as f64 / baseline_hr as f64;
                (1.0 + (ratio - 1.0) * 2.0).clamp(1.0, 3.0)
            }
            _ => 1.0,
        }
    }

    /// Correction factor from backspaces relative to APM, within 0.5-1
    pub fn correction_factor(apm: f64, backspaces: u64) -> f64 {
        if apm <= 0.0 {
            return 1.0;
        }
        let ratio = backspaces as f64 / apm;
        (1.0 - ratio * 2.0).max(0.5)
    }

    /// Apply `dt_hours` of decay to base energy
    pub fn step_base(base_fp: f64, effective_rate: f64, dt_hours: f64) -> f64 {
        (base_fp * (-effective_rate * dt_hours).exp()).max(BASE_FP_FLOOR)
    }
}
