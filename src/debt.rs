//! Fatigue debt
//!
//! Running on boost borrows energy. Debt accumulates while boost is high and
//! is repaid while boost is low, at a rate set by readiness and sleep quality.

use serde::{Deserialize, Serialize};

/// Upper bound of the debt ledger
pub const MAX_DEBT: f64 = 10.0;

/// FP subtracted per unit of debt
pub const DEBT_PENALTY_MULTIPLIER: f64 = 3.0;

/// Debt accrued per boost point per second
pub const DEBT_ACCUMULATION_RATE: f64 = 0.001;

/// Repayment per second at readiness 80 and sleep score 75
pub const BASE_REPAYMENT_RATE: f64 = 0.002;

/// Boost above which debt accrues
pub const ACCUMULATE_ABOVE_BOOST: f64 = 5.0;

/// Boost below which debt is repaid
pub const REPAY_BELOW_BOOST: f64 = 2.0;

/// Bounded fatigue debt
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DebtLedger {
    value: f64,
}

impl DebtLedger {
    pub fn new(value: f64) -> Self {
        Self {
            value: value.clamp(0.0, MAX_DEBT),
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Repayment per second for the given biometrics
    pub fn dynamic_repayment_rate(readiness: f64, sleep_score: f64) -> f64 {
        BASE_REPAYMENT_RATE * (readiness / 80.0) * (sleep_score / 75.0)
    }

    /// Advance the ledger by `dt_seconds` at the given boost level.
    ///
    /// Between the two boost thresholds debt is left untouched.
    pub fn step(&mut self, boost: f64, dt_seconds: f64, hr_stress: f64, repayment_rate: f64) {
        if boost > ACCUMULATE_ABOVE_BOOST {
            self.value += boost * DEBT_ACCUMULATION_RATE * dt_seconds * hr_stress;
        } else if boost < REPAY_BELOW_BOOST {
            let stress = if hr_stress > 0.0 { hr_stress } else { 1.0 };
            self.value -= repayment_rate * dt_seconds / stress;
        }
        self.value = self.value.clamp(0.0, MAX_DEBT);
    }

    /// FP withheld from effective energy
    pub fn penalty(&self) -> f64 {
        self.value * DEBT_PENALTY_MULTIPLIER
    }
}
