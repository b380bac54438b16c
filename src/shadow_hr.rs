//! Shadow heart rate
//!
//! When the wearable stops reporting, the engine still needs a heart rate for
//! its stress factor. The shadow predictor estimates one from input activity
//! and continuous work time, and learns its coefficients online whenever a
//! real sample arrives for a moment it had to estimate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Offset added to the baseline before activity terms
pub const ACTIVE_HR_OFFSET: f64 = 10.0;

/// Physiological bounds of a predicted heart rate
pub const MIN_PREDICTED_HR: u32 = 45;
pub const MAX_PREDICTED_HR: u32 = 180;

/// Base learning rate for coefficient updates
pub const LEARNING_RATE: f64 = 0.001;

/// Length of the rolling prediction error history
pub const ERROR_HISTORY_LEN: usize = 10;

pub const ALPHA_BOUNDS: (f64, f64) = (0.01, 0.5);
pub const BETA_BOUNDS: (f64, f64) = (0.001, 0.1);
pub const GAMMA_BOUNDS: (f64, f64) = (0.01, 0.2);

/// Learned coefficients of the shadow heart-rate model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowCoefficients {
    /// BPM per APM
    pub alpha: f64,
    /// BPM per px/sec of mouse speed
    pub beta: f64,
    /// Cardiac drift per work hour, before the drift scale
    pub gamma: f64,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for ShadowCoefficients {
    fn default() -> Self {
        Self {
            alpha: 0.10,
            beta: 0.02,
            gamma: 0.05,
            last_updated: None,
        }
    }
}

impl ShadowCoefficients {
    /// Coefficients forced into their bounds
    pub fn clamped(mut self) -> Self {
        self.alpha = clamp_finite(self.alpha, ALPHA_BOUNDS, 0.10);
        self.beta = clamp_finite(self.beta, BETA_BOUNDS, 0.02);
        self.gamma = clamp_finite(self.gamma, GAMMA_BOUNDS, 0.05);
        self
    }
}

fn clamp_finite(value: f64, bounds: (f64, f64), fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(bounds.0, bounds.1)
    } else {
        fallback
    }
}

/// Read-only view of the predictor for health metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientReport {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub error_history: Vec<f64>,
    pub mean_error: f64,
}

/// Result of one learning step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningOutcome {
    /// Actual minus predicted BPM
    pub error: f64,
    pub alpha_delta: f64,
    pub beta_delta: f64,
    pub gamma_delta: f64,
    pub coefficients: ShadowCoefficients,
    pub mean_error: f64,
}

impl LearningOutcome {
    pub fn changed(&self) -> bool {
        self.alpha_delta != 0.0 || self.beta_delta != 0.0 || self.gamma_delta != 0.0
    }
}

/// Online-learning heart-rate estimator
#[derive(Debug, Clone)]
pub struct ShadowHeartRatePredictor {
    coefficients: ShadowCoefficients,
    drift_scale: f64,
    errors: VecDeque<f64>,
}

impl ShadowHeartRatePredictor {
    pub fn new(coefficients: ShadowCoefficients, drift_scale: f64) -> Self {
        Self {
            coefficients: coefficients.clamped(),
            drift_scale,
            errors: VecDeque::with_capacity(ERROR_HISTORY_LEN),
        }
    }

    /// Estimate heart rate from activity
    pub fn predict(&self, base_hr: u32, apm: f64, mouse_speed: f64, work_hours: f64) -> u32 {
        let c = &self.coefficients;
        let raw = base_hr as f64
            + ACTIVE_HR_OFFSET
            + apm * c.alpha
            + mouse_speed * c.beta
            + work_hours * c.gamma * self.drift_scale;
        let raw = if raw.is_finite() { raw.trunc() } else { base_hr as f64 };
        raw.clamp(MIN_PREDICTED_HR as f64, MAX_PREDICTED_HR as f64) as u32
    }

    /// Nudge coefficients toward the observed heart rate.
    ///
    /// A coefficient only moves when its input signal was present.
    pub fn learn(
        &mut self,
        actual: u32,
        predicted: u32,
        apm: f64,
        mouse_speed: f64,
        work_hours: f64,
    ) -> LearningOutcome {
        let error = actual as f64 - predicted as f64;
        let before = self.coefficients.clone();

        if apm > 0.0 {
            let weight = if apm > 50.0 { 1.0 } else { 0.5 };
            self.coefficients.alpha = (self.coefficients.alpha + error * LEARNING_RATE * weight)
                .clamp(ALPHA_BOUNDS.0, ALPHA_BOUNDS.1);
        }
        if mouse_speed > 0.0 {
            let weight = if mouse_speed > 100.0 { 1.0 } else { 0.5 };
            self.coefficients.beta = (self.coefficients.beta + error * LEARNING_RATE * weight)
                .clamp(BETA_BOUNDS.0, BETA_BOUNDS.1);
        }
        if work_hours > 0.0 {
            let weight = if work_hours > 1.0 { 1.0 } else { 0.5 };
            self.coefficients.gamma = (self.coefficients.gamma + error * LEARNING_RATE * weight)
                .clamp(GAMMA_BOUNDS.0, GAMMA_BOUNDS.1);
        }

        self.errors.push_back(error);
        while self.errors.len() > ERROR_HISTORY_LEN {
            self.errors.pop_front();
        }

        let outcome = LearningOutcome {
            error,
            alpha_delta: self.coefficients.alpha - before.alpha,
            beta_delta: self.coefficients.beta - before.beta,
            gamma_delta: self.coefficients.gamma - before.gamma,
            coefficients: self.coefficients.clone(),
            mean_error: self.mean_error(),
        };
        tracing::debug!(
            error,
            alpha = self.coefficients.alpha,
            beta = self.coefficients.beta,
            gamma = self.coefficients.gamma,
            "shadow heart rate learning step"
        );
        outcome
    }

    pub fn set_last_updated(&mut self, at: DateTime<Utc>) {
        self.coefficients.last_updated = Some(at);
    }

    pub fn coefficients(&self) -> &ShadowCoefficients {
        &self.coefficients
    }

    /// Mean absolute error over the rolling history
    pub fn mean_error(&self) -> f64 {
        if self.errors.is_empty() {
            return 0.0;
        }
        self.errors.iter().map(|e| e.abs()).sum::<f64>() / self.errors.len() as f64
    }

    pub fn error_history(&self) -> impl Iterator<Item = f64> + '_ {
        self.errors.iter().copied()
    }

    pub fn report(&self) -> CoefficientReport {
        CoefficientReport {
            alpha: self.coefficients.alpha,
            beta: self.coefficients.beta,
            gamma: self.coefficients.gamma,
            error_history: self.errors.iter().copied().collect(),
            mean_error: self.mean_error(),
        }
    }
}
