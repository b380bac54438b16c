//! Recovery physiology
//!
//! How far and how fast base energy can recover. The recovery ceiling caps
//! base FP after short sleep, poor sleep or a long day. Recovery efficiency
//! falls as FP, stress and debt rise, and scales naps and phantom recovery.

use serde::{Deserialize, Serialize};

/// Heart rate used as the top of the heart-rate reserve
pub const MAX_HEART_RATE: f64 = 190.0;

/// EMA coefficient of the stress index
pub const STRESS_EMA_ALPHA: f64 = 0.1;

/// Stress retained per fully idle update
pub const IDLE_STRESS_RETENTION: f64 = 0.95;

/// A nap at least this long counts as a full sleep
pub const DEEP_SLEEP_MINUTES: f64 = 180.0;

/// FP per nap minute at full recovery efficiency
pub const NAP_RECOVERY_RATE: f64 = 1.0;

/// FP per phantom recovery unit at full recovery efficiency
pub const PHANTOM_RECOVERY_RATE: f64 = 0.5;

/// Lowest possible recovery ceiling
pub const MIN_CEILING: f64 = 20.0;

/// Hours awake after which the ceiling starts to sink
const UPTIME_LIMIT_HOURS: f64 = 16.0;

/// Upper bound base FP can recover to
pub fn recovery_ceiling(
    main_sleep_seconds: Option<u32>,
    sleep_score: f64,
    hours_since_wake: f64,
) -> f64 {
    let quantity = match main_sleep_seconds {
        Some(s) if s < 3 * 3600 => 0.5,
        Some(s) if s < 5 * 3600 => 0.7,
        _ => 1.0,
    };
    let quality = if sleep_score < 60.0 { 0.8 } else { 1.0 };
    let uptime = if hours_since_wake > UPTIME_LIMIT_HOURS {
        0.95_f64.powf(hours_since_wake - UPTIME_LIMIT_HOURS)
    } else {
        1.0
    };
    (100.0 * quantity * quality * uptime).max(MIN_CEILING)
}

/// Pull base FP toward the ceiling when it is above it
pub fn apply_ceiling_gravity(base_fp: f64, ceiling: f64, dt_seconds: f64) -> f64 {
    if base_fp <= ceiling {
        return base_fp;
    }
    let gravity = (base_fp - ceiling) * 0.5 * dt_seconds;
    (base_fp - gravity).max(ceiling)
}

/// Signals feeding one stress update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StressSignals {
    pub heart_rate: Option<u32>,
    pub baseline_hr: u32,
    pub apm: f64,
    pub mouse_speed: f64,
    pub debt: f64,
    pub correction_rate: f64,
}

/// Smoothed stress index within 0-100
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StressIndex {
    value: f64,
}

impl StressIndex {
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Instantaneous stress before smoothing
    pub fn raw(signals: &StressSignals) -> f64 {
        let rhr = f64::from(signals.baseline_hr);
        let hr = signals.heart_rate.map(f64::from).unwrap_or(rhr);
        let reserve = MAX_HEART_RATE - rhr;
        let hrr = if reserve > 0.0 {
            ((hr - rhr) / reserve).max(0.0)
        } else {
            0.0
        };

        let hr_stress = 50.0 * (3.0 * hrr).tanh();
        let work_norm = 0.6 * (signals.apm / 100.0) + 0.4 * (signals.mouse_speed / 1000.0);
        let work_stress = 40.0 * (1.0 - (-2.0 * work_norm).exp());
        let imbalance = 10.0 * (work_norm - hrr).abs() * (1.0 + signals.debt / 5.0);
        let friction = signals.correction_rate * 100.0;

        (hr_stress + work_stress + imbalance + friction).min(100.0)
    }

    pub fn update(&mut self, signals: &StressSignals) {
        self.value = STRESS_EMA_ALPHA * Self::raw(signals) + (1.0 - STRESS_EMA_ALPHA) * self.value;
    }

    /// Let stress fade while the user is fully idle
    pub fn relax(&mut self) {
        self.value *= IDLE_STRESS_RETENTION;
    }
}

/// How effectively rest converts into FP, within 0.01-1
pub fn recovery_efficiency(effective_fp: f64, stress: f64, debt: f64) -> f64 {
    let headroom = (1.0 - effective_fp / 100.0).max(0.0).powf(1.5);
    let inertia = (-0.02 * stress).exp();
    let debt_factor = 1.0 / (1.0 + debt / 5.0);
    (headroom * inertia * debt_factor).max(0.01)
}

/// Base FP after `nap_minutes` of new nap time
pub fn apply_nap(
    base_fp: f64,
    nap_minutes: f64,
    readiness: f64,
    efficiency: f64,
    ceiling: f64,
) -> f64 {
    if nap_minutes <= 0.0 {
        return base_fp;
    }
    if nap_minutes >= DEEP_SLEEP_MINUTES {
        let rested = (readiness * 0.7 + 30.0).min(ceiling).max(50.0);
        return base_fp.max(rested);
    }
    add_below_ceiling(base_fp, nap_minutes * NAP_RECOVERY_RATE * efficiency, ceiling)
}

/// Base FP after `amount` of new phantom recovery
pub fn apply_phantom(base_fp: f64, amount: f64, efficiency: f64, ceiling: f64) -> f64 {
    if amount <= 0.0 {
        return base_fp;
    }
    add_below_ceiling(base_fp, amount * PHANTOM_RECOVERY_RATE * efficiency, ceiling)
}

/// Recovery never lifts base FP above the ceiling, nor pushes it down to it
fn add_below_ceiling(base_fp: f64, gain: f64, ceiling: f64) -> f64 {
    if base_fp >= ceiling {
        return base_fp;
    }
    (base_fp + gain).min(ceiling)
}
