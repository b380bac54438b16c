//! Short-term boost energy
//!
//! Boost follows input intensity, scaled by how productive the current
//! activity state is, how much capacity today's readiness allows and how
//! cleanly the user is typing. It rises quickly and fades slowly.

use crate::types::ActivityState;

/// Scale of the target boost at full intensity, efficiency and capacity
pub const MAX_TARGET_BOOST: f64 = 50.0;

/// Easing rate applied while boost is rising
pub const BOOST_RISE_RATE: f64 = 0.15;

/// Easing rate applied while boost is falling
pub const BOOST_FALL_RATE: f64 = 0.02;

/// Boost model
pub struct BoostModel;

impl BoostModel {
    /// Input intensity within 0-1 from APM and mouse travel since the last update
    pub fn intensity(apm: f64, mouse_delta: f64) -> f64 {
        ((apm / 100.0 + mouse_delta / 5000.0) / 2.0).clamp(0.0, 1.0)
    }

    /// Boost capacity within 0-1 granted by readiness
    pub fn capacity(readiness: f64) -> f64 {
        ((readiness - 40.0) / 60.0).clamp(0.0, 1.0)
    }

    /// How much boost each activity state converts from intensity
    pub fn activity_efficiency(state: ActivityState) -> f64 {
        match state {
            ActivityState::Idle => 0.0,
            ActivityState::Light => 0.3,
            ActivityState::Moderate => 0.7,
            ActivityState::DeepDive => 1.5,
            ActivityState::Hyperfocus => 2.0,
        }
    }

    pub fn target_boost(
        intensity: f64,
        state: ActivityState,
        readiness: f64,
        correction_factor: f64,
    ) -> f64 {
        intensity
            * Self::activity_efficiency(state)
            * Self::capacity(readiness)
            * correction_factor
            * MAX_TARGET_BOOST
    }

    /// Move `current` toward `target` over `dt_seconds`.
    ///
    /// Rising is 7.5x faster than falling.
    pub fn ease(current: f64, target: f64, dt_seconds: f64) -> f64 {
        let rate = if target > current {
            BOOST_RISE_RATE
        } else {
            BOOST_FALL_RATE
        };
        let k = (rate * dt_seconds * 10.0).min(1.0);
        (current + (target - current) * k).clamp(0.0, 100.0)
    }
}
