//! Status code derivation
//!
//! Maps the engine state to a short code and a human-readable message. The
//! first matching rule wins.

use crate::types::ActivityState;
use serde::{Deserialize, Serialize};

/// Engine values consulted by the status rules
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusInputs {
    pub relaxation_session_active: bool,
    pub recovery_ceiling: f64,
    pub continuous_work_hours: f64,
    pub minutes_since_break: f64,
    pub hydration_interval_minutes: f64,
    pub effective_fp: f64,
    pub current_load: f64,
    pub activity_state: ActivityState,
    pub boost_fp: f64,
    pub debt: f64,
    pub estimated_readiness: f64,
}

/// Status codes in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    RelaxationSession,
    BiologicalCritical,
    ExtendedOperation,
    HydrationRequired,
    CriticalCondition,
    ResourceDepleted,
    HighLoadWarning,
    CautionAdvised,
    HyperfocusMode,
    DeepDiveActive,
    OptimalState,
    NeuralLinkActive,
    SystemNominal,
}

impl StatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::RelaxationSession => "RELAXATION SESSION",
            StatusCode::BiologicalCritical => "BIOLOGICAL CRITICAL",
            StatusCode::ExtendedOperation => "EXTENDED OPERATION",
            StatusCode::HydrationRequired => "HYDRATION REQUIRED",
            StatusCode::CriticalCondition => "CRITICAL CONDITION",
            StatusCode::ResourceDepleted => "RESOURCE DEPLETED",
            StatusCode::HighLoadWarning => "HIGH LOAD WARNING",
            StatusCode::CautionAdvised => "CAUTION ADVISED",
            StatusCode::HyperfocusMode => "HYPERFOCUS MODE",
            StatusCode::DeepDiveActive => "DEEP DIVE ACTIVE",
            StatusCode::OptimalState => "OPTIMAL STATE",
            StatusCode::NeuralLinkActive => "NEURAL LINK ACTIVE",
            StatusCode::SystemNominal => "SYSTEM NOMINAL",
        }
    }
}

/// Pick the status code and message for the given state
pub fn derive_status(inputs: &StatusInputs) -> (StatusCode, String) {
    let state = inputs.activity_state.label();

    if inputs.relaxation_session_active {
        return (
            StatusCode::RelaxationSession,
            "Relaxation session in progress.".to_string(),
        );
    }
    if inputs.recovery_ceiling < 40.0 {
        return (
            StatusCode::BiologicalCritical,
            format!(
                "Biological limit reached. Ceiling {:.0}. Rest required.",
                inputs.recovery_ceiling
            ),
        );
    }
    if inputs.continuous_work_hours >= 4.0 {
        return (
            StatusCode::ExtendedOperation,
            format!("4h+ continuous work. Break advised. Debt: {:.1}", inputs.debt),
        );
    }
    if inputs.minutes_since_break >= inputs.hydration_interval_minutes {
        return (
            StatusCode::HydrationRequired,
            format!(
                "{:.0} minutes since last break. Hydrate.",
                inputs.hydration_interval_minutes
            ),
        );
    }

    let fp = inputs.effective_fp;
    if fp < 15.0 {
        (
            StatusCode::CriticalCondition,
            "Severe resource depletion. Rest immediately.".to_string(),
        )
    } else if fp < 30.0 {
        (
            StatusCode::ResourceDepleted,
            format!("Resources depleted. Debt: {:.1}", inputs.debt),
        )
    } else if inputs.current_load > 0.8 {
        (
            StatusCode::HighLoadWarning,
            format!("High load. LOAD: {}%", (inputs.current_load * 100.0) as i64),
        )
    } else if fp < 50.0 {
        (
            StatusCode::CautionAdvised,
            format!("Resources declining. {}", state),
        )
    } else if inputs.activity_state == ActivityState::Hyperfocus {
        (
            StatusCode::HyperfocusMode,
            format!("Peak efficiency. Boost: {:.1}", inputs.boost_fp),
        )
    } else if inputs.activity_state == ActivityState::DeepDive {
        (
            StatusCode::DeepDiveActive,
            format!("Focused. Boost: {:.1}", inputs.boost_fp),
        )
    } else if fp >= 80.0 {
        (StatusCode::OptimalState, format!("Optimal. {}", state))
    } else if inputs.estimated_readiness >= 70.0 {
        (
            StatusCode::NeuralLinkActive,
            "System stable.".to_string(),
        )
    } else {
        (StatusCode::SystemNominal, format!("Nominal. {}", state))
    }
}
