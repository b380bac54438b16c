//! Synheart Focus - On-device Focus Point engine
//!
//! Focus models a person's mental energy ("Focus Points", FP) from keyboard and
//! mouse telemetry, heart rate and daily biometric scores. Each
//! [`BioEngine::update`] runs a fixed sequence of stages: heart-rate resolution
//! → input telemetry → stress and recovery → retroactive correction → decay,
//! boost and debt physics → snapshot.
//!
//! ## Modules
//!
//! - **Engine**: the [`BioEngine`] facade and its builder
//! - **Physics**: decay, boost, debt and recovery models
//! - **Heart rate**: shadow heart-rate prediction and retroactive correction
//! - **Collaborators**: clock, repositories and coefficient stores injected by the host

pub mod boost;
pub mod chronotype;
pub mod clock;
pub mod config;
pub mod debt;
pub mod decay;
pub mod engine;
pub mod error;
pub mod history;
pub mod hydration;
pub mod recovery;
pub mod repository;
pub mod retroactive;
pub mod shadow_hr;
pub mod status;
pub mod store;
pub mod telemetry;
pub mod trajectory;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{BioEngine, EngineBuilder};
pub use error::EngineError;
pub use repository::{ActivityRepository, HistoryRepository, InMemoryRepository, SessionCalendar};
pub use shadow_hr::ShadowCoefficients;
pub use store::{CoefficientStore, InMemoryCoefficientStore, JsonFileCoefficientStore};
pub use types::{
    ActivityState, EngineState, HealthMetrics, HeartRateSample, HrSource, Trajectory, UpdateInput,
};

/// Focus version reported by the CLI and FFI
pub const FOCUS_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI and FFI
pub const PRODUCER_NAME: &str = "synheart-focus";
