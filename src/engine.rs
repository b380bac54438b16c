//! BioEngine facade
//!
//! This module provides the public API for Synheart Focus. [`BioEngine`] owns
//! all simulation state and advances it once per [`BioEngine::update`] call.
//! Everything else is a read-only view of that state.

use crate::boost::BoostModel;
use crate::chronotype::ChronotypeTable;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::debt::{DebtLedger, DEBT_PENALTY_MULTIPLIER};
use crate::decay::{DecayModel, DecayTerms};
use crate::error::EngineError;
use crate::history::{HistoryBuffer, HistorySnapshot};
use crate::hydration::{hydrate, HydrationReport};
use crate::recovery::{self, StressIndex, StressSignals};
use crate::repository::{ActivityRepository, HistoryRepository, SessionCalendar};
use crate::retroactive::{CorrectionInputs, CorrectionReport, RetroactiveCorrector};
use crate::shadow_hr::{LearningOutcome, ShadowCoefficients, ShadowHeartRatePredictor};
use crate::status::{derive_status, StatusInputs};
use crate::store::{CoefficientStore, InMemoryCoefficientStore};
use crate::telemetry::{MonotonicTotal, TelemetryAccumulator, TelemetryDelta};
use crate::trajectory::{
    self, TrajectoryInputs, TrajectoryPredictor, BREAK_HORIZON_MINUTES,
    EXHAUSTION_HORIZON_MINUTES,
};
use crate::types::{
    ActivityState, BiometricRefresh, EngineState, FpBreakdown, HealthMetrics, HeartRateSample,
    Trajectory, UpdateInput,
};
use chrono::{DateTime, Duration, Timelike, Utc};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Continuous work threshold in APM
pub const ACTIVE_APM_THRESHOLD: f64 = 10.0;

/// A wake-time change of at least this many hours starts a new day
pub const MORNING_RESET_HOURS: f64 = 4.0;

/// Base FP regained per second during a relaxation session
pub const RELAXATION_RECOVERY_PER_SECOND: f64 = 0.0083;

/// Fraction of the gap to baseline an idle estimated heart rate closes per update
const IDLE_HR_RELAXATION: f64 = 0.05;

/// Scroll steps in the rolling window that add a full point of intensity
const SCROLL_INTENSITY_FACTOR: f64 = 0.01;

/// Maximum intensity contributed by scrolling
const MAX_SCROLL_INTENSITY: f64 = 0.3;

/// FP at the moment of waking
pub fn initial_fp(readiness: f64, sleep_score: f64) -> f64 {
    (readiness * 0.7 + sleep_score * 0.3).clamp(10.0, 100.0)
}

/// Builder for [`BioEngine`].
///
/// Every collaborator is optional. Without repositories the engine starts from
/// the default chronotype and skips hydration.
pub struct EngineBuilder {
    readiness: u8,
    sleep_score: u8,
    wake_time: Option<DateTime<Utc>>,
    baseline_hr: Option<u32>,
    main_sleep_seconds: Option<u32>,
    config: EngineConfig,
    clock: Box<dyn Clock>,
    history_repository: Option<Box<dyn HistoryRepository>>,
    activity_repository: Option<Box<dyn ActivityRepository>>,
    session_calendar: Option<Box<dyn SessionCalendar>>,
    coefficient_store: Box<dyn CoefficientStore>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            readiness: 75,
            sleep_score: 75,
            wake_time: None,
            baseline_hr: None,
            main_sleep_seconds: None,
            config: EngineConfig::default(),
            clock: Box::new(SystemClock),
            history_repository: None,
            activity_repository: None,
            session_calendar: None,
            coefficient_store: Box::new(InMemoryCoefficientStore::new()),
        }
    }

    /// Readiness score, clamped to 0-100
    pub fn readiness(mut self, readiness: i32) -> Self {
        self.readiness = clamp_score(readiness);
        self
    }

    /// Sleep score, clamped to 0-100
    pub fn sleep_score(mut self, sleep_score: i32) -> Self {
        self.sleep_score = clamp_score(sleep_score);
        self
    }

    /// Wake time, defaults to eight hours before construction
    pub fn wake_time(mut self, wake_time: DateTime<Utc>) -> Self {
        self.wake_time = Some(wake_time);
        self
    }

    pub fn baseline_hr(mut self, baseline_hr: u32) -> Self {
        self.baseline_hr = Some(baseline_hr);
        self
    }

    pub fn main_sleep_seconds(mut self, seconds: u32) -> Self {
        self.main_sleep_seconds = Some(seconds);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn history_repository(mut self, repository: impl HistoryRepository + 'static) -> Self {
        self.history_repository = Some(Box::new(repository));
        self
    }

    pub fn activity_repository(mut self, repository: impl ActivityRepository + 'static) -> Self {
        self.activity_repository = Some(Box::new(repository));
        self
    }

    pub fn session_calendar(mut self, calendar: impl SessionCalendar + 'static) -> Self {
        self.session_calendar = Some(Box::new(calendar));
        self
    }

    pub fn coefficient_store(mut self, store: impl CoefficientStore + 'static) -> Self {
        self.coefficient_store = Box::new(store);
        self
    }

    /// Validate the configuration and construct the engine.
    ///
    /// Collaborator failures during construction are logged and fall back to
    /// defaults; only an invalid configuration is an error.
    pub fn build(self) -> Result<BioEngine, EngineError> {
        self.config.validate()?;
        Ok(BioEngine::from_builder(self))
    }
}

fn clamp_score(value: i32) -> u8 {
    value.clamp(0, 100) as u8
}

/// Focus Point simulator
pub struct BioEngine {
    instance_id: Uuid,
    config: EngineConfig,
    clock: Box<dyn Clock>,
    history_repository: Option<Box<dyn HistoryRepository>>,
    session_calendar: Option<Box<dyn SessionCalendar>>,
    coefficient_store: Box<dyn CoefficientStore>,

    // Biometrics
    readiness: u8,
    sleep_score: u8,
    wake_time: DateTime<Utc>,
    baseline_hr: u32,
    main_sleep_seconds: Option<u32>,
    hours_since_wake: f64,

    // Energy
    base_fp: f64,
    boost_fp: f64,
    target_boost_fp: f64,
    debt: DebtLedger,
    current_load: f64,
    activity_state: ActivityState,
    correction_factor: f64,
    cached_decay_rate: f64,
    cached_boost_efficiency: f64,

    // Realtime readiness
    estimated_readiness: f64,
    readiness_offset: f64,
    cumulative_hr_deviation: f64,
    cumulative_load: f64,

    // Work and breaks
    work_start: Option<DateTime<Utc>>,
    last_active: Option<DateTime<Utc>>,
    continuous_work_hours: f64,
    idle_start: Option<DateTime<Utc>>,
    continuous_idle_seconds: f64,
    last_break: DateTime<Utc>,

    // Input telemetry
    telemetry: TelemetryAccumulator,
    nap_total: MonotonicTotal,
    phantom_total: MonotonicTotal,
    relaxation_session_active: bool,

    // Heart rate
    current_hr: Option<u32>,
    estimated_hr: Option<u32>,
    is_hr_estimated: bool,
    hr_last_update: Option<DateTime<Utc>>,
    shadow_hr: ShadowHeartRatePredictor,
    learned_snapshots: BTreeSet<DateTime<Utc>>,

    // Recovery physiology
    stress: StressIndex,
    recovery_efficiency: f64,

    // Time keeping
    last_update: DateTime<Utc>,
    physics_accumulated_seconds: f64,
    last_retroactive_check: DateTime<Utc>,

    chronotype: ChronotypeTable,
    corrector: RetroactiveCorrector,
    trajectory: TrajectoryPredictor,
    history: HistoryBuffer,
    latest: Option<EngineState>,
    hydration: Option<HydrationReport>,
}

impl BioEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    fn from_builder(builder: EngineBuilder) -> Self {
        let EngineBuilder {
            readiness,
            sleep_score,
            wake_time,
            baseline_hr,
            main_sleep_seconds,
            config,
            clock,
            history_repository,
            activity_repository,
            session_calendar,
            coefficient_store,
        } = builder;

        let now = clock.now();
        let wake_time = wake_time.unwrap_or(now - Duration::hours(8));
        let hours_since_wake = hours_between(wake_time, now).max(0.0);

        let decay_rate = DecayModel::decay_rate(i32::from(readiness), i32::from(sleep_score));
        let start_fp = initial_fp(f64::from(readiness), f64::from(sleep_score));
        let base_fp = (start_fp * (-decay_rate * hours_since_wake).exp()).clamp(10.0, 100.0);

        let chronotype = match &activity_repository {
            Some(repository) => ChronotypeTable::learn(
                repository.as_ref(),
                now - Duration::days(config.chronotype_lookback_days),
                config.chronotype_required_samples,
            ),
            None => ChronotypeTable::default(),
        };

        let coefficients = match coefficient_store.load() {
            Ok(Some(coefficients)) => coefficients,
            Ok(None) => ShadowCoefficients::default(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to load shadow coefficients, using defaults");
                ShadowCoefficients::default()
            }
        };
        let shadow_hr = ShadowHeartRatePredictor::new(coefficients, config.cardiac_drift_scale);

        let mut engine = Self {
            instance_id: Uuid::new_v4(),
            clock,
            history_repository,
            session_calendar,
            coefficient_store,
            readiness,
            sleep_score,
            wake_time,
            baseline_hr: baseline_hr.unwrap_or(config.default_baseline_hr),
            main_sleep_seconds,
            hours_since_wake,
            base_fp,
            boost_fp: 0.0,
            target_boost_fp: 0.0,
            debt: DebtLedger::default(),
            current_load: 0.0,
            activity_state: ActivityState::Idle,
            correction_factor: 1.0,
            cached_decay_rate: decay_rate,
            cached_boost_efficiency: 1.0,
            estimated_readiness: f64::from(readiness),
            readiness_offset: 0.0,
            cumulative_hr_deviation: 0.0,
            cumulative_load: 0.0,
            work_start: None,
            last_active: None,
            continuous_work_hours: 0.0,
            idle_start: None,
            continuous_idle_seconds: 0.0,
            last_break: now,
            telemetry: TelemetryAccumulator::new(),
            nap_total: MonotonicTotal::default(),
            phantom_total: MonotonicTotal::default(),
            relaxation_session_active: false,
            current_hr: None,
            estimated_hr: None,
            is_hr_estimated: false,
            hr_last_update: None,
            shadow_hr,
            learned_snapshots: BTreeSet::new(),
            stress: StressIndex::default(),
            recovery_efficiency: 1.0,
            last_update: now,
            physics_accumulated_seconds: 0.0,
            last_retroactive_check: now,
            chronotype,
            corrector: RetroactiveCorrector::new(
                config.retroactive_match_seconds,
                config.processed_marker_retention_hours,
            ),
            trajectory: TrajectoryPredictor::new(config.trajectory_cache_seconds),
            history: HistoryBuffer::new(config.history_capacity),
            latest: None,
            hydration: None,
            config,
        };
        engine.cached_boost_efficiency = engine
            .chronotype
            .boost_efficiency(engine.local_hour(now), f64::from(readiness));
        engine.hydrate_from_history(now);

        tracing::info!(
            instance_id = %engine.instance_id,
            readiness,
            sleep_score,
            base_fp = engine.base_fp,
            "bio engine initialized"
        );
        engine
    }

    /// Replay the last hours of heart rate into the starting state
    fn hydrate_from_history(&mut self, now: DateTime<Utc>) {
        let Some(repository) = &self.history_repository else {
            return;
        };
        let start = now - Duration::hours(self.config.hydration_window_hours);
        let samples = match repository.fetch_range(start, now) {
            Ok(samples) => samples,
            Err(e) => {
                tracing::warn!(error = %e, "hydration skipped, history unavailable");
                return;
            }
        };

        let Some(report) = hydrate(
            &samples,
            self.baseline_hr,
            f64::from(self.readiness),
            self.base_fp,
        ) else {
            tracing::info!("hydration skipped, no heart rate history");
            return;
        };

        self.estimated_readiness = report.estimated_readiness;
        self.readiness_offset = report.estimated_readiness - f64::from(self.readiness);
        self.base_fp = report.base_fp;
        self.current_hr = Some(report.latest.bpm);
        self.hr_last_update = Some(report.latest.timestamp);
        if report.latest_is_stale(now, self.config.hr_stale_seconds) {
            self.is_hr_estimated = true;
        } else {
            self.estimated_hr = Some(report.latest.bpm);
        }

        tracing::info!(
            records = report.records,
            avg_deviation = report.avg_deviation,
            high_hr_minutes = report.high_hr_minutes,
            estimated_readiness = report.estimated_readiness,
            base_fp = report.base_fp,
            "hydration complete"
        );
        self.hydration = Some(report);
    }

    /// Advance the simulation to the current clock time.
    ///
    /// Stages run in a fixed order; collaborator failures are logged and the
    /// affected stage is skipped.
    pub fn update(&mut self, input: UpdateInput) -> EngineState {
        let now = self.clock.now();
        let dt_seconds = ((now - self.last_update).num_milliseconds() as f64 / 1000.0).max(0.0);

        // Stage 1: Biometric baselines and breaks
        if let Some(refresh) = input.biometrics {
            self.refresh_biometrics(refresh, now);
        }
        if input.break_taken {
            self.record_break(now);
        }
        self.relaxation_session_active = input.relaxation_session_active;

        // Stage 2: Learn from a real sample, then resolve the heart rate
        if let Some(sample) = input.heart_rate {
            self.train_shadow_model(sample);
        }
        self.resolve_heart_rate(input.heart_rate, input.apm, now);

        // Stage 3: Input deltas, stress and recovery efficiency
        let delta = self.telemetry.ingest(input.counters, dt_seconds);
        let fully_idle = input.apm == 0.0 && !delta.has_mouse_motion();
        if fully_idle {
            self.stress.relax();
            self.relax_estimated_hr();
        } else {
            self.stress.update(&StressSignals {
                heart_rate: self.current_hr,
                baseline_hr: self.baseline_hr,
                apm: input.apm,
                mouse_speed: self.telemetry.mouse_speed(),
                debt: self.debt.value(),
                correction_rate: self.telemetry.recent_correction_rate(),
            });
        }
        self.recovery_efficiency = recovery::recovery_efficiency(
            self.effective_fp(),
            self.stress.value(),
            self.debt.value(),
        );

        // Stage 4: Nap recovery, delayed heart rate, phantom recovery
        let nap_minutes = self.nap_total.observe(input.total_nap_minutes);
        if nap_minutes > 0.0 {
            let before = self.base_fp;
            self.base_fp = recovery::apply_nap(
                self.base_fp,
                nap_minutes,
                f64::from(self.readiness),
                self.recovery_efficiency,
                self.recovery_ceiling(),
            );
            tracing::info!(nap_minutes, before, after = self.base_fp, "nap recovery");
        }

        let retroactive_due = (now - self.last_retroactive_check).num_milliseconds() as f64
            / 1000.0
            >= self.config.retroactive_interval_seconds;
        if retroactive_due && (!input.hr_stream.is_empty() || self.history_repository.is_some()) {
            self.run_retroactive_correction(&input.hr_stream, now);
            self.last_retroactive_check = now;
        }

        let phantom = self.phantom_total.observe(input.phantom_recovery_sum);
        if phantom > 0.0 {
            let before = self.base_fp;
            self.base_fp = recovery::apply_phantom(
                self.base_fp,
                phantom,
                self.recovery_efficiency,
                self.recovery_ceiling(),
            );
            tracing::debug!(phantom, before, after = self.base_fp, "phantom recovery");
        }

        // Stage 5: Time awake, work session and realtime readiness
        self.hours_since_wake = hours_between(self.wake_time, now).max(0.0);
        self.update_work_tracking(input.apm, now);
        let readiness_hr = if self.is_hr_estimated {
            self.estimated_hr
        } else {
            input.heart_rate.map(|s| s.bpm)
        };
        self.update_realtime_readiness(readiness_hr, dt_seconds);

        // Stage 6: Activity classification and idle tracking
        self.activity_state = self.classify_activity(input.apm, &delta);
        self.update_idle_tracking(now);

        // Stage 7: Physics tick
        self.physics_accumulated_seconds += dt_seconds;
        if self.physics_accumulated_seconds >= self.config.physics_tick_seconds {
            let tick_seconds = self.physics_accumulated_seconds;
            if self.relaxation_session_active {
                self.base_fp =
                    (self.base_fp + RELAXATION_RECOVERY_PER_SECOND * tick_seconds).min(100.0);
            } else {
                self.physics_tick(tick_seconds, input.apm, &delta, now);
            }
            self.physics_accumulated_seconds = 0.0;
        }

        // Stage 8: Ceiling gravity, boost easing and load
        self.base_fp =
            recovery::apply_ceiling_gravity(self.base_fp, self.recovery_ceiling(), dt_seconds);
        self.boost_fp = BoostModel::ease(self.boost_fp, self.target_boost_fp, dt_seconds);
        self.update_load(input.apm, &delta);

        // Stage 9: Snapshot
        let state = self.snapshot(now);
        self.history.push(HistorySnapshot::new(
            now,
            input.apm,
            self.telemetry.mouse_speed(),
            input.heart_rate.map(|s| s.bpm),
            state.clone(),
        ));
        self.last_update = now;
        self.latest = Some(state.clone());

        tracing::trace!(
            effective_fp = state.effective_fp,
            base_fp = state.base_fp,
            boost_fp = state.boost_fp,
            debt = state.debt,
            activity = state.activity_state.as_str(),
            "update"
        );
        state
    }

    fn refresh_biometrics(&mut self, refresh: BiometricRefresh, now: DateTime<Utc>) {
        if let Some(readiness) = refresh.readiness {
            self.readiness = readiness.min(100);
            self.estimated_readiness = f64::from(self.readiness);
            self.readiness_offset = 0.0;
            self.cumulative_hr_deviation = 0.0;
            self.cumulative_load = 0.0;
        }
        if let Some(sleep_score) = refresh.sleep_score {
            self.sleep_score = sleep_score.min(100);
        }
        if let Some(baseline_hr) = refresh.baseline_hr {
            if baseline_hr > 0 {
                self.baseline_hr = baseline_hr;
            }
        }
        if let Some(seconds) = refresh.main_sleep_seconds {
            self.main_sleep_seconds = Some(seconds);
        }
        if let Some(wake_time) = refresh.wake_time {
            let shift_hours = hours_between(self.wake_time, wake_time).abs();
            if shift_hours >= MORNING_RESET_HOURS {
                let before = self.base_fp;
                self.base_fp =
                    initial_fp(f64::from(self.readiness), f64::from(self.sleep_score));
                tracing::info!(shift_hours, before, after = self.base_fp, "morning reset");
            }
            self.wake_time = wake_time;
            self.hours_since_wake = hours_between(wake_time, now).max(0.0);
        }
    }

    fn record_break(&mut self, now: DateTime<Utc>) {
        self.last_break = now;
        self.idle_start = None;
        self.continuous_idle_seconds = 0.0;
    }

    fn resolve_heart_rate(&mut self, sample: Option<HeartRateSample>, apm: f64, now: DateTime<Utc>) {
        if let Some(sample) = sample {
            self.current_hr = Some(sample.bpm);
            self.estimated_hr = Some(sample.bpm);
            self.is_hr_estimated = false;
            self.hr_last_update = Some(match self.hr_last_update {
                Some(last) => last.max(sample.timestamp),
                None => sample.timestamp,
            });
            return;
        }

        // No prediction until the wearable has reported at least once
        let Some(last) = self.hr_last_update else {
            return;
        };
        let age_seconds = (now - last).num_milliseconds() as f64 / 1000.0;
        if age_seconds >= self.config.hr_stale_seconds {
            let predicted = self.shadow_hr.predict(
                self.baseline_hr,
                apm,
                self.telemetry.mouse_speed(),
                self.continuous_work_hours,
            );
            self.is_hr_estimated = true;
            self.estimated_hr = Some(predicted);
            self.current_hr = Some(predicted);
        } else {
            self.is_hr_estimated = false;
            self.estimated_hr = self.current_hr;
        }
    }

    fn relax_estimated_hr(&mut self) {
        if !self.is_hr_estimated {
            return;
        }
        if let Some(hr) = self.estimated_hr {
            let hr = f64::from(hr);
            let relaxed = hr + (f64::from(self.baseline_hr) - hr) * IDLE_HR_RELAXATION;
            let relaxed = relaxed.trunc().max(0.0) as u32;
            self.estimated_hr = Some(relaxed);
            self.current_hr = Some(relaxed);
        }
    }

    /// Learn shadow coefficients from a real sample.
    ///
    /// Looks up the snapshot closest to the sample within the learning window
    /// and learns only if that snapshot ran on an estimated heart rate. Each
    /// snapshot is learned from at most once.
    pub fn train_shadow_model(&mut self, sample: HeartRateSample) -> Option<LearningOutcome> {
        let index = self
            .history
            .closest_index(sample.timestamp, self.config.shadow_learning_window_seconds)?;
        let snapshot = self.history.get(index)?;
        if !snapshot.state.is_hr_estimated || self.learned_snapshots.contains(&snapshot.timestamp)
        {
            return None;
        }
        let predicted = snapshot.state.estimated_hr?;
        let snapshot_time = snapshot.timestamp;

        let outcome = self.shadow_hr.learn(
            sample.bpm,
            predicted,
            snapshot.apm,
            snapshot.mouse_speed,
            snapshot.state.continuous_work_hours,
        );
        self.shadow_hr.set_last_updated(self.clock.now());
        self.learned_snapshots.insert(snapshot_time);
        if let Some((oldest, _)) = self.history.time_range() {
            self.learned_snapshots = self.learned_snapshots.split_off(&oldest);
        }

        if let Err(e) = self.coefficient_store.save(self.shadow_hr.coefficients()) {
            tracing::warn!(error = %e, "failed to persist shadow coefficients");
        }
        Some(outcome)
    }

    fn run_retroactive_correction(
        &mut self,
        stream: &[HeartRateSample],
        now: DateTime<Utc>,
    ) -> Option<CorrectionReport> {
        let (oldest, newest) = self.history.time_range()?;

        let repository_samples = match &self.history_repository {
            Some(repository) => repository.fetch_range(oldest, newest).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "history repository unavailable for correction");
                Vec::new()
            }),
            None => Vec::new(),
        };
        let sessions = match &self.session_calendar {
            Some(calendar) => calendar.sessions_between(oldest, now).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "session calendar unavailable for correction");
                Vec::new()
            }),
            None => Vec::new(),
        };

        let inputs = CorrectionInputs {
            now,
            baseline_hr: self.baseline_hr,
            stream,
            repository: &repository_samples,
            sessions: &sessions,
        };
        let report = self
            .corrector
            .apply(&mut self.history, &inputs, self.base_fp);
        self.base_fp = report.base_after;
        Some(report)
    }

    fn update_work_tracking(&mut self, apm: f64, now: DateTime<Utc>) {
        if apm > ACTIVE_APM_THRESHOLD {
            let start = *self.work_start.get_or_insert(now);
            self.last_active = Some(now);
            self.continuous_work_hours = hours_between(start, now).max(0.0);
        } else if let Some(last_active) = self.last_active {
            let idle_seconds = (now - last_active).num_milliseconds() as f64 / 1000.0;
            if idle_seconds > self.config.work_idle_reset_seconds {
                self.work_start = None;
                self.continuous_work_hours = 0.0;
            }
        }
    }

    fn update_realtime_readiness(&mut self, heart_rate: Option<u32>, dt_seconds: f64) {
        let dt_hours = dt_seconds / 3600.0;
        if let Some(hr) = heart_rate {
            if hr > 0 && self.baseline_hr > 0 {
                let deviation = (f64::from(hr) - f64::from(self.baseline_hr)).max(0.0);
                self.cumulative_hr_deviation += deviation * dt_hours * 0.5;
            }
        }
        self.cumulative_load += self.current_load * dt_hours * 0.3;

        let estimated = f64::from(self.readiness) + self.readiness_offset
            - self.cumulative_hr_deviation * 0.1
            - self.cumulative_load * 0.05;
        self.estimated_readiness = estimated.clamp(0.0, 100.0);
    }

    fn classify_activity(&self, apm: f64, delta: &TelemetryDelta) -> ActivityState {
        let intensity = BoostModel::intensity(apm, delta.mouse_pixels);
        let scroll = (self.telemetry.recent_scroll_steps() as f64 * SCROLL_INTENSITY_FACTOR)
            .min(MAX_SCROLL_INTENSITY);
        ActivityState::from_intensity((intensity + scroll).min(1.0))
    }

    fn update_idle_tracking(&mut self, now: DateTime<Utc>) {
        if self.activity_state != ActivityState::Idle {
            self.idle_start = None;
            self.continuous_idle_seconds = 0.0;
            return;
        }
        let start = *self.idle_start.get_or_insert(now);
        self.continuous_idle_seconds = ((now - start).num_milliseconds() as f64 / 1000.0).max(0.0);
        if self.continuous_idle_seconds >= self.config.auto_break_idle_seconds {
            tracing::debug!(
                idle_seconds = self.continuous_idle_seconds,
                "idle long enough, break recorded"
            );
            self.record_break(now);
        }
    }

    fn physics_tick(&mut self, dt_seconds: f64, apm: f64, delta: &TelemetryDelta, now: DateTime<Utc>) {
        let hr_stress = self.hr_stress_factor();
        let terms = self.decay_terms_for(apm, delta.backspaces, hr_stress);
        self.cached_decay_rate = terms.base_rate;
        self.correction_factor = DecayModel::correction_factor(apm, delta.backspaces);
        self.base_fp = DecayModel::step_base(self.base_fp, terms.effective_rate(), dt_seconds / 3600.0);

        let readiness = f64::from(self.readiness);
        let intensity = BoostModel::intensity(apm, delta.mouse_pixels);
        self.target_boost_fp = BoostModel::target_boost(
            intensity,
            self.activity_state,
            readiness,
            self.correction_factor,
        );

        let repayment = self.repayment_rate();
        self.debt.step(self.boost_fp, dt_seconds, hr_stress, repayment);
        self.cached_boost_efficiency = self
            .chronotype
            .boost_efficiency(self.local_hour(now), readiness);
    }

    fn decay_terms_for(&self, apm: f64, backspaces: u64, hr_stress: f64) -> DecayTerms {
        let correction = DecayModel::correction_factor(apm, backspaces);
        DecayTerms {
            base_rate: DecayModel::decay_rate(
                self.estimated_readiness as i32,
                i32::from(self.sleep_score),
            ),
            work_multiplier: DecayModel::work_duration_multiplier(self.continuous_work_hours),
            debt_multiplier: DecayModel::debt_multiplier(self.debt.value()),
            hr_stress_factor: hr_stress,
            friction_multiplier: DecayModel::friction_multiplier(correction),
        }
    }

    fn update_load(&mut self, apm: f64, delta: &TelemetryDelta) {
        if self.relaxation_session_active {
            self.current_load *= 0.99;
            return;
        }
        let target = if apm > 0.0 || delta.has_mouse_motion() {
            (BoostModel::intensity(apm, delta.mouse_pixels) * 1.5).min(1.0)
        } else {
            0.0
        };
        self.current_load = if target > self.current_load {
            self.current_load * 0.9 + target * 0.1
        } else {
            self.current_load * 0.99 + target * 0.01
        };
    }

    fn snapshot(&self, now: DateTime<Utc>) -> EngineState {
        EngineState {
            timestamp: now,
            base_fp: self.base_fp,
            boost_fp: self.boost_fp,
            effective_fp: self.effective_fp(),
            debt: self.debt.value(),
            current_load: self.current_load,
            readiness: self.readiness,
            estimated_readiness: self.estimated_readiness,
            continuous_work_hours: self.continuous_work_hours,
            decay_multiplier: DecayModel::work_duration_multiplier(self.continuous_work_hours),
            hours_since_wake: self.hours_since_wake,
            activity_state: self.activity_state,
            boost_efficiency: self.cached_boost_efficiency,
            correction_factor: self.correction_factor,
            estimated_hr: self.estimated_hr,
            is_hr_estimated: self.is_hr_estimated,
            hr_last_update: self.hr_last_update,
        }
    }

    fn effective_fp(&self) -> f64 {
        (self.base_fp + self.boost_fp * self.cached_boost_efficiency - self.debt.penalty())
            .clamp(10.0, 100.0)
    }

    /// Heart rate used by the physics: the estimate while real data is stale
    fn effective_hr(&self) -> Option<u32> {
        if self.is_hr_estimated && self.estimated_hr.is_some() {
            self.estimated_hr
        } else {
            self.current_hr
        }
    }

    fn hr_stress_factor(&self) -> f64 {
        DecayModel::hr_stress_factor(self.effective_hr(), self.baseline_hr)
    }

    fn recovery_ceiling(&self) -> f64 {
        recovery::recovery_ceiling(
            self.main_sleep_seconds,
            f64::from(self.sleep_score),
            self.hours_since_wake,
        )
    }

    fn repayment_rate(&self) -> f64 {
        DebtLedger::dynamic_repayment_rate(f64::from(self.readiness), f64::from(self.sleep_score))
    }

    fn local_hour(&self, now: DateTime<Utc>) -> u32 {
        match self.config.utc_offset() {
            Some(offset) => now.with_timezone(&offset).hour(),
            None => now.hour(),
        }
    }

    fn trajectory_inputs(&self, now: DateTime<Utc>) -> TrajectoryInputs {
        TrajectoryInputs {
            now,
            base_fp: self.base_fp,
            boost_fp: self.boost_fp,
            debt: self.debt.value(),
            decay_rate: self.cached_decay_rate,
            work_multiplier: DecayModel::work_duration_multiplier(self.continuous_work_hours),
            boost_efficiency: self.cached_boost_efficiency,
            repayment_rate: self.repayment_rate(),
        }
    }

    /// "Continue working" and "rest now" FP curves, `minutes` ahead in 5-minute steps
    pub fn predict_trajectory(&self, minutes: u32) -> Trajectory {
        let now = self.clock.now();
        self.trajectory.predict(&self.trajectory_inputs(now), minutes)
    }

    /// Earlier of the hydration deadline and the moment FP is predicted to fall below the break threshold
    pub fn get_recommended_break_time(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        let prediction = self.predict_trajectory(BREAK_HORIZON_MINUTES);
        trajectory::recommended_break_time(
            &prediction,
            now,
            self.last_break,
            self.config.hydration_interval_minutes,
            self.config.break_threshold_fp,
        )
    }

    /// Moment FP is predicted to fall below the exhaustion threshold
    pub fn get_exhaustion_time(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        let prediction = self.predict_trajectory(EXHAUSTION_HORIZON_MINUTES);
        trajectory::exhaustion_time(&prediction, now, self.config.exhaustion_threshold_fp)
    }

    /// Status code and message
    pub fn get_status_code(&self) -> (String, String) {
        let now = self.clock.now();
        let (code, message) = derive_status(&StatusInputs {
            relaxation_session_active: self.relaxation_session_active,
            recovery_ceiling: self.recovery_ceiling(),
            continuous_work_hours: self.continuous_work_hours,
            minutes_since_break: (now - self.last_break).num_seconds() as f64 / 60.0,
            hydration_interval_minutes: self.config.hydration_interval_minutes as f64,
            effective_fp: self.effective_fp(),
            current_load: self.current_load,
            activity_state: self.activity_state,
            boost_fp: self.boost_fp,
            debt: self.debt.value(),
            estimated_readiness: self.estimated_readiness,
        });
        (code.as_str().to_string(), message)
    }

    pub fn get_health_metrics(&self) -> HealthMetrics {
        let now = self.clock.now();
        let totals = self.telemetry.session_totals();
        HealthMetrics {
            engine_instance_id: self.instance_id.to_string(),
            base_fp: self.base_fp,
            boost_fp: self.boost_fp,
            effective_fp: self.effective_fp(),
            debt: self.debt.value(),
            current_load: self.current_load,
            readiness: self.readiness,
            sleep_score: self.sleep_score,
            estimated_readiness: self.estimated_readiness,
            continuous_work_hours: self.continuous_work_hours,
            decay_multiplier: DecayModel::work_duration_multiplier(self.continuous_work_hours),
            hours_since_wake: self.hours_since_wake,
            activity_state: self.activity_state,
            boost_efficiency: self.cached_boost_efficiency,
            correction_factor: self.correction_factor,
            session_mouse_pixels: totals.mouse_pixels,
            session_backspace_count: totals.backspaces,
            session_scroll_steps: totals.scroll_steps,
            continuous_idle_seconds: self.continuous_idle_seconds,
            chronotype_hour_efficiency: self.chronotype.hour_efficiency(self.local_hour(now)),
            chronotype_blend_ratio: self.chronotype.blend_weight(),
            phantom_recovery_sum: self.phantom_total.last(),
            current_mouse_speed: self.telemetry.mouse_speed(),
            recent_correction_rate: self.telemetry.recent_correction_rate(),
            relaxation_session_active: self.relaxation_session_active,
            current_hr: self.current_hr,
            baseline_hr: self.baseline_hr,
            cumulative_hr_deviation: self.cumulative_hr_deviation,
            cumulative_load: self.cumulative_load,
            hr_stress_factor: self.hr_stress_factor(),
            estimated_hr: self.estimated_hr,
            is_hr_estimated: self.is_hr_estimated,
            hr_last_update: self.hr_last_update,
            shadow_hr_coefficients: self.shadow_hr.report(),
            stress_index: self.stress.value(),
            recovery_efficiency: self.recovery_efficiency,
            recovery_ceiling: self.recovery_ceiling(),
            hydration_completed: self.hydration.is_some(),
        }
    }

    /// Every intermediate term of the effective FP, with the formula spelled out
    pub fn debug_fp_calculation(&self) -> FpBreakdown {
        let now = self.clock.now();
        let hour = self.local_hour(now);
        let hr_stress = self.hr_stress_factor();
        let work_multiplier = DecayModel::work_duration_multiplier(self.continuous_work_hours);
        let debt_multiplier = DecayModel::debt_multiplier(self.debt.value());
        let friction = DecayModel::friction_multiplier(self.correction_factor);

        let boosted = self.boost_fp * self.cached_boost_efficiency;
        let penalty = self.debt.penalty();
        let raw = self.base_fp + boosted - penalty;
        let effective = self.effective_fp();

        FpBreakdown {
            base_fp: self.base_fp,
            boost_fp: self.boost_fp,
            boost_efficiency: self.cached_boost_efficiency,
            debt: self.debt.value(),
            boosted_fp: boosted,
            debt_penalty: penalty,
            raw_fp: raw,
            effective_fp: effective,
            base_decay_rate: self.cached_decay_rate,
            work_multiplier,
            debt_decay_multiplier: debt_multiplier,
            friction_multiplier: friction,
            hr_stress_factor: hr_stress,
            effective_decay_rate: self.cached_decay_rate
                * work_multiplier
                * debt_multiplier
                * hr_stress
                * friction,
            current_hr: self.current_hr,
            baseline_hr: self.baseline_hr,
            current_hour: hour,
            hour_efficiency: self.chronotype.hour_efficiency(hour),
            using_default_chronotype: self.chronotype.using_default(),
            chronotype_blend_ratio: self.chronotype.blend_weight(),
            recovery_ceiling: self.recovery_ceiling(),
            formula: format!(
                "FP_eff = clamp(10, 100, {:.2} + ({:.2} × {:.2}) - ({:.2} × {:.1})) = {:.2}",
                self.base_fp,
                self.boost_fp,
                self.cached_boost_efficiency,
                self.debt.value(),
                DEBT_PENALTY_MULTIPLIER,
                effective
            ),
        }
    }

    /// Most recent state, or the construction state before the first update
    pub fn latest_state(&self) -> EngineState {
        match &self.latest {
            Some(state) => state.clone(),
            None => self.snapshot(self.last_update),
        }
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn coefficients(&self) -> &ShadowCoefficients {
        self.shadow_hr.coefficients()
    }

    pub fn chronotype(&self) -> &ChronotypeTable {
        &self.chronotype
    }

    pub fn hydration_report(&self) -> Option<&HydrationReport> {
        self.hydration.as_ref()
    }

    pub fn last_break_time(&self) -> DateTime<Utc> {
        self.last_break
    }
}

fn hours_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds() as f64 / 3_600_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::repository::{ActivityObservation, InMemoryRepository};
    use crate::types::{CumulativeCounters, HrSource, RelaxationSession};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
    }

    fn engine_at(clock: &ManualClock) -> BioEngine {
        BioEngine::builder()
            .readiness(75)
            .sleep_score(75)
            .wake_time(clock.now())
            .clock(clock.clone())
            .build()
            .unwrap()
    }

    fn idle() -> UpdateInput {
        UpdateInput::default()
    }

    fn typing(apm: f64, keys: u64, mouse: f64) -> UpdateInput {
        UpdateInput {
            apm,
            counters: CumulativeCounters {
                mouse_pixels: mouse,
                keystrokes: keys,
                backspaces: 0,
                scroll_steps: 0,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_initial_fp_at_wake() {
        let clock = ManualClock::new(t0());
        let engine = engine_at(&clock);

        let state = engine.latest_state();
        assert!((state.base_fp - 75.0).abs() < 1e-9);
        assert!((state.effective_fp - 75.0).abs() < 1e-9);
        assert_eq!(state.debt, 0.0);
    }

    #[test]
    fn test_default_wake_time_applies_decay() {
        let clock = ManualClock::new(t0());
        let engine = BioEngine::builder()
            .readiness(75)
            .sleep_score(75)
            .clock(clock.clone())
            .build()
            .unwrap();

        let expected = 75.0 * (-0.07_f64 * 8.0).exp();
        assert!((engine.latest_state().base_fp - expected).abs() < 1e-9);
    }

    #[test]
    fn test_scores_are_clamped() {
        let clock = ManualClock::new(t0());
        let engine = BioEngine::builder()
            .readiness(140)
            .sleep_score(-5)
            .wake_time(t0())
            .clock(clock)
            .build()
            .unwrap();

        assert_eq!(engine.latest_state().readiness, 100);
        assert!((engine.latest_state().base_fp - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            history_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            BioEngine::builder().config(config).build(),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_idle_decay_two_hours() {
        let clock = ManualClock::new(t0());
        let mut engine = engine_at(&clock);

        let mut state = engine.latest_state();
        for _ in 0..7200 {
            clock.advance_secs(1.0);
            state = engine.update(idle());
        }

        assert!((state.base_fp - 75.0 * (-0.14_f64).exp()).abs() < 0.01);
        assert!((state.base_fp - 65.2).abs() < 0.05);
        assert_eq!(state.activity_state, ActivityState::Idle);
        assert!(state.estimated_hr.is_none());
    }

    #[test]
    fn test_typing_builds_boost_and_work_time() {
        let clock = ManualClock::new(t0());
        let mut engine = engine_at(&clock);

        let mut state = engine.latest_state();
        for i in 1..=600 {
            clock.advance_secs(1.0);
            state = engine.update(typing(120.0, i * 2, i as f64 * 500.0));
        }

        assert!(state.boost_fp > 5.0);
        assert!(state.debt > 0.0);
        assert!(state.continuous_work_hours > 0.16);
        assert!(state.current_load > 0.5);
        assert!(state.activity_state >= ActivityState::DeepDive);
        assert!(state.effective_fp >= 10.0 && state.effective_fp <= 100.0);
    }

    #[test]
    fn test_real_heart_rate_raises_stress() {
        let clock = ManualClock::new(t0());
        let mut engine = engine_at(&clock);

        clock.advance_secs(1.0);
        let sample = HeartRateSample::new(clock.now(), 90, HrSource::Awake);
        let state = engine.update(UpdateInput {
            heart_rate: Some(sample),
            ..Default::default()
        });

        assert_eq!(state.estimated_hr, Some(90));
        assert!(!state.is_hr_estimated);
        assert_eq!(state.hr_last_update, Some(sample.timestamp));
        assert!((engine.get_health_metrics().hr_stress_factor - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_shadow_heart_rate_after_staleness() {
        let clock = ManualClock::new(t0());
        let mut engine = engine_at(&clock);

        clock.advance_secs(1.0);
        engine.update(UpdateInput {
            heart_rate: Some(HeartRateSample::new(clock.now(), 70, HrSource::Awake)),
            ..Default::default()
        });

        clock.advance_secs(200.0);
        let state = engine.update(typing(60.0, 10, 0.0));
        assert!(!state.is_hr_estimated);
        assert_eq!(state.estimated_hr, Some(70));

        clock.advance_secs(200.0);
        let state = engine.update(typing(60.0, 20, 0.0));
        assert!(state.is_hr_estimated);
        // 60 + 10 + 60 * 0.1 with no mouse and no work time yet
        assert_eq!(state.estimated_hr, Some(76));
    }

    #[test]
    fn test_training_learns_from_estimated_snapshot() {
        let clock = ManualClock::new(t0());
        let store = InMemoryCoefficientStore::new();
        let mut engine = BioEngine::builder()
            .wake_time(t0())
            .clock(clock.clone())
            .coefficient_store(store.clone())
            .build()
            .unwrap();

        clock.advance_secs(1.0);
        engine.update(UpdateInput {
            heart_rate: Some(HeartRateSample::new(clock.now(), 70, HrSource::Awake)),
            ..Default::default()
        });
        clock.advance_secs(400.0);
        let estimated = engine.update(typing(80.0, 10, 0.0));
        assert!(estimated.is_hr_estimated);

        let sample = HeartRateSample::new(estimated.timestamp, 95, HrSource::Awake);
        let outcome = engine.train_shadow_model(sample).unwrap();

        assert!(outcome.error > 0.0);
        assert!(outcome.alpha_delta > 0.0);
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.current().unwrap().alpha, engine.coefficients().alpha);

        // The same snapshot is not learned from twice
        assert!(engine.train_shadow_model(sample).is_none());
    }

    #[test]
    fn test_training_ignores_real_snapshots() {
        let clock = ManualClock::new(t0());
        let mut engine = engine_at(&clock);

        clock.advance_secs(1.0);
        let sample = HeartRateSample::new(clock.now(), 70, HrSource::Awake);
        engine.update(UpdateInput {
            heart_rate: Some(sample),
            ..Default::default()
        });
        assert!(engine.train_shadow_model(sample).is_none());
    }

    #[test]
    fn test_retroactive_stream_correction() {
        let clock = ManualClock::new(t0());
        let mut engine = engine_at(&clock);

        for _ in 0..4 {
            clock.advance_secs(1.0);
            engine.update(idle());
        }
        let before = engine.latest_state().base_fp;

        clock.advance_secs(1.0);
        let stream = vec![HeartRateSample::new(t0() + Duration::seconds(2), 100, HrSource::Awake)];
        let state = engine.update(UpdateInput {
            hr_stream: stream.clone(),
            ..Default::default()
        });

        assert!(state.base_fp < before - 1.0);
        assert!(engine.history().iter().take(4).all(|s| s.heart_rate() == Some(100)));

        // Delivering the same slice again only corrects the snapshot taken since
        let corrected = state.base_fp;
        clock.advance_secs(5.0);
        let state = engine.update(UpdateInput {
            hr_stream: stream,
            ..Default::default()
        });
        assert!((corrected - state.base_fp - 0.75).abs() < 0.02);
    }

    #[test]
    fn test_session_calendar_turns_correction_into_recovery() {
        let clock = ManualClock::new(t0());
        let calendar = InMemoryRepository::new().with_sessions(vec![RelaxationSession {
            start: t0(),
            end: None,
        }]);
        let mut engine = BioEngine::builder()
            .readiness(75)
            .sleep_score(75)
            .wake_time(t0())
            .clock(clock.clone())
            .session_calendar(calendar)
            .build()
            .unwrap();

        for _ in 0..4 {
            clock.advance_secs(1.0);
            engine.update(idle());
        }
        let before = engine.latest_state().base_fp;

        clock.advance_secs(1.0);
        let state = engine.update(UpdateInput {
            hr_stream: vec![HeartRateSample::new(t0() + Duration::seconds(2), 120, HrSource::Awake)],
            ..Default::default()
        });

        // Four snapshots credited, minus one second of decay
        assert!(state.base_fp > before);
    }

    #[test]
    fn test_relaxation_session_recovers() {
        let clock = ManualClock::new(t0());
        let mut engine = engine_at(&clock);

        let mut state = engine.latest_state();
        for _ in 0..60 {
            clock.advance_secs(1.0);
            state = engine.update(UpdateInput {
                relaxation_session_active: true,
                ..Default::default()
            });
        }
        assert!((state.base_fp - (75.0 + 60.0 * RELAXATION_RECOVERY_PER_SECOND)).abs() < 1e-6);
        assert_eq!(engine.get_status_code().0, "RELAXATION SESSION");
    }

    #[test]
    fn test_morning_reset() {
        let clock = ManualClock::new(t0());
        let mut engine = BioEngine::builder()
            .readiness(75)
            .sleep_score(75)
            .wake_time(t0() - Duration::hours(20))
            .clock(clock.clone())
            .build()
            .unwrap();
        assert!(engine.latest_state().base_fp < 20.0);

        clock.advance_secs(1.0);
        let state = engine.update(UpdateInput {
            biometrics: Some(BiometricRefresh {
                readiness: Some(90),
                sleep_score: Some(80),
                wake_time: Some(clock.now()),
                ..Default::default()
            }),
            ..Default::default()
        });

        // 90 * 0.7 + 80 * 0.3 = 87, minus one tick of decay
        assert!((state.base_fp - 87.0).abs() < 0.01);
        assert_eq!(state.readiness, 90);
        assert_eq!(state.estimated_readiness, 90.0);
        assert!(state.hours_since_wake < 0.001);
    }

    #[test]
    fn test_short_main_sleep_caps_base() {
        let clock = ManualClock::new(t0());
        let mut engine = engine_at(&clock);

        clock.advance_secs(1.0);
        engine.update(UpdateInput {
            biometrics: Some(BiometricRefresh {
                main_sleep_seconds: Some(2 * 3600),
                ..Default::default()
            }),
            ..Default::default()
        });
        for _ in 0..10 {
            clock.advance_secs(1.0);
            engine.update(idle());
        }

        let metrics = engine.get_health_metrics();
        assert_eq!(metrics.recovery_ceiling, 50.0);
        assert!((metrics.base_fp - 50.0).abs() < 0.05);
    }

    #[test]
    fn test_nap_and_phantom_recovery() {
        let clock = ManualClock::new(t0());
        let mut engine = BioEngine::builder()
            .readiness(60)
            .sleep_score(60)
            .wake_time(t0() - Duration::hours(10))
            .clock(clock.clone())
            .build()
            .unwrap();
        let before = engine.latest_state().base_fp;

        clock.advance_secs(1.0);
        let state = engine.update(UpdateInput {
            total_nap_minutes: 20.0,
            ..Default::default()
        });
        assert!(state.base_fp > before);

        clock.advance_secs(1.0);
        let after_nap = state.base_fp;
        let state = engine.update(UpdateInput {
            total_nap_minutes: 20.0,
            phantom_recovery_sum: 10.0,
            ..Default::default()
        });
        assert!(state.base_fp > after_nap - 0.01);
        assert_eq!(engine.get_health_metrics().phantom_recovery_sum, 10.0);
    }

    #[test]
    fn test_auto_break_after_long_idle() {
        let clock = ManualClock::new(t0());
        let mut engine = engine_at(&clock);

        for _ in 0..901 {
            clock.advance_secs(1.0);
            engine.update(idle());
        }
        assert!(engine.last_break_time() > t0());
    }

    #[test]
    fn test_hydration_from_repository() {
        let now = t0();
        let samples: Vec<HeartRateSample> = (0..60)
            .map(|i| {
                HeartRateSample::new(
                    now - Duration::minutes(120 - i),
                    95,
                    HrSource::Awake,
                )
            })
            .collect();
        let repository = InMemoryRepository::new().with_samples(samples);
        let clock = ManualClock::new(now);

        let engine = BioEngine::builder()
            .readiness(75)
            .sleep_score(75)
            .wake_time(now)
            .clock(clock)
            .history_repository(repository)
            .build()
            .unwrap();

        let report = engine.hydration_report().unwrap();
        assert_eq!(report.records, 60);
        assert_eq!(report.high_hr_minutes, 60);
        assert!((engine.latest_state().estimated_readiness - 64.5).abs() < 1e-9);
        assert!((engine.latest_state().base_fp - 72.0).abs() < 1e-9);
        // Newest sample is an hour old
        assert!(engine.latest_state().is_hr_estimated);
        assert!(engine.get_health_metrics().hydration_completed);
    }

    #[test]
    fn test_chronotype_from_activity_repository() {
        let now = t0();
        let observations: Vec<ActivityObservation> = (0..48)
            .map(|i| ActivityObservation {
                timestamp: now - Duration::days(1) + Duration::minutes(i),
                apm: 50.0,
            })
            .collect();
        let clock = ManualClock::new(now);
        let engine = BioEngine::builder()
            .wake_time(now)
            .clock(clock)
            .activity_repository(InMemoryRepository::new().with_activity(observations))
            .build()
            .unwrap();

        let breakdown = engine.debug_fp_calculation();
        assert!(!breakdown.using_default_chronotype);
        assert_eq!(breakdown.chronotype_blend_ratio, 1.0);
        assert_eq!(breakdown.current_hour, 9);
        assert!((breakdown.hour_efficiency - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_debug_breakdown_formula() {
        let clock = ManualClock::new(t0());
        let engine = engine_at(&clock);

        let breakdown = engine.debug_fp_calculation();
        assert_eq!(breakdown.raw_fp, breakdown.base_fp);
        assert_eq!(breakdown.debt_penalty, 0.0);
        assert_eq!(
            breakdown.formula,
            format!(
                "FP_eff = clamp(10, 100, 75.00 + (0.00 × {:.2}) - (0.00 × 3.0)) = 75.00",
                breakdown.boost_efficiency
            )
        );
    }

    #[test]
    fn test_break_and_exhaustion_times() {
        let clock = ManualClock::new(t0());
        let engine = engine_at(&clock);

        assert_eq!(engine.get_recommended_break_time(), t0() + Duration::minutes(90));
        assert_eq!(engine.get_exhaustion_time(), t0() + Duration::hours(8));
    }

    #[test]
    fn test_trajectory_cached_for_five_seconds() {
        let clock = ManualClock::new(t0());
        let mut engine = engine_at(&clock);

        let first = engine.predict_trajectory(60);
        clock.advance_secs(2.0);
        engine.update(typing(150.0, 50, 3000.0));
        assert_eq!(engine.predict_trajectory(60), first);

        clock.advance_secs(6.0);
        engine.update(idle());
        assert_ne!(engine.predict_trajectory(60), first);
    }

    #[test]
    fn test_history_capacity() {
        let clock = ManualClock::new(t0());
        let mut engine = engine_at(&clock);
        for _ in 0..400 {
            clock.advance_secs(1.0);
            engine.update(idle());
        }
        assert_eq!(engine.history().len(), 360);
    }

    #[test]
    fn test_status_hydration_required() {
        let clock = ManualClock::new(t0());
        let mut engine = engine_at(&clock);

        for _ in 0..100 {
            clock.advance_secs(60.0);
            engine.update(typing(40.0, 0, 0.0));
        }
        let (code, _) = engine.get_status_code();
        assert_eq!(code, "HYDRATION REQUIRED");
    }

    #[test]
    fn test_health_metrics_serialize() {
        let clock = ManualClock::new(t0());
        let engine = engine_at(&clock);

        let json = serde_json::to_value(engine.get_health_metrics()).unwrap();
        assert_eq!(json["engine_instance_id"], engine.instance_id().to_string());
        assert_eq!(json["activity_state"], "idle");
        assert!(json["shadow_hr_coefficients"]["alpha"].is_number());
    }
}
