//! Cross-module properties of the engine driven through its public API

use chrono::{DateTime, Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use synheart_focus::shadow_hr::{ShadowCoefficients, ShadowHeartRatePredictor};
use synheart_focus::types::{CumulativeCounters, EngineState};
use synheart_focus::{
    BioEngine, Clock, EngineConfig, HeartRateSample, HrSource, InMemoryRepository, ManualClock,
    UpdateInput,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 8, 30, 0).unwrap()
}

fn engine(clock: &ManualClock, readiness: i32, sleep_score: i32) -> BioEngine {
    BioEngine::builder()
        .readiness(readiness)
        .sleep_score(sleep_score)
        .wake_time(clock.now())
        .clock(clock.clone())
        .build()
        .unwrap()
}

/// Deterministic pseudo-random sequence of update inputs
struct InputScript {
    seed: u64,
    counters: CumulativeCounters,
    naps: f64,
    phantom: f64,
}

impl InputScript {
    fn new(seed: u64) -> Self {
        Self {
            seed,
            counters: CumulativeCounters::default(),
            naps: 0.0,
            phantom: 0.0,
        }
    }

    fn next_u32(&mut self) -> u32 {
        self.seed = self
            .seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.seed >> 33) as u32
    }

    fn next_input(&mut self, now: DateTime<Utc>) -> UpdateInput {
        let roll = self.next_u32() % 100;
        let apm = f64::from(self.next_u32() % 400);

        if roll < 3 {
            // Collector restart
            self.counters = CumulativeCounters::default();
        } else {
            self.counters.mouse_pixels += f64::from(self.next_u32() % 20_000);
            self.counters.keystrokes += u64::from(self.next_u32() % 40);
            self.counters.backspaces += u64::from(self.next_u32() % 15);
            self.counters.scroll_steps += u64::from(self.next_u32() % 10);
        }
        if roll == 50 {
            self.naps += 25.0;
        }
        if roll == 51 {
            self.phantom += 40.0;
        }

        let heart_rate = (roll % 7 == 0).then(|| {
            HeartRateSample::new(now, 50 + self.next_u32() % 130, HrSource::Awake)
        });
        let hr_stream = if roll % 11 == 0 {
            vec![HeartRateSample::new(
                now - Duration::seconds(10),
                40 + self.next_u32() % 150,
                if roll % 2 == 0 { HrSource::Rest } else { HrSource::Awake },
            )]
        } else {
            Vec::new()
        };

        UpdateInput {
            apm,
            counters: self.counters,
            heart_rate,
            hr_stream,
            total_nap_minutes: self.naps,
            phantom_recovery_sum: self.phantom,
            relaxation_session_active: roll > 95,
            break_taken: roll == 42,
            ..Default::default()
        }
    }
}

fn run_script(seed: u64, ticks: usize) -> Vec<EngineState> {
    let clock = ManualClock::new(t0());
    let mut engine = engine(&clock, 68, 72);
    let mut script = InputScript::new(seed);

    (0..ticks)
        .map(|_| {
            clock.advance_secs(2.0);
            let input = script.next_input(clock.now());
            engine.update(input)
        })
        .collect()
}

#[test]
fn test_outputs_stay_bounded() {
    for seed in [1, 7, 42, 1234] {
        for state in run_script(seed, 3000) {
            assert!(
                (10.0..=100.0).contains(&state.effective_fp),
                "effective_fp {} out of range",
                state.effective_fp
            );
            assert!((0.0..=10.0).contains(&state.debt), "debt {} out of range", state.debt);
            assert!((0.0..=1.0).contains(&state.current_load));
            assert!((0.0..=100.0).contains(&state.estimated_readiness));
            assert!(state.base_fp.is_finite() && state.boost_fp >= 0.0);
            if let Some(hr) = state.estimated_hr.filter(|_| state.is_hr_estimated) {
                assert!((45..=180).contains(&hr));
            }
        }
    }
}

#[test]
fn test_replay_is_deterministic() {
    assert_eq!(run_script(99, 500), run_script(99, 500));
}

#[test]
fn test_idle_base_strictly_decreases() {
    let clock = ManualClock::new(t0());
    let mut engine = engine(&clock, 80, 80);

    let mut previous = engine.latest_state().base_fp;
    for _ in 0..600 {
        clock.advance_secs(1.0);
        let state = engine.update(UpdateInput::default());
        assert!(state.base_fp < previous);
        previous = state.base_fp;
    }
}

#[test]
fn test_lower_readiness_decays_faster() {
    let run = |readiness: i32| {
        let clock = ManualClock::new(t0());
        let mut engine = engine(&clock, readiness, 75);
        let start = engine.latest_state().base_fp;
        let mut state = engine.latest_state();
        for _ in 0..1800 {
            clock.advance_secs(2.0);
            state = engine.update(UpdateInput::default());
        }
        state.base_fp / start
    };

    assert!(run(90) > run(70));
    assert!(run(70) > run(50));
    assert!(run(50) > run(30));
}

#[test]
fn test_scenario_fresh_wake() {
    let clock = ManualClock::new(t0());
    let engine = engine(&clock, 75, 75);

    assert_eq!(engine.latest_state().effective_fp, 75.0);
    assert_eq!(engine.debug_fp_calculation().base_decay_rate, 0.07);
}

#[test]
fn test_scenario_two_hours_idle() {
    let clock = ManualClock::new(t0());
    let mut engine = engine(&clock, 75, 75);

    let mut state = engine.latest_state();
    for _ in 0..720 {
        clock.advance_secs(10.0);
        state = engine.update(UpdateInput::default());
    }
    assert!((state.base_fp - 65.2).abs() < 0.05);
}

#[test]
fn test_redelivered_stream_is_not_applied_twice() {
    let config = EngineConfig {
        retroactive_match_seconds: 2.0,
        ..Default::default()
    };
    let build = |clock: &ManualClock| {
        BioEngine::builder()
            .wake_time(clock.now())
            .config(config.clone())
            .clock(clock.clone())
            .build()
            .unwrap()
    };

    let clock_a = ManualClock::new(t0());
    let clock_b = ManualClock::new(t0());
    let mut once = build(&clock_a);
    let mut twice = build(&clock_b);
    let stream = vec![HeartRateSample::new(t0() + Duration::seconds(2), 110, HrSource::Awake)];

    let mut last = None;
    for tick in 1..=10 {
        clock_a.advance_secs(1.0);
        clock_b.advance_secs(1.0);
        let first = tick == 5;
        let again = tick == 5 || tick == 10;
        last = Some((
            once.update(UpdateInput {
                hr_stream: if first { stream.clone() } else { Vec::new() },
                ..Default::default()
            }),
            twice.update(UpdateInput {
                hr_stream: if again { stream.clone() } else { Vec::new() },
                ..Default::default()
            }),
        ));
    }

    let (once_state, twice_state) = last.unwrap();
    assert_eq!(once_state, twice_state);
    assert!(once_state.base_fp < 74.0);
}

#[test]
fn test_repository_samples_correct_history() {
    let samples: Vec<HeartRateSample> = (1..=30)
        .map(|s| HeartRateSample::new(t0() + Duration::seconds(s), 100, HrSource::Awake))
        .collect();
    let clock = ManualClock::new(t0());
    let mut engine = BioEngine::builder()
        .wake_time(t0())
        .clock(clock.clone())
        .history_repository(InMemoryRepository::new().with_samples(samples))
        .build()
        .unwrap();

    for _ in 0..20 {
        clock.advance_secs(1.0);
        engine.update(UpdateInput::default());
    }

    let backfilled = engine
        .history()
        .iter()
        .filter(|s| s.heart_rate() == Some(100))
        .count();
    // Passes at 5, 10, 15 and 20 seconds cover everything recorded before them
    assert_eq!(backfilled, 19);
}

#[test]
fn test_trajectory_cache_window() {
    let clock = ManualClock::new(t0());
    let mut engine = engine(&clock, 75, 75);

    let first = engine.predict_trajectory(120);
    clock.advance_secs(4.0);
    engine.update(UpdateInput {
        apm: 200.0,
        ..Default::default()
    });
    assert_eq!(engine.predict_trajectory(60).continue_curve, first.continue_curve[..13].to_vec());

    clock.advance_secs(2.0);
    assert_ne!(engine.predict_trajectory(120), first);
}

#[test]
fn test_shadow_predictions_bounded() {
    let extremes = [
        ShadowCoefficients::default(),
        ShadowCoefficients {
            alpha: 0.5,
            beta: 0.1,
            gamma: 0.2,
            last_updated: None,
        },
    ];
    for coefficients in extremes {
        let predictor = ShadowHeartRatePredictor::new(coefficients, 20.0);
        for base in [0, 30, 60, 200] {
            for apm in [0.0, 100.0, 1000.0] {
                for hours in [0.0, 4.0, 24.0] {
                    let hr = predictor.predict(base, apm, 5000.0, hours);
                    assert!((45..=180).contains(&hr));
                }
            }
        }
    }
    let predictor = ShadowHeartRatePredictor::new(ShadowCoefficients::default(), 20.0);
    assert_eq!(predictor.predict(55, 0.0, 0.0, 0.0), 65);
}
