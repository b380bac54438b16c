//! Input telemetry accumulation
//!
//! The input collector reports monotonic cumulative counters. This module turns
//! them into per-update deltas and maintains the smoothed signals derived from
//! them: mouse speed (EMA) and the rolling correction rate and scroll volume
//! over the last 60 updates.

use crate::types::CumulativeCounters;
use std::collections::VecDeque;

/// Number of updates covered by the rolling windows
pub const ROLLING_WINDOW: usize = 60;

/// EMA coefficient for mouse speed smoothing
pub const MOUSE_SPEED_EMA_ALPHA: f64 = 0.3;

/// Per-update increments
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetryDelta {
    pub mouse_pixels: f64,
    pub keystrokes: u64,
    pub backspaces: u64,
    pub scroll_steps: u64,
}

impl TelemetryDelta {
    pub fn has_mouse_motion(&self) -> bool {
        self.mouse_pixels > 0.0
    }
}

/// Converts cumulative counters into deltas
#[derive(Debug, Clone)]
pub struct TelemetryAccumulator {
    last: CumulativeCounters,
    mouse_speed: f64,
    backspace_window: VecDeque<u64>,
    key_window: VecDeque<u64>,
    scroll_window: VecDeque<u64>,
    counter_resets: u64,
}

impl Default for TelemetryAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryAccumulator {
    pub fn new() -> Self {
        Self {
            last: CumulativeCounters::default(),
            mouse_speed: 0.0,
            backspace_window: VecDeque::with_capacity(ROLLING_WINDOW),
            key_window: VecDeque::with_capacity(ROLLING_WINDOW),
            scroll_window: VecDeque::with_capacity(ROLLING_WINDOW),
            counter_resets: 0,
        }
    }

    /// Ingest the latest cumulative counters.
    ///
    /// A counter that went backwards (collector restart) produces a zero delta
    /// and becomes the new reference value.
    pub fn ingest(&mut self, counters: CumulativeCounters, dt_seconds: f64) -> TelemetryDelta {
        let regressed = counters.mouse_pixels < self.last.mouse_pixels
            || counters.keystrokes < self.last.keystrokes
            || counters.backspaces < self.last.backspaces
            || counters.scroll_steps < self.last.scroll_steps;
        if regressed {
            self.counter_resets += 1;
            tracing::warn!(
                resets = self.counter_resets,
                "cumulative input counter decreased, treating as zero delta"
            );
        }

        let delta = TelemetryDelta {
            mouse_pixels: (counters.mouse_pixels - self.last.mouse_pixels).max(0.0),
            keystrokes: counters.keystrokes.saturating_sub(self.last.keystrokes),
            backspaces: counters.backspaces.saturating_sub(self.last.backspaces),
            scroll_steps: counters.scroll_steps.saturating_sub(self.last.scroll_steps),
        };
        self.last = counters;

        let instant_speed = if dt_seconds > 0.0 {
            delta.mouse_pixels / dt_seconds
        } else {
            0.0
        };
        self.mouse_speed =
            MOUSE_SPEED_EMA_ALPHA * instant_speed + (1.0 - MOUSE_SPEED_EMA_ALPHA) * self.mouse_speed;
        if delta.mouse_pixels < 1.0 {
            self.mouse_speed *= 0.5;
        }

        push_bounded(&mut self.backspace_window, delta.backspaces);
        push_bounded(&mut self.key_window, delta.keystrokes);
        push_bounded(&mut self.scroll_window, delta.scroll_steps);

        delta
    }

    /// Smoothed mouse speed in px/sec
    pub fn mouse_speed(&self) -> f64 {
        self.mouse_speed
    }

    /// Backspaces per keystroke over the rolling window
    pub fn recent_correction_rate(&self) -> f64 {
        let keys: u64 = self.key_window.iter().sum();
        if keys == 0 {
            return 0.0;
        }
        let backspaces: u64 = self.backspace_window.iter().sum();
        backspaces as f64 / keys as f64
    }

    /// Scroll steps over the rolling window
    pub fn recent_scroll_steps(&self) -> u64 {
        self.scroll_window.iter().sum()
    }

    /// Last cumulative counters seen
    pub fn session_totals(&self) -> CumulativeCounters {
        self.last
    }

    /// How many times a counter was observed going backwards
    pub fn counter_resets(&self) -> u64 {
        self.counter_resets
    }
}

/// Delta tracker for a single monotonic total (nap minutes, phantom recovery)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MonotonicTotal {
    last: f64,
}

impl MonotonicTotal {
    pub fn new(initial: f64) -> Self {
        Self { last: initial }
    }

    /// Increment since the previous observation, never negative
    pub fn observe(&mut self, total: f64) -> f64 {
        let delta = (total - self.last).max(0.0);
        self.last = total;
        delta
    }

    pub fn last(&self) -> f64 {
        self.last
    }
}

fn push_bounded(window: &mut VecDeque<u64>, value: u64) {
    window.push_back(value);
    while window.len() > ROLLING_WINDOW {
        window.pop_front();
    }
}
