//! Trend-based stabilization detection for noisy scalar time series.
//!
//! The detector answers one question each tick: has the monitored quantity
//! settled near the target? It only starts accumulating evidence once the
//! control reading is plausibly close to the target, then fits a linear
//! trend over a fixed window of the monitored reading and declares the
//! system stable when the fitted slope is flat within tolerance.

use std::collections::VecDeque;
use std::time::Duration;

/// Thresholds for the stability decision. Slope units are per tick, derived
/// from a physical drift rate and the actual sampling cadence; the window is
/// a fixed tick count, not wall-clock time.
#[derive(Debug, Clone)]
pub struct StabilityCfg {
    /// Window length in samples.
    pub window: usize,
    /// Only accumulate window samples while |control - target| <= this.
    pub approach_band: f64,
    /// Declare stable when |fitted slope| < this (units per tick).
    pub slope_limit: f64,
}

impl StabilityCfg {
    /// Derive the per-tick slope limit from a physical drift bound
    /// (`max_drift` units over `drift_window` wall time) and the tick period.
    pub fn from_drift(
        window: usize,
        approach_band: f64,
        max_drift: f64,
        drift_window: Duration,
        tick: Duration,
    ) -> Self {
        let per_second = max_drift / drift_window.as_secs_f64().max(f64::MIN_POSITIVE);
        Self {
            window,
            approach_band,
            slope_limit: per_second * tick.as_secs_f64(),
        }
    }
}

impl Default for StabilityCfg {
    fn default() -> Self {
        // 0.1 K drift over 2 min, sampled once per second
        Self::from_drift(
            10,
            1.0,
            0.1,
            Duration::from_secs(120),
            Duration::from_secs(1),
        )
    }
}

/// Rolling-window convergence detector. One instance per run; `reset()`
/// clears the window at run start.
#[derive(Debug)]
pub struct StabilityDetector {
    cfg: StabilityCfg,
    window: VecDeque<f64>,
    fit_failures: u64,
}

impl StabilityDetector {
    pub fn new(cfg: StabilityCfg) -> Self {
        let cap = cfg.window.max(2);
        Self {
            cfg,
            window: VecDeque::with_capacity(cap),
            fit_failures: 0,
        }
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }

    /// Diagnostic: number of degenerate fits seen so far.
    pub fn fit_failures(&self) -> u64 {
        self.fit_failures
    }

    /// Feed one tick. `control` is the primary reading compared against
    /// `target`; `monitored` is the (possibly different) scalar whose trend
    /// decides stability. Returns true once the trend is flat.
    pub fn observe(&mut self, target: f64, control: f64, monitored: f64) -> bool {
        // Fast-path rejection: far from target, and no window slot consumed.
        if (control - target).abs() > self.cfg.approach_band {
            return false;
        }

        let cap = self.cfg.window.max(2);
        self.window.push_back(monitored);
        if self.window.len() > cap {
            self.window.pop_front();
        }
        if self.window.len() < cap {
            return false;
        }

        match fit_slope(&self.window) {
            Some(slope) => {
                tracing::debug!(slope, limit = self.cfg.slope_limit, "stability trend");
                slope.abs() < self.cfg.slope_limit
            }
            None => {
                // Degenerate fit must never abort the run.
                self.fit_failures += 1;
                tracing::warn!(fit_failures = self.fit_failures, "stability fit degenerate");
                false
            }
        }
    }
}

/// Least-squares slope of `y` over x = 0..n-1. None for degenerate input.
fn fit_slope(samples: &VecDeque<f64>) -> Option<f64> {
    let n = samples.len();
    if n < 2 {
        return None;
    }
    let nf = n as f64;
    let mean_x = (nf - 1.0) / 2.0;
    let mean_y: f64 = samples.iter().sum::<f64>() / nf;
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (i, y) in samples.iter().enumerate() {
        let dx = i as f64 - mean_x;
        sxx += dx * dx;
        sxy += dx * (y - mean_y);
    }
    let slope = sxy / sxx;
    slope.is_finite().then_some(slope)
}
