// src/filter.rs - Adaptive one-pole smoothing for landmark coordinates
use crate::config::FilterConfig;
use crate::landmarks::Keypoint;
use std::f64::consts::PI;

/// One-euro filter over a single timestamped scalar.
///
/// Slow motion lowers the cutoff (strong jitter rejection), fast motion
/// raises it (low lag). The first sample after construction or `reset()`
/// passes through untouched.
#[derive(Debug, Clone)]
pub struct OneEuroFilter {
    min_cutoff: f64,
    beta: f64,
    d_cutoff: f64,
    state: Option<FilterState>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct FilterState {
    previous_value: f64,
    previous_derivative: f64,
    previous_timestamp: i64,
}

impl OneEuroFilter {
    pub const DEFAULT_D_CUTOFF: f64 = 1.0;

    pub fn new(min_cutoff: f64, beta: f64) -> Self {
        Self::with_derivative_cutoff(min_cutoff, beta, Self::DEFAULT_D_CUTOFF)
    }

    pub fn with_derivative_cutoff(min_cutoff: f64, beta: f64, d_cutoff: f64) -> Self {
        Self {
            min_cutoff,
            beta,
            d_cutoff,
            state: None,
        }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::with_derivative_cutoff(config.min_cutoff, config.beta, config.d_cutoff)
    }

    fn alpha(cutoff: f64, dt: f64) -> f64 {
        let r = 2.0 * PI * cutoff * dt;
        r / (r + 1.0)
    }

    pub fn filter(&mut self, value: f64, timestamp_ms: i64) -> f64 {
        let Some(prev) = self.state else {
            self.state = Some(FilterState {
                previous_value: value,
                previous_derivative: 0.0,
                previous_timestamp: timestamp_ms,
            });
            return value;
        };

        let dt = timestamp_ms.saturating_sub(prev.previous_timestamp) as f64 / 1000.0;
        if dt <= 0.0 {
            return prev.previous_value;
        }

        let dx = (value - prev.previous_value) / dt;
        let a_d = Self::alpha(self.d_cutoff, dt);
        let dx_hat = a_d * dx + (1.0 - a_d) * prev.previous_derivative;

        let cutoff = self.min_cutoff + self.beta * dx_hat.abs();
        let a = Self::alpha(cutoff, dt);
        let smoothed = a * value + (1.0 - a) * prev.previous_value;

        self.state = Some(FilterState {
            previous_value: smoothed,
            previous_derivative: dx_hat,
            previous_timestamp: timestamp_ms,
        });
        smoothed
    }

    pub fn reset(&mut self) {
        self.state = None;
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }
}

/// Pair of filters for a landmark's image-plane position. `z` is passed
/// through since nothing downstream reads it.
#[derive(Debug, Clone)]
pub struct PointFilter {
    x: OneEuroFilter,
    y: OneEuroFilter,
}

impl PointFilter {
    pub fn from_config(config: &FilterConfig) -> Self {
        Self {
            x: OneEuroFilter::from_config(config),
            y: OneEuroFilter::from_config(config),
        }
    }

    pub fn filter(&mut self, point: &Keypoint, timestamp_ms: i64) -> Keypoint {
        Keypoint {
            x: self.x.filter(point.x, timestamp_ms),
            y: self.y.filter(point.y, timestamp_ms),
            z: point.z,
        }
    }

    pub fn reset(&mut self) {
        self.x.reset();
        self.y.reset();
    }
}
