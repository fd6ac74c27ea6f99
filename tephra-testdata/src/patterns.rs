// Tephra Testdata - Signal patterns
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Shapes of simulated sensor values over time.
//!
//! [`SignalPattern`] is the declarative shape; [`Signal`] pairs it with the
//! random walk position and the hard bounds of the sensor it feeds.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// How a simulated value moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalPattern {
    /// Fixed level.
    Constant { level: f64 },

    /// Periodic swing around `mean`, e.g. a daily temperature cycle.
    Sine {
        mean: f64,
        amplitude: f64,
        period_ms: u64,
        /// Radians
        #[serde(default)]
        phase: f64,
    },

    /// Gaussian steps from `start`, held inside `[min, max]`.
    RandomWalk {
        start: f64,
        step_std: f64,
        min: f64,
        max: f64,
    },

    /// Independent draws from `[min, max)`.
    Uniform { min: f64, max: f64 },
}

impl SignalPattern {
    /// Stateless value at `t_ms`. A random walk stays at its start.
    pub fn value_at(&self, t_ms: u64, rng: &mut (impl Rng + ?Sized)) -> f64 {
        match *self {
            SignalPattern::Constant { level } => level,
            SignalPattern::Sine {
                mean,
                amplitude,
                period_ms,
                phase,
            } => {
                let cycles = t_ms as f64 / period_ms.max(1) as f64;
                mean + amplitude * (TAU * cycles + phase).sin()
            }
            SignalPattern::RandomWalk { start, .. } => start,
            SignalPattern::Uniform { min, max } if max > min => rng.gen_range(min..max),
            SignalPattern::Uniform { min, .. } => min,
        }
    }
}

/// A pattern bound to one sensor: walk state plus clamping range.
#[derive(Debug, Clone)]
pub struct Signal {
    pattern: SignalPattern,
    position: f64,
    min: f64,
    max: f64,
}

impl Signal {
    /// Signal clamped to `[min, max]`.
    pub fn new(pattern: SignalPattern, min: f64, max: f64) -> Self {
        let position = match pattern {
            SignalPattern::RandomWalk { start, .. } => start,
            _ => 0.0,
        };
        Self {
            pattern,
            position,
            min,
            max,
        }
    }

    /// Random walk bounded by its own range.
    pub fn walk(start: f64, step_std: f64, min: f64, max: f64) -> Self {
        Self::new(
            SignalPattern::RandomWalk {
                start,
                step_std,
                min,
                max,
            },
            min,
            max,
        )
    }

    /// Uniform noise over `[min, max)`.
    pub fn uniform(min: f64, max: f64) -> Self {
        Self::new(SignalPattern::Uniform { min, max }, min, max)
    }

    pub fn pattern(&self) -> &SignalPattern {
        &self.pattern
    }

    /// Advance to `t_ms` and return the clamped value.
    pub fn next(&mut self, t_ms: u64, rng: &mut (impl Rng + ?Sized)) -> f64 {
        let raw = match self.pattern {
            SignalPattern::RandomWalk {
                step_std, min, max, ..
            } => {
                // A negative or NaN deviation leaves the walk in place
                if let Ok(step) = Normal::new(0.0, step_std.abs()) {
                    self.position += step.sample(rng);
                }
                self.position = self.position.clamp(min, max);
                self.position
            }
            ref other => other.value_at(t_ms, rng),
        };
        raw.clamp(self.min, self.max)
    }
}
