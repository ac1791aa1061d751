// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 VisionRT Contributors
#![forbid(unsafe_code)]

//! Format ranking
//!
//! Candidates are ranked by `α·ln(√(w·h)) + β·ln(fps)`, a log-scale trade-off
//! between linear resolution and frame rate.

/// Default weight of both the resolution and frame-rate terms.
pub const DEFAULT_WEIGHT: f64 = 1.5;

/// Weights of the format scoring rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scoring {
    /// Weight of the linear resolution term `ln(√(w·h))`
    pub alpha: f64,
    /// Weight of the frame-rate term `ln(fps)`
    pub beta: f64,
}

impl Default for Scoring {
    fn default() -> Self {
        Scoring {
            alpha: DEFAULT_WEIGHT,
            beta: DEFAULT_WEIGHT,
        }
    }
}

impl Scoring {
    pub fn new(alpha: f64, beta: f64) -> Self {
        Scoring { alpha, beta }
    }

    /// Score one mode. Unusable modes (no frame rate, or a zero dimension)
    /// score negative infinity.
    pub fn score(&self, fps: f64, width: u32, height: u32) -> f64 {
        if fps.is_nan() || fps <= 0.0 || width == 0 || height == 0 {
            return f64::NEG_INFINITY;
        }

        let pixels = f64::from(width) * f64::from(height);
        self.alpha * pixels.sqrt().ln() + self.beta * fps.ln()
    }

    /// Index of the best `(fps, width, height)` candidate.
    ///
    /// Only a strictly greater score replaces the current best, so ties keep
    /// the earliest candidate. Returns `None` when the list is empty or every
    /// candidate is unusable.
    pub fn best_candidate<I>(&self, candidates: I) -> Option<usize>
    where
        I: IntoIterator<Item = (f64, u32, u32)>,
    {
        let mut best = None;
        let mut best_score = f64::NEG_INFINITY;

        for (index, (fps, width, height)) in candidates.into_iter().enumerate() {
            let score = self.score(fps, width, height);
            if score > best_score {
                best_score = score;
                best = Some(index);
            }
        }

        best
    }
}

/// Score a mode with the default weights.
pub fn score(fps: f64, width: u32, height: u32) -> f64 {
    Scoring::default().score(fps, width, height)
}
