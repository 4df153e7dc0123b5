//! Sample-disagreement confidence estimation.
//!
//! Entropy here is a relative instability signal: the mean pairwise edit
//! distance between several generations for the same prompt, rescaled by
//! average sample length and clamped to `[0, 1]`. Only its ordering is
//! meaningful.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Reference length (in characters) used to rescale the mean distance.
pub const REFERENCE_LENGTH: f64 = 100.0;

/// Computes a disagreement score over a set of samples.
pub trait ConfidenceEstimator: Send + Sync {
    /// Whether this estimator produces a real signal. Callers skip extra
    /// sampling entirely when this is `false`.
    fn is_available(&self) -> bool {
        true
    }

    /// Entropy in `[0, 1]`; exactly `0.0` with fewer than two samples.
    fn entropy(&self, samples: &[String]) -> f64;
}

/// Normalized Levenshtein estimator.
#[derive(Debug, Clone, Copy, Default)]
pub struct EditDistanceEstimator;

impl ConfidenceEstimator for EditDistanceEstimator {
    fn entropy(&self, samples: &[String]) -> f64 {
        sample_entropy(samples)
    }
}

/// Stand-in used when confidence tracking is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEstimator;

impl ConfidenceEstimator for NullEstimator {
    fn is_available(&self) -> bool {
        false
    }

    fn entropy(&self, _samples: &[String]) -> f64 {
        0.0
    }
}

/// Similarity in `[0, 1]`: `1 - levenshtein / max_len` over chars.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / longest as f64
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Mean pairwise distance, rescaled by `avg_len / 100` and clamped.
pub fn sample_entropy(samples: &[String]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }

    let mut total = 0.0;
    let mut pairs = 0usize;
    for (i, a) in samples.iter().enumerate() {
        for b in &samples[i + 1..] {
            total += 1.0 - similarity_ratio(a, b);
            pairs += 1;
        }
    }
    let mean_distance = total / pairs as f64;

    let avg_len =
        samples.iter().map(|s| s.chars().count()).sum::<usize>() as f64 / samples.len() as f64;
    let scaled = if avg_len > 0.0 {
        mean_distance / (avg_len / REFERENCE_LENGTH)
    } else {
        mean_distance
    };

    scaled.clamp(0.0, 1.0)
}

/// One (entropy, outcome) observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidencePoint {
    pub entropy: f64,
    pub success: bool,
}

/// Collects entropy against final outcome across runs, so callers can
/// check whether disagreement actually predicts failure.
#[derive(Debug, Default)]
pub struct ConfidenceLedger {
    points: Mutex<Vec<ConfidencePoint>>,
}

impl ConfidenceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outcome. Runs without an entropy reading are ignored.
    pub fn record(&self, entropy: Option<f64>, success: bool) {
        if let Some(entropy) = entropy {
            let mut points = self.points.lock().unwrap_or_else(|e| e.into_inner());
            points.push(ConfidencePoint { entropy, success });
        }
    }

    pub fn len(&self) -> usize {
        self.points.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn points(&self) -> Vec<ConfidencePoint> {
        self.points.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Pearson correlation between entropy and success (1/0).
    ///
    /// `None` with fewer than two points or when either series is constant.
    pub fn correlation(&self) -> Option<f64> {
        let points = self.points();
        if points.len() < 2 {
            return None;
        }
        let n = points.len() as f64;
        let xs: Vec<f64> = points.iter().map(|p| p.entropy).collect();
        let ys: Vec<f64> = points
            .iter()
            .map(|p| if p.success { 1.0 } else { 0.0 })
            .collect();
        let mean_x = xs.iter().sum::<f64>() / n;
        let mean_y = ys.iter().sum::<f64>() / n;

        let mut cov = 0.0;
        let mut var_x = 0.0;
        let mut var_y = 0.0;
        for (x, y) in xs.iter().zip(&ys) {
            let dx = x - mean_x;
            let dy = y - mean_y;
            cov += dx * dy;
            var_x += dx * dx;
            var_y += dy * dy;
        }
        if var_x == 0.0 || var_y == 0.0 {
            return None;
        }
        Some(cov / (var_x.sqrt() * var_y.sqrt()))
    }
}
