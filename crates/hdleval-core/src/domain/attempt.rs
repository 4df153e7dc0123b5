//! Attempts, scoring and the externally visible run summary.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tiering::Tier;

/// Why a later verification stage was bypassed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FastSkipReason {
    /// Samples disagreed too much to be worth simulating.
    EntropyHigh,
    /// The task's wall-clock budget ran out.
    Timeout,
}

impl FastSkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FastSkipReason::EntropyHigh => "entropy_high",
            FastSkipReason::Timeout => "timeout",
        }
    }
}

impl fmt::Display for FastSkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a formal equivalence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormalStatus {
    Proven,
    Counterexample,
    Inconclusive,
    Timeout,
    Error,
    Skipped,
}

impl FormalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormalStatus::Proven => "proven",
            FormalStatus::Counterexample => "counterexample",
            FormalStatus::Inconclusive => "inconclusive",
            FormalStatus::Timeout => "timeout",
            FormalStatus::Error => "error",
            FormalStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for FormalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Post-synthesis resource figures for a candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynthesisStats {
    pub success: bool,
    pub cell_count: Option<u64>,
    pub synth_time: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// One generate-and-verify cycle of a refinement run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// 1-based attempt index.
    pub index: u32,
    pub generated_code: String,
    pub syntax_valid: bool,
    pub compile_errors: Vec<String>,
    pub simulation_passed: bool,
    pub test_cases_passed: u32,
    pub test_cases_total: u32,
    pub generation_time: f64,
    pub compile_time: f64,
    pub simulation_time: f64,
    pub confidence_entropy: Option<f64>,
    pub formal_status: Option<FormalStatus>,
    pub waveform_diff_summary: Option<String>,
    pub repair_hints: Vec<String>,
    pub fast_skip_reason: Option<FastSkipReason>,
}

impl Attempt {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    /// Deterministic score of this attempt alone.
    ///
    /// +1 for valid syntax; +2 plus the pass fraction when simulation
    /// passed; +`(1 - entropy) / 2` when an entropy reading exists.
    pub fn score(&self) -> f64 {
        let mut score = 0.0;
        if self.syntax_valid {
            score += 1.0;
        }
        if self.simulation_passed {
            score += 2.0;
            if self.test_cases_total > 0 {
                score += f64::from(self.test_cases_passed) / f64::from(self.test_cases_total);
            }
        }
        if let Some(entropy) = self.confidence_entropy {
            score += (1.0 - entropy) * 0.5;
        }
        score
    }

    /// Compiled and passed simulation.
    pub fn succeeded(&self) -> bool {
        self.syntax_valid && self.simulation_passed
    }

    /// Record a simulation result. A pass is only kept for attempts that
    /// compiled.
    pub fn record_simulation(&mut self, passed: bool, tests_passed: u32, tests_total: u32) {
        self.simulation_passed = passed && self.syntax_valid;
        self.test_cases_passed = tests_passed;
        self.test_cases_total = tests_total;
    }
}

/// Summary of the best attempt of a (task, generator, repetition) run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub task_id: String,
    pub generator: String,
    pub repetition: u32,
    /// Index of the attempt that produced this result.
    pub iteration_count: u32,
    #[serde(flatten)]
    pub attempt: Attempt,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesis: Option<SynthesisStats>,
}

impl EvaluationMetrics {
    pub fn from_attempt(
        task_id: impl Into<String>,
        generator: impl Into<String>,
        repetition: u32,
        attempt: Attempt,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            generator: generator.into(),
            repetition,
            iteration_count: attempt.index,
            attempt,
            synthesis: None,
        }
    }

    pub fn score(&self) -> f64 {
        self.attempt.score()
    }
}

/// History entry for one attempt, with the feedback it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: Attempt,
    pub score: f64,
    /// Feedback composed from this attempt for the next prompt.
    pub feedback: Option<String>,
}

/// Everything a refinement run produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub best: EvaluationMetrics,
    pub history: Vec<AttemptRecord>,
    pub tier: Tier,
    pub elapsed_secs: f64,
    /// Set when the run was cut short rather than stopping on its own,
    /// whichever attempt ended up best.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_skip: Option<FastSkipReason>,
}

impl RunOutcome {
    pub fn attempts(&self) -> usize {
        self.history.len()
    }
}
