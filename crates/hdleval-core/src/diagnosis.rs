//! Semantic diagnosis: folds oracle signals into a severity and repair hints.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::formal::{formal_hints, EquivReport, FormalStatus};
use crate::waveform::{mismatch_hints, WaveformDiff};

/// Number of compile errors inspected for keyword hints.
const COMPILE_ERRORS_INSPECTED: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Syntax,
    Semantic,
    #[default]
    Unknown,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Syntax => "syntax",
            Severity::Semantic => "semantic",
            Severity::Unknown => "unknown",
        })
    }
}

/// Classification of one attempt's failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub severity: Severity,
    pub primary_issue: String,
    /// Ordered, not deduplicated.
    pub hints: Vec<String>,
}

/// Oracle signals for a single attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiagnosisInput<'a> {
    pub compile_errors: &'a [String],
    pub sim_errors: &'a [String],
    pub waveform: Option<&'a WaveformDiff>,
    pub formal: Option<&'a EquivReport>,
}

impl DiagnosisInput<'_> {
    fn has_waveform_mismatch(&self) -> bool {
        self.waveform.is_some_and(|w| !w.is_empty())
    }

    fn formal_non_equivalent(&self) -> bool {
        self.formal.is_some_and(EquivReport::is_non_equivalent)
    }

    /// Severity from the signals alone: compile errors dominate.
    pub fn severity(&self) -> Severity {
        if !self.compile_errors.is_empty() {
            Severity::Syntax
        } else if !self.sim_errors.is_empty()
            || self.has_waveform_mismatch()
            || self.formal_non_equivalent()
        {
            Severity::Semantic
        } else {
            Severity::Unknown
        }
    }
}

/// Produces a [`Diagnosis`] from oracle signals.
pub trait Diagnoser: Send + Sync {
    fn diagnose(&self, input: &DiagnosisInput<'_>) -> Diagnosis;
}

/// Keyword and pattern based diagnosis over every available signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct SemanticDiagnoser;

impl SemanticDiagnoser {
    fn compile_hints(errors: &[String], hints: &mut Vec<String>) {
        for error in errors.iter().take(COMPILE_ERRORS_INSPECTED) {
            let lower = error.to_lowercase();
            if lower.contains("port") {
                hints.push("Check port declarations match module interface".to_string());
            } else if lower.contains("syntax") {
                hints.push("Fix syntax error in code structure".to_string());
            } else if lower.contains("undefined") {
                hints.push("Declare missing signal or variable".to_string());
            }
        }
    }
}

impl Diagnoser for SemanticDiagnoser {
    fn diagnose(&self, input: &DiagnosisInput<'_>) -> Diagnosis {
        let severity = input.severity();
        let primary_issue = match severity {
            Severity::Syntax => "Compilation failed",
            Severity::Semantic if input.has_waveform_mismatch() => "Waveform mismatch detected",
            Severity::Semantic if !input.sim_errors.is_empty() => "Simulation failed",
            Severity::Semantic => "Formal equivalence failed",
            Severity::Unknown => "Unknown failure",
        }
        .to_string();

        let mut hints = Vec::new();
        Self::compile_hints(input.compile_errors, &mut hints);

        if let Some(diff) = input.waveform {
            hints.extend(mismatch_hints(diff));
        }

        if let Some(report) = input.formal {
            if report.status == FormalStatus::Counterexample {
                hints.extend(formal_hints(report));
            }
        }

        if hints.is_empty() && severity == Severity::Semantic {
            hints.push("Review logic implementation for correctness".to_string());
        }

        Diagnosis {
            severity,
            primary_issue,
            hints,
        }
    }
}

/// Classifies severity but produces no hints.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDiagnoser;

impl Diagnoser for NullDiagnoser {
    fn diagnose(&self, input: &DiagnosisInput<'_>) -> Diagnosis {
        Diagnosis {
            severity: input.severity(),
            primary_issue: String::new(),
            hints: Vec::new(),
        }
    }
}
