//! Formal equivalence reports: parsing checker output and deriving hints.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub use crate::domain::FormalStatus;

/// Structured result of an equivalence check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquivReport {
    pub status: FormalStatus,
    pub equivalent: Option<bool>,
    #[serde(default)]
    pub counterexamples: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl EquivReport {
    fn with_status(status: FormalStatus) -> Self {
        Self {
            status,
            equivalent: None,
            counterexamples: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Checker unavailable or feature disabled.
    pub fn skipped() -> Self {
        Self::with_status(FormalStatus::Skipped)
    }

    pub fn timeout() -> Self {
        Self {
            errors: vec!["Equivalence check timed out".to_string()],
            ..Self::with_status(FormalStatus::Timeout)
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
            ..Self::with_status(FormalStatus::Error)
        }
    }

    /// The report explicitly states the designs differ.
    pub fn is_non_equivalent(&self) -> bool {
        self.status == FormalStatus::Counterexample || self.equivalent == Some(false)
    }
}

fn counterexample_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)counterexample[:\s]+([^\n]*)").ok())
        .as_ref()
}

/// Classify equivalence-checker output.
pub fn parse_equiv_output(stdout: &str, stderr: &str) -> EquivReport {
    let output = format!("{stdout}\n{stderr}");

    if output.contains("Equivalence successfully proven") {
        return EquivReport {
            equivalent: Some(true),
            ..EquivReport::with_status(FormalStatus::Proven)
        };
    }

    if output.contains("Found counterexample")
        || output.contains("Counterexample")
        || output.contains("unproven $equiv cells")
    {
        let counterexamples = counterexample_re()
            .map(|re| {
                re.captures_iter(&output)
                    .filter_map(|c| c.get(1))
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|s| !s.is_empty())
                    .take(5)
                    .collect()
            })
            .unwrap_or_default();
        return EquivReport {
            equivalent: Some(false),
            counterexamples,
            ..EquivReport::with_status(FormalStatus::Counterexample)
        };
    }

    if output.contains("Proved") {
        return EquivReport {
            equivalent: Some(true),
            ..EquivReport::with_status(FormalStatus::Proven)
        };
    }

    if output.contains("ERROR") || output.contains("Error") || stderr.to_lowercase().contains("error") {
        let errors = output
            .lines()
            .filter(|l| l.to_lowercase().contains("error"))
            .map(|l| l.trim().to_string())
            .take(5)
            .collect();
        return EquivReport {
            errors,
            ..EquivReport::with_status(FormalStatus::Error)
        };
    }

    EquivReport::with_status(FormalStatus::Inconclusive)
}

/// Repair hints for a formal report.
pub fn formal_hints(report: &EquivReport) -> Vec<String> {
    let mut hints = Vec::new();
    match report.status {
        FormalStatus::Counterexample => {
            hints.push(
                "Logic equivalence check failed - design behavior differs from reference"
                    .to_string(),
            );
            if !report.counterexamples.is_empty() {
                hints.push("Review counterexample to identify incorrect signal behavior".to_string());
            }
        }
        FormalStatus::Error => {
            for error in report.errors.iter().take(3) {
                let lower = error.to_lowercase();
                if lower.contains("syntax") {
                    hints.push("Syntax error detected during formal verification".to_string());
                } else if lower.contains("port") {
                    hints.push("Port mismatch between reference and generated design".to_string());
                }
            }
        }
        _ => {}
    }
    hints
}
