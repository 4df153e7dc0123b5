use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{AttemptRecord, EvaluationMetrics, FastSkipReason, RunOutcome};
use crate::feedback::truncate_to;
use crate::tiering::Tier;

/// Feedback is clipped to this many bytes in iteration history artifacts.
const HISTORY_FEEDBACK_LEN: usize = 200;

/// One line of the results sink: a run's best attempt plus run facts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub evaluated_at: DateTime<Utc>,
    pub tier: Tier,
    pub score: f64,
    pub attempts: usize,
    pub elapsed_secs: f64,
    /// Why the run stopped early, independent of the best attempt's own tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_skip: Option<FastSkipReason>,
    #[serde(flatten)]
    pub metrics: EvaluationMetrics,
}

impl RunRecord {
    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            evaluated_at: Utc::now(),
            tier: outcome.tier,
            score: outcome.best.score(),
            attempts: outcome.history.len(),
            elapsed_secs: outcome.elapsed_secs,
            terminal_skip: outcome.terminal_skip,
            metrics: outcome.best.clone(),
        }
    }

    /// The run hit its wall-clock budget.
    pub fn timed_out(&self) -> bool {
        self.terminal_skip == Some(FastSkipReason::Timeout)
            || self.metrics.attempt.fast_skip_reason == Some(FastSkipReason::Timeout)
    }
}

/// Append `record` as one JSON line to `path`, creating the file if needed.
pub fn append_run_record(path: &Path, record: &RunRecord) -> Result<()> {
    let line = serde_json::to_string(record).context("serialize run record")?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {:?}", path))?;
    writeln!(file, "{line}").with_context(|| format!("append to {:?}", path))?;
    Ok(())
}

/// Read every record from a JSON-lines results file. Blank lines are skipped.
pub fn read_run_records(path: &Path) -> Result<Vec<RunRecord>> {
    let file = std::fs::File::open(path).with_context(|| format!("open {:?}", path))?;
    let mut records = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("read {:?}", path))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .with_context(|| format!("parse {:?} line {}", path, n + 1))?;
        records.push(record);
    }
    Ok(records)
}

/// One entry of `iteration_history.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IterationHistoryEntry {
    pub attempt: u32,
    pub score: f64,
    pub syntax_valid: bool,
    pub simulation_passed: bool,
    pub feedback: Option<String>,
}

impl From<&AttemptRecord> for IterationHistoryEntry {
    fn from(record: &AttemptRecord) -> Self {
        Self {
            attempt: record.attempt.index,
            score: record.score,
            syntax_valid: record.attempt.syntax_valid,
            simulation_passed: record.attempt.simulation_passed,
            feedback: record
                .feedback
                .as_deref()
                .map(|f| truncate_to(f, HISTORY_FEEDBACK_LEN).to_string()),
        }
    }
}

/// Write iteration_history.json in pretty JSON format.
pub fn write_iteration_history(path: &Path, history: &[AttemptRecord]) -> Result<()> {
    let entries: Vec<IterationHistoryEntry> = history.iter().map(Into::into).collect();
    let content = serde_json::to_string_pretty(&entries).context("serialize iteration history")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Aggregate figures for one generator across runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratorSummary {
    pub generator: String,
    pub runs: usize,
    pub syntax_valid_rate: f64,
    pub simulation_pass_rate: f64,
    pub avg_iterations: f64,
    pub avg_entropy: Option<f64>,
    pub entropy_skips: usize,
    pub timeouts: usize,
}

/// Per-generator summary, ordered by generator name.
pub fn summarize(records: &[RunRecord]) -> Vec<GeneratorSummary> {
    let mut by_generator: BTreeMap<&str, Vec<&RunRecord>> = BTreeMap::new();
    for record in records {
        by_generator
            .entry(record.metrics.generator.as_str())
            .or_default()
            .push(record);
    }

    by_generator
        .into_iter()
        .map(|(generator, runs)| {
            let n = runs.len() as f64;
            let rate = |pred: &dyn Fn(&RunRecord) -> bool| {
                runs.iter().filter(|r| pred(r)).count() as f64 / n
            };
            let entropies: Vec<f64> = runs
                .iter()
                .filter_map(|r| r.metrics.attempt.confidence_entropy)
                .collect();
            let skips = |reason: FastSkipReason| {
                runs.iter()
                    .filter(|r| r.metrics.attempt.fast_skip_reason == Some(reason))
                    .count()
            };

            GeneratorSummary {
                generator: generator.to_string(),
                runs: runs.len(),
                syntax_valid_rate: rate(&|r: &RunRecord| r.metrics.attempt.syntax_valid),
                simulation_pass_rate: rate(&|r: &RunRecord| r.metrics.attempt.simulation_passed),
                avg_iterations: runs.iter().map(|r| r.attempts as f64).sum::<f64>() / n,
                avg_entropy: if entropies.is_empty() {
                    None
                } else {
                    Some(entropies.iter().sum::<f64>() / entropies.len() as f64)
                },
                entropy_skips: skips(FastSkipReason::EntropyHigh),
                timeouts: runs.iter().filter(|r| r.timed_out()).count(),
            }
        })
        .collect()
}

/// Render summaries as a fixed-width text table.
pub fn render_summary_table(summaries: &[GeneratorSummary]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<24} {:>5} {:>8} {:>8} {:>7} {:>8}\n",
        "generator", "runs", "syntax", "sim", "iters", "entropy"
    ));
    for s in summaries {
        let entropy = s
            .avg_entropy
            .map(|e| format!("{e:.3}"))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<24} {:>5} {:>7.1}% {:>7.1}% {:>7.2} {:>8}\n",
            s.generator,
            s.runs,
            s.syntax_valid_rate * 100.0,
            s.simulation_pass_rate * 100.0,
            s.avg_iterations,
            entropy
        ));
    }
    out
}
