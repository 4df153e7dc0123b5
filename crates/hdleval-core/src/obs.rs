//! Structured observability hooks for refinement runs.
//!
//! This module provides:
//! - Run-scoped tracing spans via `RunSpan`
//! - Emission functions for key lifecycle events: start, attempt scored,
//!   fast skip, generator failure, finish
//!
//! Events are emitted at `info!` level (configurable via `HDLEVAL_LOG`).

use tracing::{info, warn, Instrument};

/// Span tagging every log line of one (task, generator, repetition) run.
///
/// Runs are async and may hop threads, so the span is attached to the
/// run future with [`RunSpan::instrument`] instead of being entered.
pub struct RunSpan {
    span: tracing::Span,
}

impl RunSpan {
    pub fn new(task_id: &str, generator: &str, repetition: u32) -> Self {
        let span = tracing::info_span!(
            "hdleval.run",
            task_id = %task_id,
            generator = %generator,
            repetition = repetition,
        );
        Self { span }
    }

    /// Run `fut` inside this span.
    pub fn instrument<F: std::future::Future>(&self, fut: F) -> tracing::instrument::Instrumented<F> {
        fut.instrument(self.span.clone())
    }
}

pub fn emit_run_started(task_id: &str, tier: &str, max_iterations: u32) {
    info!(
        event = "run.started",
        task_id = %task_id,
        tier = %tier,
        max_iterations = max_iterations,
    );
}

/// Emit event: an attempt finished and was scored.
pub fn emit_attempt_scored(attempt: u32, score: f64, syntax_valid: bool, simulation_passed: bool) {
    info!(
        event = "attempt.scored",
        attempt = attempt,
        score = score,
        syntax_valid = syntax_valid,
        simulation_passed = simulation_passed,
    );
}

pub fn emit_fast_skip(attempt: u32, reason: &str, entropy: Option<f64>) {
    info!(event = "attempt.fast_skip", attempt = attempt, reason = %reason, entropy = ?entropy);
}

/// Emit event: the generator failed for an attempt (warning level).
pub fn emit_generator_failed(attempt: u32, error: &dyn std::fmt::Display) {
    warn!(event = "generator.failed", attempt = attempt, error = %error);
}

/// Emit event: an attempt panicked and was recorded as a failure.
pub fn emit_attempt_panicked(task_id: &str, attempt: u32, message: &str) {
    tracing::error!(event = "attempt.panicked", task_id = %task_id, attempt = attempt, message = %message);
}

pub fn emit_run_finished(
    task_id: &str,
    attempts: usize,
    best_score: f64,
    elapsed_secs: f64,
    timed_out: bool,
) {
    info!(
        event = "run.finished",
        task_id = %task_id,
        attempts = attempts,
        best_score = best_score,
        elapsed_secs = elapsed_secs,
        timed_out = timed_out,
    );
}
