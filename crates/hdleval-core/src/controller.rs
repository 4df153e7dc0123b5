//! The iterative refinement controller.
//!
//! Drives one (task, generator, repetition) run: generate, post-process,
//! sample for confidence, compile, gate on entropy, check equivalence,
//! simulate and diff waveforms, diagnose, score, compose feedback, and
//! decide whether to go again. The run never fails: every fault is folded
//! into the attempt that hit it.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::{CacheKey, CachedGeneration, GenerationCache, NoCache};
use crate::confidence::{ConfidenceEstimator, ConfidenceLedger, NullEstimator};
use crate::diagnosis::{Diagnoser, DiagnosisInput, SemanticDiagnoser};
use crate::domain::{
    Attempt, AttemptRecord, EvaluationMetrics, FastSkipReason, RunConfiguration, RunOutcome, Task,
};
use crate::feedback::{FeedbackComposer, FeedbackInput};
use crate::formal::EquivReport;
use crate::generator::{generate_with_fallback, Generator, GeneratorError, Passthrough, PostProcess};
use crate::metrics::METRICS;
use crate::obs::{self, RunSpan};
use crate::oracle::{
    Candidate, Compiler, EquivalenceChecker, NullCompiler, NullEquivalenceChecker, NullSimulator,
    NullWaveformAnalyzer, SimulationOptions, Simulator, WaveformAnalyzer,
};
use crate::prompt::{prompt_for_attempt, ConstrainedPrompt, PromptStrategy};
use crate::reporting::write_iteration_history;
use crate::tiering::{plan_for_task, Tier};
use crate::waveform::WaveformDiff;

/// Everything the controller talks to besides the generator.
///
/// Defaults are null implementations, so a bare `Collaborators::default()`
/// runs generation and scoring only.
#[derive(Clone)]
pub struct Collaborators {
    pub compiler: Arc<dyn Compiler>,
    pub simulator: Arc<dyn Simulator>,
    pub equivalence: Arc<dyn EquivalenceChecker>,
    pub waveform: Arc<dyn WaveformAnalyzer>,
    pub confidence: Arc<dyn ConfidenceEstimator>,
    pub diagnoser: Arc<dyn Diagnoser>,
    pub cache: Arc<dyn GenerationCache>,
    pub post_process: Arc<dyn PostProcess>,
    pub prompts: Arc<dyn PromptStrategy>,
    pub ledger: Arc<ConfidenceLedger>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            compiler: Arc::new(NullCompiler),
            simulator: Arc::new(NullSimulator),
            equivalence: Arc::new(NullEquivalenceChecker),
            waveform: Arc::new(NullWaveformAnalyzer),
            confidence: Arc::new(NullEstimator),
            diagnoser: Arc::new(SemanticDiagnoser),
            cache: Arc::new(NoCache),
            post_process: Arc::new(Passthrough),
            prompts: Arc::new(ConstrainedPrompt),
            ledger: Arc::new(ConfidenceLedger::new()),
        }
    }
}

impl Collaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn with_simulator(mut self, simulator: Arc<dyn Simulator>) -> Self {
        self.simulator = simulator;
        self
    }

    pub fn with_equivalence(mut self, checker: Arc<dyn EquivalenceChecker>) -> Self {
        self.equivalence = checker;
        self
    }

    pub fn with_waveform(mut self, analyzer: Arc<dyn WaveformAnalyzer>) -> Self {
        self.waveform = analyzer;
        self
    }

    pub fn with_confidence(mut self, estimator: Arc<dyn ConfidenceEstimator>) -> Self {
        self.confidence = estimator;
        self
    }

    pub fn with_diagnoser(mut self, diagnoser: Arc<dyn Diagnoser>) -> Self {
        self.diagnoser = diagnoser;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn GenerationCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_post_process(mut self, post_process: Arc<dyn PostProcess>) -> Self {
        self.post_process = post_process;
        self
    }

    pub fn with_prompts(mut self, prompts: Arc<dyn PromptStrategy>) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<ConfidenceLedger>) -> Self {
        self.ledger = ledger;
        self
    }
}

/// Stopping policy.
///
/// `attempt` is the 1-based index of the attempt just finished and
/// `history` holds every attempt so far, that one included.
pub fn should_continue(config: &RunConfiguration, attempt: u32, history: &[AttemptRecord]) -> bool {
    if attempt >= config.max_iterations {
        return false;
    }
    if !config.adaptive_stopping {
        return true;
    }
    if history.last().is_some_and(|r| r.attempt.succeeded()) {
        return false;
    }
    if let [.., previous, last] = history {
        if last.score - previous.score < config.min_improvement {
            return false;
        }
    }
    true
}

/// The highest-scoring record; ties go to the earliest.
pub fn best_attempt(history: &[AttemptRecord]) -> Option<&AttemptRecord> {
    history.iter().fold(None, |best, record| match best {
        Some(b) if record.score > b.score => Some(record),
        Some(b) => Some(b),
        None => Some(record),
    })
}

struct RunContext<'a> {
    task: &'a Task,
    generator: &'a dyn Generator,
    config: &'a RunConfiguration,
    tier: Tier,
    composer: &'a FeedbackComposer,
    run_dir: &'a Path,
    started: Instant,
    budget: Duration,
}

impl RunContext<'_> {
    fn remaining_budget(&self) -> Duration {
        self.budget.saturating_sub(self.started.elapsed())
    }
}

struct AttemptResult {
    attempt: Attempt,
    /// Feedback for the next prompt; `None` keeps the previous feedback.
    feedback: Option<String>,
}

pub struct RefinementController {
    config: RunConfiguration,
    collaborators: Collaborators,
    artifacts_root: Option<PathBuf>,
}

impl RefinementController {
    pub fn new(config: RunConfiguration, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
            artifacts_root: None,
        }
    }

    /// Keep per-attempt sources and `iteration_history.json` under `root`.
    /// Without it, candidates go to a scratch directory removed after the run.
    pub fn with_artifacts(mut self, root: impl Into<PathBuf>) -> Self {
        self.artifacts_root = Some(root.into());
        self
    }

    pub fn config(&self) -> &RunConfiguration {
        &self.config
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Run the refinement loop. Always returns the best attempt seen.
    pub async fn run(&self, task: &Task, generator: &dyn Generator, repetition: u32) -> RunOutcome {
        let span = RunSpan::new(&task.task_id, generator.name(), repetition);
        span.instrument(self.run_inner(task, generator, repetition))
            .await
    }

    async fn run_inner(&self, task: &Task, generator: &dyn Generator, repetition: u32) -> RunOutcome {
        let plan = plan_for_task(&self.config, task);
        let config = &plan.config;
        let composer = FeedbackComposer::new(config.feedback_max_len)
            .with_category_feedback(config.category_feedback);
        let (run_dir, _scratch) = self.prepare_run_dir(task, generator.name(), repetition);

        let ctx = RunContext {
            task,
            generator,
            config,
            tier: plan.tier,
            composer: &composer,
            run_dir: &run_dir,
            started: Instant::now(),
            budget: config.task_budget(),
        };

        obs::emit_run_started(&task.task_id, plan.tier.as_str(), config.max_iterations);

        let mut history: Vec<AttemptRecord> = Vec::new();
        let mut feedback: Option<String> = None;
        let mut timed_out = false;

        for index in 1..=config.max_iterations.max(1) {
            METRICS.inc_attempts();

            let AttemptResult {
                mut attempt,
                feedback: next_feedback,
            } = AssertUnwindSafe(self.run_attempt(&ctx, index, feedback.as_deref()))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    let message = panic_message(&*panic);
                    obs::emit_attempt_panicked(&task.task_id, index, &message);
                    let mut attempt = Attempt::new(index);
                    attempt.compile_errors = vec![format!("internal error: {message}")];
                    AttemptResult {
                        attempt,
                        feedback: None,
                    }
                });

            if ctx.started.elapsed() > ctx.budget {
                timed_out = true;
                METRICS.inc_timeouts();
                if attempt.fast_skip_reason.is_none() {
                    attempt.fast_skip_reason = Some(FastSkipReason::Timeout);
                }
            }

            let score = attempt.score();
            obs::emit_attempt_scored(index, score, attempt.syntax_valid, attempt.simulation_passed);

            if let Some(text) = &next_feedback {
                feedback = Some(text.clone());
            }
            history.push(AttemptRecord {
                attempt,
                score,
                feedback: next_feedback,
            });

            if timed_out || !should_continue(config, index, &history) {
                break;
            }
        }

        if self.artifacts_root.is_some() {
            let path = run_dir.join("iteration_history.json");
            if let Err(e) = write_iteration_history(&path, &history) {
                warn!(error = %e, "failed to write iteration history");
            }
        }

        let (best, best_score) = best_attempt(&history)
            .map(|r| (r.attempt.clone(), r.score))
            .unwrap_or_else(|| (Attempt::new(1), 0.0));
        let elapsed_secs = ctx.started.elapsed().as_secs_f64();
        obs::emit_run_finished(&task.task_id, history.len(), best_score, elapsed_secs, timed_out);

        RunOutcome {
            best: EvaluationMetrics::from_attempt(
                task.task_id.clone(),
                generator.name(),
                repetition,
                best,
            ),
            history,
            tier: plan.tier,
            elapsed_secs,
            terminal_skip: timed_out.then_some(FastSkipReason::Timeout),
        }
    }

    async fn run_attempt(
        &self,
        ctx: &RunContext<'_>,
        index: u32,
        feedback: Option<&str>,
    ) -> AttemptResult {
        let c = &self.collaborators;
        let task = ctx.task;
        let config = ctx.config;
        let mut attempt = Attempt::new(index);

        let prompt = prompt_for_attempt(c.prompts.as_ref(), task, feedback);

        let raw = match self.generate_primary(ctx, index, &prompt).await {
            Ok((code, secs)) => {
                attempt.generation_time = secs;
                code
            }
            Err(e) => {
                obs::emit_generator_failed(index, &e);
                METRICS.inc_generator_failures();
                attempt.compile_errors = vec![format!("generation failed: {e}")];
                return AttemptResult {
                    attempt,
                    feedback: None,
                };
            }
        };

        let code = c.post_process.apply(&raw, task);
        let candidate = write_candidate(ctx, index, &code);
        attempt.generated_code = code;

        if config.confidence.enabled && c.confidence.is_available() {
            let samples = self.collect_samples(ctx, &prompt, &attempt.generated_code).await;
            attempt.confidence_entropy = Some(c.confidence.entropy(&samples));
        }

        if c.compiler.is_available() {
            let t = Instant::now();
            let outcome = c.compiler.compile(&candidate, config.timeouts.compile()).await;
            attempt.compile_time = t.elapsed().as_secs_f64();
            attempt.syntax_valid = outcome.ok;
            attempt.compile_errors = outcome.diagnostics;
        }

        if config.entropy_gate.trips(attempt.confidence_entropy) {
            attempt.fast_skip_reason = Some(FastSkipReason::EntropyHigh);
            METRICS.inc_entropy_skips();
            obs::emit_fast_skip(index, FastSkipReason::EntropyHigh.as_str(), attempt.confidence_entropy);
        }
        let gate_open = attempt.fast_skip_reason.is_none();

        let mut formal_report = None;
        if config.formal_verification && attempt.syntax_valid && gate_open {
            let report = self.check_equivalence(ctx, &candidate).await;
            attempt.formal_status = Some(report.status);
            formal_report = Some(report);
        }

        let mut sim_errors = Vec::new();
        let mut waveform_diff: Option<WaveformDiff> = None;
        if attempt.syntax_valid && gate_open && c.simulator.is_available() {
            if let Some(testbench) = task.reference_testbench.as_deref() {
                let want_trace = config.waveform_analysis
                    && c.waveform.is_available()
                    && task.reference_hdl.is_some();
                let options = SimulationOptions {
                    timeout: config.timeouts.simulate(),
                    dump_vcd: want_trace,
                };

                let t = Instant::now();
                let outcome = c.simulator.simulate(&candidate, testbench, &options).await;
                attempt.simulation_time = t.elapsed().as_secs_f64();
                attempt.record_simulation(outcome.passed, outcome.tests_passed, outcome.tests_total);

                if !attempt.simulation_passed {
                    sim_errors = if outcome.errors.is_empty() {
                        vec![format!(
                            "{}/{} tests passed",
                            outcome.tests_passed, outcome.tests_total
                        )]
                    } else {
                        outcome.errors.clone()
                    };
                }

                if let (true, Some(trace), Some(reference)) =
                    (want_trace, outcome.trace.as_deref(), task.reference_hdl.as_deref())
                {
                    waveform_diff = c
                        .waveform
                        .diff(reference, testbench, trace, &candidate, config.timeouts.simulate())
                        .await;
                    attempt.waveform_diff_summary = waveform_diff.as_ref().map(WaveformDiff::summary);
                }
            }
        }

        let diagnosis = c.diagnoser.diagnose(&DiagnosisInput {
            compile_errors: &attempt.compile_errors,
            sim_errors: &sim_errors,
            waveform: waveform_diff.as_ref(),
            formal: formal_report.as_ref(),
        });
        attempt.repair_hints = diagnosis.hints;
        debug!(attempt = index, severity = %diagnosis.severity, "diagnosed");

        c.ledger.record(attempt.confidence_entropy, attempt.succeeded());

        let next_feedback = if attempt.succeeded() {
            None
        } else {
            let text = ctx.composer.render(&FeedbackInput {
                compile_errors: &attempt.compile_errors,
                sim_errors: &sim_errors,
                waveform: waveform_diff.as_ref(),
                hints: &attempt.repair_hints,
                category: task.category,
                code: &attempt.generated_code,
            });
            (!text.is_empty()).then_some(text)
        };

        AttemptResult {
            attempt,
            feedback: next_feedback,
        }
    }

    /// Primary generation for an attempt, served from the cache when possible.
    async fn generate_primary(
        &self,
        ctx: &RunContext<'_>,
        index: u32,
        prompt: &str,
    ) -> Result<(String, f64), GeneratorError> {
        let cache = &self.collaborators.cache;
        let key = ctx.config.generation_cache.then(|| {
            CacheKey::new(ctx.generator.name(), ctx.task.task_id.as_str(), ctx.tier, index, prompt)
        });

        if let Some(key) = &key {
            match cache.get(key) {
                Ok(Some(hit)) => {
                    METRICS.inc_cache_hits();
                    debug!(attempt = index, "generation cache hit");
                    return Ok((hit.code, hit.generation_time));
                }
                Ok(None) => METRICS.inc_cache_misses(),
                Err(e) => {
                    METRICS.inc_cache_misses();
                    warn!(error = %e, "generation cache read failed");
                }
            }
        }

        METRICS.inc_generator_calls();
        let t = Instant::now();
        let generation =
            generate_with_fallback(ctx.generator, prompt, Some(ctx.config.temperature)).await?;
        // Prefer the backend's own timing; fall back to wall time when it reports none.
        let secs = if generation.elapsed_secs > 0.0 {
            generation.elapsed_secs
        } else {
            t.elapsed().as_secs_f64()
        };

        if let Some(key) = &key {
            let entry = CachedGeneration {
                code: generation.code.clone(),
                generation_time: secs,
            };
            if let Err(e) = cache.put(key, &entry) {
                warn!(error = %e, "generation cache write failed");
            }
        }

        Ok((generation.code, secs))
    }

    /// The primary generation plus up to `samples - 1` extra ones. Failed
    /// samples are left out.
    async fn collect_samples(&self, ctx: &RunContext<'_>, prompt: &str, primary: &str) -> Vec<String> {
        let settings = &ctx.config.confidence;
        let mut samples = vec![primary.to_string()];
        for _ in 1..settings.samples {
            METRICS.inc_generator_calls();
            match generate_with_fallback(ctx.generator, prompt, Some(settings.sample_temperature)).await
            {
                Ok(g) => samples.push(self.collaborators.post_process.apply(&g.code, ctx.task)),
                Err(e) => debug!(error = %e, "confidence sample failed, omitting"),
            }
        }
        samples
    }

    async fn check_equivalence(&self, ctx: &RunContext<'_>, candidate: &Candidate) -> EquivReport {
        let checker = &self.collaborators.equivalence;
        let Some(reference) = ctx.task.reference_hdl.as_deref() else {
            return EquivReport::skipped();
        };
        if !checker.is_available() {
            return EquivReport::skipped();
        }

        // Never start a check the remaining budget cannot cover.
        let remaining = ctx.remaining_budget();
        if remaining.is_zero() {
            debug!("task budget spent, skipping equivalence check");
            return EquivReport::skipped();
        }
        let timeout = ctx.config.timeouts.formal().min(remaining);
        checker.check(reference, candidate, timeout).await
    }

    fn prepare_run_dir(
        &self,
        task: &Task,
        generator: &str,
        repetition: u32,
    ) -> (PathBuf, Option<tempfile::TempDir>) {
        let (dir, scratch) = match &self.artifacts_root {
            Some(root) => (
                root.join(path_segment(&task.task_id))
                    .join(path_segment(generator))
                    .join(format!("rep_{repetition}")),
                None,
            ),
            None => match tempfile::Builder::new().prefix("hdleval-").tempdir() {
                Ok(tmp) => (tmp.path().to_path_buf(), Some(tmp)),
                Err(e) => {
                    warn!(error = %e, "failed to create scratch directory");
                    (std::env::temp_dir().join(format!("hdleval-{}", Uuid::new_v4())), None)
                }
            },
        };
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!(error = %e, dir = ?dir, "failed to create run directory");
        }
        (dir, scratch)
    }
}

fn write_candidate(ctx: &RunContext<'_>, index: u32, code: &str) -> Candidate {
    let workdir = ctx.run_dir.join(format!("attempt_{index}"));
    let source_path = workdir.join(format!("{}.v", path_segment(&ctx.task.task_id)));
    if let Err(e) = std::fs::create_dir_all(&workdir).and_then(|_| std::fs::write(&source_path, code)) {
        warn!(error = %e, path = ?source_path, "failed to write candidate source");
    }
    Candidate {
        task_id: ctx.task.task_id.clone(),
        module_name: ctx.task.module_name(),
        code: code.to_string(),
        source_path,
        workdir,
    }
}

fn path_segment(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
