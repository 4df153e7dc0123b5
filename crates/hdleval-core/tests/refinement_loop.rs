//! End-to-end refinement runs against fake collaborators.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use hdleval_core::{
    summarize, Candidate, Collaborators, CompileOutcome, Compiler, ConfidenceEstimator,
    EntropyGateSettings, FastSkipReason, Generation, Generator, GeneratorError, MemoryCache,
    RefinementController, RunConfiguration, RunRecord, SimulationOptions, SimulationOutcome,
    Simulator, Task, TaskCategory,
};

const BROKEN: &str = "module and_gate(input a, input b, output y);\n  assign y = a & ;\n";
const WRONG: &str = "module and_gate(input a, input b, output y);\n  assign y = a | b;\nendmodule\n";
const CORRECT: &str =
    "module and_gate(input a, input b, output y);\n  // correct\n  assign y = a & b;\nendmodule\n";

/// Returns `script[n]` for the n-th call (the last entry repeats), after
/// an optional per-call delay.
struct ScriptedGenerator {
    script: Vec<&'static str>,
    delays: Vec<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn new(script: Vec<&'static str>) -> Self {
        Self {
            script,
            delays: Vec::new(),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn with_delays(mut self, delays: Vec<Duration>) -> Self {
        self.delays = delays;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn prompt(&self, n: usize) -> String {
        self.prompts.lock().unwrap()[n].clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        prompt: &str,
        _temperature: Option<f32>,
    ) -> Result<Generation, GeneratorError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(delay) = self.delays.get(n) {
            tokio::time::sleep(*delay).await;
        }
        let code = self.script[n.min(self.script.len() - 1)];
        Ok(Generation {
            code: code.to_string(),
            elapsed_secs: 0.0,
        })
    }
}

/// Reports its own timing, as an HTTP backend would.
struct SelfTimedGenerator;

#[async_trait]
impl Generator for SelfTimedGenerator {
    fn name(&self) -> &str {
        "self-timed"
    }

    async fn generate(
        &self,
        _prompt: &str,
        _temperature: Option<f32>,
    ) -> Result<Generation, GeneratorError> {
        Ok(Generation {
            code: CORRECT.to_string(),
            elapsed_secs: 2.5,
        })
    }
}

/// Fails every call.
struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    fn name(&self) -> &str {
        "failing"
    }

    async fn generate(
        &self,
        _prompt: &str,
        _temperature: Option<f32>,
    ) -> Result<Generation, GeneratorError> {
        Err(GeneratorError::Request("connection refused".to_string()))
    }
}

/// Accepts anything ending in `endmodule`.
struct FakeCompiler;

#[async_trait]
impl Compiler for FakeCompiler {
    async fn compile(&self, candidate: &Candidate, _timeout: Duration) -> CompileOutcome {
        assert!(candidate.source_path.is_file(), "candidate must be on disk");
        if candidate.code.trim_end().ends_with("endmodule") {
            CompileOutcome::success()
        } else {
            CompileOutcome::failure(format!(
                "{}:3: syntax error, unexpected end of file",
                candidate.source_path.display()
            ))
        }
    }
}

struct PanickingCompiler;

#[async_trait]
impl Compiler for PanickingCompiler {
    async fn compile(&self, _candidate: &Candidate, _timeout: Duration) -> CompileOutcome {
        panic!("compiler exploded");
    }
}

/// Passes designs marked `// correct` (or everything, when `always_pass`)
/// and counts calls.
#[derive(Default)]
struct RecordingSimulator {
    calls: AtomicUsize,
    always_pass: bool,
}

impl RecordingSimulator {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Simulator for RecordingSimulator {
    async fn simulate(
        &self,
        candidate: &Candidate,
        _testbench: &Path,
        _options: &SimulationOptions,
    ) -> SimulationOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.always_pass || candidate.code.contains("// correct") {
            SimulationOutcome {
                passed: true,
                tests_passed: 4,
                tests_total: 4,
                ..Default::default()
            }
        } else {
            SimulationOutcome {
                passed: false,
                tests_passed: 2,
                tests_total: 4,
                errors: vec!["Test 3 failed: a=1 b=0 expected y=0 got y=1".to_string()],
                trace: None,
            }
        }
    }
}

/// Returns readings in sequence; the last one repeats.
struct SequenceEstimator(Mutex<Vec<f64>>);

impl SequenceEstimator {
    fn new(readings: Vec<f64>) -> Self {
        Self(Mutex::new(readings.into_iter().rev().collect()))
    }
}

impl ConfidenceEstimator for SequenceEstimator {
    fn entropy(&self, _samples: &[String]) -> f64 {
        let mut readings = self.0.lock().unwrap();
        if readings.len() > 1 {
            readings.pop().unwrap()
        } else {
            readings[0]
        }
    }
}

fn task(dir: &Path) -> Task {
    let testbench = dir.join("and_gate_tb.v");
    std::fs::write(&testbench, "module and_gate_tb; endmodule\n").unwrap();
    Task::new(
        "comb_and_gate_001",
        "2-input AND gate",
        TaskCategory::Combinational,
    )
    .with_ports(["a", "b"], ["y"])
    .with_reference(dir.join("and_gate.v"), testbench)
}

/// A plain configuration with no tiering and no gating.
fn config(max_iterations: u32) -> RunConfiguration {
    let mut config = RunConfiguration {
        max_iterations,
        task_tiers: false,
        waveform_analysis: false,
        formal_verification: false,
        generation_cache: false,
        ..Default::default()
    };
    config.confidence.enabled = false;
    config.entropy_gate.enabled = false;
    config
}

fn collaborators(simulator: Arc<RecordingSimulator>) -> Collaborators {
    Collaborators::default()
        .with_compiler(Arc::new(FakeCompiler))
        .with_simulator(simulator)
}

#[tokio::test]
async fn immediate_success_stops_after_one_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let simulator = Arc::new(RecordingSimulator::default());
    let controller = RefinementController::new(config(5), collaborators(simulator.clone()));
    let generator = ScriptedGenerator::new(vec![CORRECT]);

    let outcome = controller.run(&task(dir.path()), &generator, 0).await;

    assert_eq!(outcome.attempts(), 1);
    assert_eq!(outcome.best.iteration_count, 1);
    assert!(outcome.best.attempt.syntax_valid);
    assert!(outcome.best.attempt.simulation_passed);
    assert_eq!(outcome.best.attempt.test_cases_passed, 4);
    assert_eq!(generator.calls(), 1);
    assert_eq!(simulator.calls(), 1);
    assert!(outcome.history[0].feedback.is_none());
}

#[tokio::test]
async fn compile_failure_feeds_back_and_is_fixed() {
    let dir = tempfile::tempdir().unwrap();
    let simulator = Arc::new(RecordingSimulator::default());
    let controller = RefinementController::new(config(5), collaborators(simulator.clone()));
    let generator = ScriptedGenerator::new(vec![BROKEN, CORRECT]);

    let outcome = controller.run(&task(dir.path()), &generator, 0).await;

    assert_eq!(outcome.attempts(), 2);
    assert_eq!(outcome.best.iteration_count, 2);
    assert!(outcome.best.attempt.simulation_passed);

    let first = &outcome.history[0];
    assert!(!first.attempt.syntax_valid);
    let feedback = first.feedback.as_deref().unwrap();
    assert!(feedback.contains("Compilation errors found"));
    assert!(feedback.contains("syntax error, unexpected end of file"));

    // Only the compiled attempt reached the simulator.
    assert_eq!(simulator.calls(), 1);

    let second_prompt = generator.prompt(1);
    assert!(second_prompt.contains("FEEDBACK FROM PREVIOUS ATTEMPT"));
    assert!(second_prompt.contains("syntax error"));
}

#[tokio::test]
async fn simulation_failure_feedback_carries_test_errors() {
    let dir = tempfile::tempdir().unwrap();
    let simulator = Arc::new(RecordingSimulator::default());
    let controller = RefinementController::new(config(2), collaborators(simulator));
    let generator = ScriptedGenerator::new(vec![WRONG, CORRECT]);

    let outcome = controller.run(&task(dir.path()), &generator, 0).await;

    assert_eq!(outcome.attempts(), 2);
    let first = &outcome.history[0];
    assert!(first.attempt.syntax_valid);
    assert!(!first.attempt.simulation_passed);
    assert_eq!(first.attempt.test_cases_passed, 2);
    let feedback = first.feedback.as_deref().unwrap();
    assert!(feedback.contains("Simulation errors"));
    assert!(feedback.contains("expected y=0 got y=1"));
    assert!(first
        .attempt
        .repair_hints
        .iter()
        .any(|h| h.contains("Review logic implementation")));
}

#[tokio::test]
async fn high_entropy_skips_simulation() {
    let dir = tempfile::tempdir().unwrap();
    let simulator = Arc::new(RecordingSimulator {
        always_pass: true,
        ..Default::default()
    });
    let mut config = config(1);
    config.confidence.enabled = true;
    config.confidence.samples = 3;
    config.entropy_gate = EntropyGateSettings {
        enabled: true,
        threshold: 0.3,
        ..Default::default()
    };
    let collaborators = collaborators(simulator.clone())
        .with_confidence(Arc::new(SequenceEstimator::new(vec![0.5])));
    let controller = RefinementController::new(config, collaborators);
    let generator = ScriptedGenerator::new(vec![CORRECT]);

    let outcome = controller.run(&task(dir.path()), &generator, 0).await;

    let best = &outcome.best.attempt;
    assert!(best.syntax_valid);
    assert!(!best.simulation_passed);
    assert_eq!(best.fast_skip_reason, Some(FastSkipReason::EntropyHigh));
    assert_eq!(best.confidence_entropy, Some(0.5));
    assert_eq!(simulator.calls(), 0);
    // One primary generation plus two confidence samples.
    assert_eq!(generator.calls(), 3);

    let record = serde_json::to_value(&outcome.best).unwrap();
    assert_eq!(record["fast_skip_reason"], "entropy_high");
}

#[tokio::test]
async fn low_entropy_passes_the_gate() {
    let dir = tempfile::tempdir().unwrap();
    let simulator = Arc::new(RecordingSimulator::default());
    let mut config = config(1);
    config.confidence.enabled = true;
    config.confidence.samples = 1;
    config.entropy_gate.enabled = true;
    let collaborators = collaborators(simulator.clone())
        .with_confidence(Arc::new(SequenceEstimator::new(vec![0.1])));
    let controller = RefinementController::new(config, collaborators);

    let outcome = controller
        .run(&task(dir.path()), &ScriptedGenerator::new(vec![CORRECT]), 0)
        .await;

    assert!(outcome.best.attempt.simulation_passed);
    assert!(outcome.best.attempt.fast_skip_reason.is_none());
    assert_eq!(simulator.calls(), 1);
}

#[tokio::test]
async fn stops_when_improvement_is_too_small() {
    let dir = tempfile::tempdir().unwrap();
    let simulator = Arc::new(RecordingSimulator::default());
    let mut config = config(5);
    config.min_improvement = 0.1;
    config.confidence.enabled = true;
    config.confidence.samples = 1;
    // Compiles, fails simulation: 1.0 + (1 - entropy) / 2.
    let collaborators = collaborators(simulator)
        .with_confidence(Arc::new(SequenceEstimator::new(vec![1.0, 0.9, 0.0])));
    let controller = RefinementController::new(config, collaborators);
    let generator = ScriptedGenerator::new(vec![WRONG]);

    let outcome = controller.run(&task(dir.path()), &generator, 0).await;

    assert_eq!(outcome.attempts(), 2);
    assert!((outcome.history[0].score - 1.0).abs() < 1e-9);
    assert!((outcome.history[1].score - 1.05).abs() < 1e-9);
    assert_eq!(outcome.best.iteration_count, 2);
}

#[tokio::test(start_paused = true)]
async fn wall_clock_budget_ends_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let simulator = Arc::new(RecordingSimulator::default());
    let mut config = config(5);
    config.adaptive_stopping = false;
    config.task_budget_secs = 1.0;
    let controller = RefinementController::new(config, collaborators(simulator));
    let generator = ScriptedGenerator::new(vec![BROKEN])
        .with_delays(vec![Duration::ZERO, Duration::from_secs(5)]);

    let outcome = controller.run(&task(dir.path()), &generator, 0).await;

    assert_eq!(outcome.attempts(), 2);
    assert_eq!(generator.calls(), 2);
    assert!(outcome.history[0].attempt.fast_skip_reason.is_none());
    assert_eq!(
        outcome.history[1].attempt.fast_skip_reason,
        Some(FastSkipReason::Timeout)
    );
    assert_eq!(outcome.terminal_skip, Some(FastSkipReason::Timeout));
    assert!(outcome.elapsed_secs >= 5.0);
}

#[tokio::test(start_paused = true)]
async fn timeout_survives_when_an_earlier_attempt_is_best() {
    let dir = tempfile::tempdir().unwrap();
    let simulator = Arc::new(RecordingSimulator::default());
    let mut config = config(5);
    config.adaptive_stopping = false;
    config.task_budget_secs = 1.0;
    let controller = RefinementController::new(config, collaborators(simulator));
    let generator = ScriptedGenerator::new(vec![WRONG, BROKEN])
        .with_delays(vec![Duration::ZERO, Duration::from_secs(5)]);

    let outcome = controller.run(&task(dir.path()), &generator, 0).await;

    assert_eq!(outcome.attempts(), 2);
    assert_eq!(outcome.best.iteration_count, 1);
    assert!(outcome.best.attempt.fast_skip_reason.is_none());
    assert_eq!(outcome.terminal_skip, Some(FastSkipReason::Timeout));

    let record = RunRecord::from_outcome(&outcome);
    assert_eq!(record.terminal_skip, Some(FastSkipReason::Timeout));
    assert_eq!(summarize(&[record])[0].timeouts, 1);
}

#[tokio::test(start_paused = true)]
async fn generation_time_prefers_backend_timing() {
    let dir = tempfile::tempdir().unwrap();
    let simulator = Arc::new(RecordingSimulator::default());
    let controller = RefinementController::new(config(1), collaborators(simulator));

    let outcome = controller.run(&task(dir.path()), &SelfTimedGenerator, 0).await;
    assert_eq!(outcome.best.attempt.generation_time, 2.5);

    // No backend timing: the controller's own clock is used.
    let generator = ScriptedGenerator::new(vec![CORRECT]).with_delays(vec![Duration::from_secs(3)]);
    let outcome = controller.run(&task(dir.path()), &generator, 1).await;
    assert!(outcome.best.attempt.generation_time >= 3.0);
}

#[tokio::test]
async fn best_attempt_is_earliest_maximum() {
    let dir = tempfile::tempdir().unwrap();
    let simulator = Arc::new(RecordingSimulator::default());
    let mut config = config(3);
    config.adaptive_stopping = false;
    let controller = RefinementController::new(config, collaborators(simulator));
    let generator = ScriptedGenerator::new(vec![WRONG, BROKEN, WRONG]);

    let outcome = controller.run(&task(dir.path()), &generator, 0).await;

    let scores: Vec<f64> = outcome.history.iter().map(|r| r.score).collect();
    assert_eq!(scores, vec![1.0, 0.0, 1.0]);
    assert_eq!(outcome.best.iteration_count, 1);
    assert_eq!(outcome.best.score(), 1.0);
}

#[tokio::test]
async fn simulation_never_passes_without_valid_syntax() {
    let dir = tempfile::tempdir().unwrap();
    let simulator = Arc::new(RecordingSimulator {
        always_pass: true,
        ..Default::default()
    });
    let mut config = config(3);
    config.adaptive_stopping = false;
    let controller = RefinementController::new(config, collaborators(simulator.clone()));
    let generator = ScriptedGenerator::new(vec![BROKEN]);

    let outcome = controller.run(&task(dir.path()), &generator, 0).await;

    assert_eq!(outcome.attempts(), 3);
    for record in &outcome.history {
        assert!(!record.attempt.syntax_valid);
        assert!(!record.attempt.simulation_passed);
    }
    assert_eq!(simulator.calls(), 0);
}

#[tokio::test]
async fn generator_failure_is_recorded_per_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let simulator = Arc::new(RecordingSimulator::default());
    let mut config = config(3);
    config.adaptive_stopping = false;
    let controller = RefinementController::new(config, collaborators(simulator));

    let outcome = controller.run(&task(dir.path()), &FailingGenerator, 0).await;

    assert_eq!(outcome.attempts(), 3);
    for record in &outcome.history {
        assert!(record.attempt.generated_code.is_empty());
        assert_eq!(record.attempt.generation_time, 0.0);
        assert!(record.attempt.compile_errors[0].contains("connection refused"));
    }
    assert_eq!(outcome.best.iteration_count, 1);
}

#[tokio::test]
async fn panicking_collaborator_fails_only_that_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(2);
    config.adaptive_stopping = false;
    let collaborators = Collaborators::default().with_compiler(Arc::new(PanickingCompiler));
    let controller = RefinementController::new(config, collaborators);

    let outcome = controller
        .run(&task(dir.path()), &ScriptedGenerator::new(vec![CORRECT]), 0)
        .await;

    assert_eq!(outcome.attempts(), 2);
    assert!(outcome.history[0].attempt.compile_errors[0].contains("compiler exploded"));
}

#[tokio::test]
async fn cache_serves_repeated_runs() {
    let dir = tempfile::tempdir().unwrap();
    let simulator = Arc::new(RecordingSimulator::default());
    let mut config = config(1);
    config.generation_cache = true;
    let cache = Arc::new(MemoryCache::new());
    let controller = RefinementController::new(
        config,
        collaborators(simulator).with_cache(cache.clone()),
    );
    let task = task(dir.path());

    let generator = ScriptedGenerator::new(vec![CORRECT]);
    let first = controller.run(&task, &generator, 0).await;
    let second = controller.run(&task, &generator, 1).await;

    assert_eq!(generator.calls(), 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(
        first.best.attempt.generated_code,
        second.best.attempt.generated_code
    );
    assert!(second.best.attempt.simulation_passed);
}

#[tokio::test]
async fn artifacts_hold_candidates_and_history() {
    let dir = tempfile::tempdir().unwrap();
    let artifacts = dir.path().join("artifacts");
    let simulator = Arc::new(RecordingSimulator::default());
    let controller = RefinementController::new(config(5), collaborators(simulator))
        .with_artifacts(&artifacts);
    let generator = ScriptedGenerator::new(vec![BROKEN, CORRECT]);

    controller.run(&task(dir.path()), &generator, 3).await;

    let run_dir = artifacts.join("comb_and_gate_001").join("scripted").join("rep_3");
    let first = std::fs::read_to_string(run_dir.join("attempt_1/comb_and_gate_001.v")).unwrap();
    assert_eq!(first, BROKEN);
    assert!(run_dir.join("attempt_2/comb_and_gate_001.v").is_file());

    let history: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(run_dir.join("iteration_history.json")).unwrap())
            .unwrap();
    let entries = history.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["attempt"], 1);
    assert_eq!(entries[1]["simulation_passed"], true);
}
