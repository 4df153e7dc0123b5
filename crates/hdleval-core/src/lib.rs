//! HDL Eval Core Library
//!
//! Adaptive iterative refinement for generated Verilog: the refinement
//! controller and everything it consults (tiering, confidence, diagnosis,
//! feedback, caching) behind collaborator traits.

pub mod batch;
pub mod cache;
pub mod confidence;
pub mod controller;
pub mod dataset;
pub mod diagnosis;
pub mod domain;
pub mod feedback;
pub mod formal;
pub mod generator;
pub mod metrics;
pub mod obs;
pub mod oracle;
pub mod prompt;
pub mod reporting;
pub mod telemetry;
pub mod tiering;
pub mod waveform;

pub use domain::{
    Attempt, AttemptRecord, CategoryCaps, ConfidenceSettings, ConfigError, ConfigPreset,
    Difficulty, EntropyGateSettings, EvalError, EvalMode, EvaluationMetrics, FastSkipReason,
    FormalStatus, GateOverride, Result, RunConfiguration, RunOutcome, SynthesisStats, Task,
    TaskCategory, ToolTimeouts,
};

pub use batch::{run_batch, BatchResult};
pub use cache::fs::FsGenerationCache;
pub use cache::{CacheError, CacheKey, CachedGeneration, Digest, GenerationCache, MemoryCache, NoCache};
pub use confidence::{
    sample_entropy, similarity_ratio, ConfidenceEstimator, ConfidenceLedger, ConfidencePoint,
    EditDistanceEstimator, NullEstimator,
};
pub use controller::{best_attempt, should_continue, Collaborators, RefinementController};
pub use dataset::{load_manifest, validate_tasks, MissingReference, ReferenceKind};
pub use diagnosis::{Diagnoser, Diagnosis, DiagnosisInput, NullDiagnoser, SemanticDiagnoser, Severity};
pub use feedback::{FeedbackComposer, FeedbackInput, DEFAULT_MAX_FEEDBACK_LEN};
pub use formal::{formal_hints, parse_equiv_output, EquivReport};
pub use generator::{
    extract_module, generate_with_fallback, ExtractModule, Generation, Generator, GeneratorError,
    Passthrough, PostProcess,
};
pub use metrics::METRICS;
pub use oracle::{
    Candidate, CompileOutcome, Compiler, EquivalenceChecker, NullCompiler, NullEquivalenceChecker,
    NullSimulator, NullWaveformAnalyzer, SimulationOptions, SimulationOutcome, Simulator,
    Synthesizer, WaveformAnalyzer,
};
pub use prompt::{prompt_for_attempt, refinement_prompt, ConstrainedPrompt, PromptStrategy};
pub use reporting::{
    append_run_record, read_run_records, render_summary_table, summarize, write_iteration_history,
    GeneratorSummary, IterationHistoryEntry, RunRecord,
};
pub use telemetry::init_tracing;
pub use tiering::{assign_tier, plan_for_task, TaskPlan, Tier};
pub use waveform::{compare_traces, inject_vcd_dump, mismatch_hints, parse_vcd, Trace, WaveformDiff};
