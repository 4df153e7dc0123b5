//! Domain models for hdleval.
//!
//! Canonical definitions for the core entities:
//! - `Task`: a design to generate, loaded from a dataset manifest
//! - `Attempt`: one generate-and-verify cycle, with its score
//! - `EvaluationMetrics`: the best attempt of a run
//! - `RunConfiguration`: immutable per-run policy and named presets

pub mod attempt;
pub mod config;
pub mod error;
pub mod task;

pub use attempt::{
    Attempt, AttemptRecord, EvaluationMetrics, FastSkipReason, FormalStatus, RunOutcome,
    SynthesisStats,
};
pub use config::{
    CategoryCaps, ConfidenceSettings, ConfigPreset, EntropyGateSettings, EvalMode, GateOverride,
    RunConfiguration, ToolTimeouts,
};
pub use error::{ConfigError, EvalError, Result};
pub use task::{Difficulty, Task, TaskCategory};
