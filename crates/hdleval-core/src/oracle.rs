//! Verification oracle seams.
//!
//! Each external tool sits behind an async trait with a null
//! implementation, so the refinement loop never checks for a missing
//! collaborator at the call site. Implementations must not fail: timeouts
//! and missing tools come back as structured negative outcomes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::SynthesisStats;
use crate::formal::EquivReport;
use crate::waveform::WaveformDiff;

/// A post-processed candidate design, already written to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub task_id: String,
    /// Module name the design is expected to declare.
    pub module_name: String,
    pub code: String,
    /// Path of the written source file.
    pub source_path: PathBuf,
    /// Scratch directory for tool outputs of this attempt.
    pub workdir: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOutcome {
    pub ok: bool,
    /// Bounded list of diagnostics; a single entry for tool failures.
    pub diagnostics: Vec<String>,
}

impl CompileOutcome {
    pub fn success() -> Self {
        Self {
            ok: true,
            diagnostics: Vec::new(),
        }
    }

    pub fn failure(diagnostic: impl Into<String>) -> Self {
        Self {
            ok: false,
            diagnostics: vec![diagnostic.into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationOptions {
    pub timeout: Duration,
    /// Ask the simulator to produce a VCD trace.
    pub dump_vcd: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationOutcome {
    pub passed: bool,
    pub tests_passed: u32,
    pub tests_total: u32,
    /// Failure lines worth echoing back to the generator.
    pub errors: Vec<String>,
    /// VCD trace written by the run, if any.
    pub trace: Option<PathBuf>,
}

impl SimulationOutcome {
    /// `(false, 0, 0, None)` for environment failures.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            errors: vec![reason.into()],
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait Compiler: Send + Sync {
    fn is_available(&self) -> bool {
        true
    }

    async fn compile(&self, candidate: &Candidate, timeout: Duration) -> CompileOutcome;
}

#[async_trait]
pub trait Simulator: Send + Sync {
    fn is_available(&self) -> bool {
        true
    }

    async fn simulate(
        &self,
        candidate: &Candidate,
        testbench: &Path,
        options: &SimulationOptions,
    ) -> SimulationOutcome;
}

#[async_trait]
pub trait EquivalenceChecker: Send + Sync {
    fn is_available(&self) -> bool {
        true
    }

    async fn check(&self, reference: &Path, candidate: &Candidate, timeout: Duration)
        -> EquivReport;
}

/// Produces the reference trace for a task and diffs it against a
/// candidate trace.
#[async_trait]
pub trait WaveformAnalyzer: Send + Sync {
    fn is_available(&self) -> bool {
        true
    }

    /// `None` when the reference trace could not be produced or parsed.
    async fn diff(
        &self,
        reference_hdl: &Path,
        testbench: &Path,
        candidate_trace: &Path,
        candidate: &Candidate,
        timeout: Duration,
    ) -> Option<WaveformDiff>;
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    fn is_available(&self) -> bool {
        true
    }

    async fn synthesize(&self, candidate: &Candidate, timeout: Duration) -> SynthesisStats;
}

/// No compiler configured: syntax is never validated.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCompiler;

#[async_trait]
impl Compiler for NullCompiler {
    fn is_available(&self) -> bool {
        false
    }

    async fn compile(&self, _candidate: &Candidate, _timeout: Duration) -> CompileOutcome {
        CompileOutcome::default()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullSimulator;

#[async_trait]
impl Simulator for NullSimulator {
    fn is_available(&self) -> bool {
        false
    }

    async fn simulate(
        &self,
        _candidate: &Candidate,
        _testbench: &Path,
        _options: &SimulationOptions,
    ) -> SimulationOutcome {
        SimulationOutcome::default()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullEquivalenceChecker;

#[async_trait]
impl EquivalenceChecker for NullEquivalenceChecker {
    fn is_available(&self) -> bool {
        false
    }

    async fn check(
        &self,
        _reference: &Path,
        _candidate: &Candidate,
        _timeout: Duration,
    ) -> EquivReport {
        EquivReport::skipped()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullWaveformAnalyzer;

#[async_trait]
impl WaveformAnalyzer for NullWaveformAnalyzer {
    fn is_available(&self) -> bool {
        false
    }

    async fn diff(
        &self,
        _reference_hdl: &Path,
        _testbench: &Path,
        _candidate_trace: &Path,
        _candidate: &Candidate,
        _timeout: Duration,
    ) -> Option<WaveformDiff> {
        None
    }
}
