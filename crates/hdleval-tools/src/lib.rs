//! Oracle adapters over external EDA tools, plus HTTP generators.
//!
//! Every adapter implements one of the `hdleval-core` collaborator traits
//! and reports itself unavailable when its executable is not on `PATH`.

pub mod compiler;
pub mod equivalence;
pub mod ollama;
pub mod runner;
pub mod simulator;
pub mod synth;
pub mod waveform;

pub use compiler::{error_lines, CompilerKind, HdlCompiler};
pub use equivalence::{equivalence_script, YosysEquivalenceChecker};
pub use ollama::{OllamaConfig, OllamaGenerator};
pub use runner::{is_tool_available, run_tool, which, ToolCommand, ToolOutcome, ToolOutput};
pub use simulator::{parse_simulation_output, IcarusSimulator};
pub use synth::{parse_cell_count, synthesis_script, YosysSynthesizer};
pub use waveform::ReferenceTraceAnalyzer;

use serde::Serialize;

/// Executables the adapters may call.
pub const KNOWN_TOOLS: [&str; 4] = ["iverilog", "vvp", "verilator", "yosys"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolStatus {
    pub name: &'static str,
    pub path: Option<std::path::PathBuf>,
}

/// Where each known tool resolves on `PATH`, if anywhere.
pub fn probe_tools() -> Vec<ToolStatus> {
    KNOWN_TOOLS
        .iter()
        .map(|&name| ToolStatus {
            name,
            path: which(name),
        })
        .collect()
}
