//! Benchmark task definitions.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Logical category of a hardware design task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Combinational,
    Sequential,
    #[serde(alias = "finite_state_machine")]
    Fsm,
    Mixed,
}

impl TaskCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskCategory::Combinational => "combinational",
            TaskCategory::Sequential => "sequential",
            TaskCategory::Fsm => "fsm",
            TaskCategory::Mixed => "mixed",
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared difficulty from the dataset manifest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

/// An immutable unit of work: one design to generate and verify.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier, e.g. `comb_mux_2to1_001`.
    pub task_id: String,

    /// Natural-language specification handed to the generator.
    #[serde(alias = "spec")]
    pub specification: String,

    pub category: TaskCategory,

    #[serde(default)]
    pub difficulty: Difficulty,

    /// Reference implementation used for waveform and formal comparison.
    #[serde(default, alias = "reference_hdl_path")]
    pub reference_hdl: Option<PathBuf>,

    /// Reference testbench used for simulation.
    #[serde(default, alias = "reference_testbench_path", alias = "reference_tb")]
    pub reference_testbench: Option<PathBuf>,

    #[serde(default)]
    pub inputs: Vec<String>,

    #[serde(default)]
    pub outputs: Vec<String>,
}

impl Task {
    pub fn new(
        task_id: impl Into<String>,
        specification: impl Into<String>,
        category: TaskCategory,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            specification: specification.into(),
            category,
            difficulty: Difficulty::default(),
            reference_hdl: None,
            reference_testbench: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_reference(mut self, hdl: impl Into<PathBuf>, testbench: impl Into<PathBuf>) -> Self {
        self.reference_hdl = Some(hdl.into());
        self.reference_testbench = Some(testbench.into());
        self
    }

    pub fn with_ports<I, O>(mut self, inputs: I, outputs: O) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }

    /// Module name the generated design is expected to declare.
    ///
    /// Strips the `comb_` / `seq_` category prefix and a trailing numeric
    /// index: `comb_mux_2to1_001` becomes `mux_2to1`.
    pub fn module_name(&self) -> String {
        let id = self.task_id.as_str();
        let id = id
            .strip_prefix("comb_")
            .or_else(|| id.strip_prefix("seq_"))
            .unwrap_or(id);

        match id.rsplit_once('_') {
            Some((head, tail))
                if !head.is_empty() && !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) =>
            {
                head.to_string()
            }
            _ => id.to_string(),
        }
    }
}
