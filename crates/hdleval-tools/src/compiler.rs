//! Syntax checking with Icarus Verilog or Verilator.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use hdleval_core::{Candidate, CompileOutcome, Compiler};
use serde::{Deserialize, Serialize};

use crate::runner::{is_tool_available, run_tool, ToolCommand, ToolOutcome};

/// Diagnostics kept per failed compile.
const MAX_DIAGNOSTICS: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompilerKind {
    #[default]
    Iverilog,
    Verilator,
}

impl CompilerKind {
    pub fn program(&self) -> &'static str {
        match self {
            CompilerKind::Iverilog => "iverilog",
            CompilerKind::Verilator => "verilator",
        }
    }
}

impl fmt::Display for CompilerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

impl FromStr for CompilerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "iverilog" | "icarus" => Ok(CompilerKind::Iverilog),
            "verilator" => Ok(CompilerKind::Verilator),
            other => Err(format!("unknown compiler: {other} (expected iverilog or verilator)")),
        }
    }
}

/// Lint-only compile of a single candidate source.
#[derive(Debug, Clone, Default)]
pub struct HdlCompiler {
    kind: CompilerKind,
}

impl HdlCompiler {
    pub fn new(kind: CompilerKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> CompilerKind {
        self.kind
    }

    fn command(&self, candidate: &Candidate, timeout: Duration) -> ToolCommand {
        let cmd = ToolCommand::new(self.kind.program(), timeout).current_dir(&candidate.workdir);
        let cmd = match self.kind {
            CompilerKind::Iverilog => cmd.args(["-t", "null"]),
            CompilerKind::Verilator => cmd.arg("--lint-only"),
        };
        cmd.arg(candidate.source_path.as_os_str())
    }
}

#[async_trait]
impl Compiler for HdlCompiler {
    fn is_available(&self) -> bool {
        is_tool_available(self.kind.program())
    }

    async fn compile(&self, candidate: &Candidate, timeout: Duration) -> CompileOutcome {
        match run_tool(&self.command(candidate, timeout)).await {
            ToolOutcome::Finished(output) if output.success => CompileOutcome::success(),
            ToolOutcome::Finished(output) => {
                let mut diagnostics = error_lines(&output.stderr);
                if diagnostics.is_empty() {
                    diagnostics = error_lines(&output.stdout);
                }
                if diagnostics.is_empty() {
                    let first = output.stderr.lines().map(str::trim).find(|l| !l.is_empty());
                    diagnostics.push(match first {
                        Some(line) => line.to_string(),
                        None => format!("{} failed without diagnostics", self.kind),
                    });
                }
                CompileOutcome {
                    ok: false,
                    diagnostics,
                }
            }
            ToolOutcome::TimedOut { .. } => CompileOutcome::failure("Compilation timeout"),
            other => CompileOutcome::failure(other.describe()),
        }
    }
}

/// Lines mentioning an error, trimmed, at most five.
pub fn error_lines(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| line.contains("error") || line.contains("Error"))
        .map(|line| line.trim().to_string())
        .take(MAX_DIAGNOSTICS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_lines_limits_and_trims() {
        let stderr = "\
  and.v:3: syntax error
and.v:3: error: Invalid module item.
note: something harmless
and.v:4: error: a
and.v:5: error: b
and.v:6: error: c
and.v:7: error: d
";
        let errors = error_lines(stderr);
        assert_eq!(errors.len(), 5);
        assert_eq!(errors[0], "and.v:3: syntax error");
        assert!(errors.iter().all(|e| !e.contains("harmless")));
    }

    #[test]
    fn test_verilator_style_errors() {
        let stderr = "%Error: and.v:3:17: syntax error, unexpected ';'\n%Error: Exiting due to 1 error(s)\n";
        let errors = error_lines(stderr);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("%Error"));
    }

    #[test]
    fn test_compiler_kind_parse() {
        assert_eq!("iverilog".parse::<CompilerKind>().unwrap(), CompilerKind::Iverilog);
        assert_eq!("Verilator".parse::<CompilerKind>().unwrap(), CompilerKind::Verilator);
        assert!("vcs".parse::<CompilerKind>().is_err());
        assert_eq!(CompilerKind::Verilator.to_string(), "verilator");
    }

    #[test]
    fn test_command_line() {
        let candidate = Candidate {
            task_id: "comb_and_001".into(),
            module_name: "and".into(),
            code: String::new(),
            source_path: "/work/and.v".into(),
            workdir: "/work".into(),
        };
        let cmd = HdlCompiler::new(CompilerKind::Iverilog).command(&candidate, Duration::from_secs(30));
        assert_eq!(cmd.program(), "iverilog");
        let rendered = format!("{cmd:?}");
        assert!(rendered.contains("\"-t\""));
        assert!(rendered.contains("/work/and.v"));
    }
}
