//! Post-synthesis statistics with Yosys.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hdleval_core::{Candidate, SynthesisStats, Synthesizer};
use regex::Regex;

use crate::compiler::error_lines;
use crate::runner::{is_tool_available, run_tool, ToolCommand, ToolOutcome};

#[derive(Debug, Clone, Copy, Default)]
pub struct YosysSynthesizer;

pub fn synthesis_script(source: &std::path::Path) -> String {
    format!(
        "read_verilog \"{}\"\n\
         hierarchy -auto-top\n\
         proc; opt; fsm; opt; memory; opt\n\
         techmap; opt\n\
         stat\n",
        source.display()
    )
}

/// Cell count of the last `stat` report in `stdout`.
///
/// Accepts both the `Number of cells: N` layout and the newer `N cells`
/// layout.
pub fn parse_cell_count(stdout: &str) -> Option<u64> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let re = PATTERN
        .get_or_init(|| Regex::new(r"(?m)Number of cells:\s+(\d+)|^\s*(\d+)\s+cells\s*$").ok())
        .as_ref()?;
    re.captures_iter(stdout)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .filter_map(|m| m.as_str().parse().ok())
        .last()
}

#[async_trait]
impl Synthesizer for YosysSynthesizer {
    fn is_available(&self) -> bool {
        is_tool_available("yosys")
    }

    async fn synthesize(&self, candidate: &Candidate, timeout: Duration) -> SynthesisStats {
        let start = Instant::now();
        let script_path = candidate.workdir.join("synth.ys");
        if let Err(e) = tokio::fs::write(&script_path, synthesis_script(&candidate.source_path)).await {
            return SynthesisStats {
                errors: vec![format!("failed to write synthesis script: {e}")],
                ..Default::default()
            };
        }

        let cmd = ToolCommand::new("yosys", timeout)
            .arg("-s")
            .arg(script_path.as_os_str())
            .current_dir(&candidate.workdir);
        let outcome = run_tool(&cmd).await;
        let synth_time = start.elapsed().as_secs_f64();

        match outcome {
            ToolOutcome::Finished(output) => {
                let cell_count = parse_cell_count(&output.stdout);
                let errors = if output.success {
                    Vec::new()
                } else {
                    error_lines(&format!("{}\n{}", output.stdout, output.stderr))
                };
                SynthesisStats {
                    success: output.success && cell_count.is_some(),
                    cell_count,
                    synth_time,
                    errors,
                }
            }
            other => SynthesisStats {
                success: false,
                cell_count: None,
                synth_time,
                errors: vec![other.describe()],
            },
        }
    }
}
