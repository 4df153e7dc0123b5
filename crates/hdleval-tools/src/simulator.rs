//! Testbench simulation with Icarus Verilog (`iverilog` + `vvp`).

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use hdleval_core::{inject_vcd_dump, Candidate, SimulationOptions, SimulationOutcome, Simulator};
use regex::Regex;
use tracing::debug;

use crate::compiler::error_lines;
use crate::runner::{is_tool_available, run_tool, ToolCommand, ToolOutcome, ToolOutput};

/// File name the injected dump writes to, relative to the run directory.
pub const DUMP_FILE: &str = "waveform.vcd";

const MAX_FAILURE_LINES: usize = 5;

/// Build `design` against `testbench` in `workdir` and run the result.
///
/// Returns the simulator's output, or a one-line reason the testbench
/// could not be built or run.
pub(crate) async fn build_and_run(
    design: &Path,
    testbench: &Path,
    workdir: &Path,
    timeout: Duration,
) -> Result<ToolOutput, String> {
    let image = workdir.join("sim.vvp");
    let build = ToolCommand::new("iverilog", timeout)
        .arg("-o")
        .arg(image.as_os_str())
        .arg(design.as_os_str())
        .arg(testbench.as_os_str())
        .current_dir(workdir);

    match run_tool(&build).await {
        ToolOutcome::Finished(output) if output.success => {}
        ToolOutcome::Finished(output) => {
            let detail = error_lines(&output.stderr).into_iter().next();
            return Err(match detail {
                Some(line) => format!("testbench build failed: {line}"),
                None => "testbench build failed".to_string(),
            });
        }
        ToolOutcome::TimedOut { .. } => return Err("Compilation timeout".to_string()),
        other => return Err(other.describe()),
    }

    let run = ToolCommand::new("vvp", timeout)
        .arg(image.as_os_str())
        .current_dir(workdir);
    match run_tool(&run).await {
        ToolOutcome::Finished(output) => Ok(output),
        ToolOutcome::TimedOut { .. } => Err("Simulation timeout".to_string()),
        other => Err(other.describe()),
    }
}

/// Write a copy of `testbench` that dumps a VCD trace into `workdir`.
pub(crate) async fn prepare_dumping_testbench(
    testbench: &Path,
    workdir: &Path,
) -> std::io::Result<PathBuf> {
    let source = tokio::fs::read_to_string(testbench).await?;
    let path = workdir.join("testbench_with_vcd.v");
    tokio::fs::write(&path, inject_vcd_dump(&source, DUMP_FILE)).await?;
    Ok(path)
}

/// The trace written under `workdir`: `waveform.vcd`, else any `.vcd`.
pub(crate) fn find_trace(workdir: &Path) -> Option<PathBuf> {
    let preferred = workdir.join(DUMP_FILE);
    if preferred.is_file() {
        return Some(preferred);
    }
    let mut found: Vec<PathBuf> = std::fs::read_dir(workdir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "vcd"))
        .collect();
    found.sort();
    found.into_iter().next()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IcarusSimulator;

#[async_trait]
impl Simulator for IcarusSimulator {
    fn is_available(&self) -> bool {
        is_tool_available("iverilog") && is_tool_available("vvp")
    }

    async fn simulate(
        &self,
        candidate: &Candidate,
        testbench: &Path,
        options: &SimulationOptions,
    ) -> SimulationOutcome {
        let testbench = if options.dump_vcd {
            match prepare_dumping_testbench(testbench, &candidate.workdir).await {
                Ok(path) => path,
                Err(e) => {
                    debug!(error = %e, "could not prepare dumping testbench, tracing disabled");
                    testbench.to_path_buf()
                }
            }
        } else {
            testbench.to_path_buf()
        };

        let output = match build_and_run(
            &candidate.source_path,
            &testbench,
            &candidate.workdir,
            options.timeout,
        )
        .await
        {
            Ok(output) => output,
            Err(reason) => return SimulationOutcome::failed(reason),
        };

        let (tests_passed, tests_total) = parse_simulation_output(&output.stdout);
        let passed = tests_total > 0 && tests_passed == tests_total;
        let errors = if passed {
            Vec::new()
        } else {
            failure_lines(&output.stdout)
        };

        SimulationOutcome {
            passed,
            tests_passed,
            tests_total,
            errors,
            trace: options.dump_vcd.then(|| find_trace(&candidate.workdir)).flatten(),
        }
    }
}

fn result_patterns() -> &'static [(Regex, bool)] {
    static PATTERNS: OnceLock<Vec<(Regex, bool)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        // The flag marks patterns whose second group counts failures.
        [
            (r"(\d+)/(\d+) tests passed", false),
            (r"PASSED: (\d+), FAILED: (\d+)", true),
            (r"Tests passed: (\d+) out of (\d+)", false),
        ]
        .into_iter()
        .filter_map(|(pattern, counts_failures)| {
            Regex::new(pattern).ok().map(|re| (re, counts_failures))
        })
        .collect()
    })
}

/// `(passed, total)` from testbench output.
///
/// Without a recognised summary line, output containing `PASS` and no
/// `FAIL` counts as one passing test, anything else as one failing test.
pub fn parse_simulation_output(stdout: &str) -> (u32, u32) {
    for (re, counts_failures) in result_patterns() {
        let Some(caps) = re.captures(stdout) else {
            continue;
        };
        let first = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok());
        let second = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok());
        if let (Some(a), Some(b)) = (first, second) {
            return if *counts_failures {
                (a, a.saturating_add(b))
            } else {
                (a, b)
            };
        }
    }

    if stdout.contains("PASS") && !stdout.contains("FAIL") {
        (1, 1)
    } else {
        (0, 1)
    }
}

/// Lines of testbench output worth echoing back as failure detail.
fn failure_lines(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| {
            let lower = line.to_ascii_lowercase();
            lower.contains("fail") || lower.contains("error") || lower.contains("mismatch")
        })
        .take(MAX_FAILURE_LINES)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ratio_summary() {
        assert_eq!(parse_simulation_output("Result: 7/8 tests passed\n"), (7, 8));
    }

    #[test]
    fn test_parse_passed_failed_summary() {
        assert_eq!(parse_simulation_output("PASSED: 3, FAILED: 1"), (3, 4));
    }

    #[test]
    fn test_parse_out_of_summary() {
        assert_eq!(parse_simulation_output("Tests passed: 4 out of 4"), (4, 4));
    }

    #[test]
    fn test_parse_keyword_fallback() {
        assert_eq!(parse_simulation_output("ALL TESTS PASS"), (1, 1));
        assert_eq!(parse_simulation_output("PASS a\nFAIL b"), (0, 1));
        assert_eq!(parse_simulation_output(""), (0, 1));
    }

    #[test]
    fn test_first_matching_pattern_wins() {
        let out = "PASSED: 1, FAILED: 1\n2/2 tests passed";
        assert_eq!(parse_simulation_output(out), (2, 2));
    }

    #[test]
    fn test_failure_lines() {
        let out = "Test 1 ok\nTest 2 FAILED: y=1 expected 0\nERROR: mismatch at t=20\nDone";
        let lines = failure_lines(out);
        assert_eq!(
            lines,
            vec!["Test 2 FAILED: y=1 expected 0", "ERROR: mismatch at t=20"]
        );
    }

    #[test]
    fn test_find_trace_prefers_default_name() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(find_trace(dir.path()), None);

        std::fs::write(dir.path().join("other.vcd"), "").unwrap();
        assert_eq!(find_trace(dir.path()), Some(dir.path().join("other.vcd")));

        std::fs::write(dir.path().join(DUMP_FILE), "").unwrap();
        assert_eq!(find_trace(dir.path()), Some(dir.path().join(DUMP_FILE)));
    }

    #[tokio::test]
    async fn test_prepare_dumping_testbench() {
        let dir = tempfile::tempdir().unwrap();
        let tb = dir.path().join("tb.v");
        std::fs::write(&tb, "module tb;\ninitial begin\n  #10 $finish;\nend\nendmodule\n").unwrap();

        let written = prepare_dumping_testbench(&tb, dir.path()).await.unwrap();
        let content = std::fs::read_to_string(written).unwrap();
        assert!(content.contains("$dumpfile(\"waveform.vcd\")"));
        assert!(content.contains("$dumpvars"));
    }
}
