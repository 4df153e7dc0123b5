//! Formal equivalence checking with Yosys.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use hdleval_core::{parse_equiv_output, Candidate, EquivReport, EquivalenceChecker};
use tracing::debug;

use crate::runner::{is_tool_available, run_tool, ToolCommand, ToolOutcome};

/// Sequential induction depth for `equiv_simple`.
const SEQ_DEPTH: u32 = 10;

#[derive(Debug, Clone, Copy, Default)]
pub struct YosysEquivalenceChecker;

/// Script proving `candidate` equivalent to `reference`.
pub fn equivalence_script(reference: &Path, candidate: &Path) -> String {
    format!(
        "# Reference design\n\
         read_verilog \"{reference}\"\n\
         hierarchy -top -check\n\
         proc; opt; fsm; opt; memory; opt\n\
         rename -top ref_design\n\
         \n\
         # Candidate design\n\
         read_verilog \"{candidate}\"\n\
         hierarchy -top -check\n\
         proc; opt; fsm; opt; memory; opt\n\
         rename -top gen_design\n\
         \n\
         equiv_make ref_design gen_design equiv\n\
         equiv_simple -seq {SEQ_DEPTH}\n\
         equiv_status -assert\n",
        reference = reference.display(),
        candidate = candidate.display(),
    )
}

#[async_trait]
impl EquivalenceChecker for YosysEquivalenceChecker {
    fn is_available(&self) -> bool {
        is_tool_available("yosys")
    }

    async fn check(&self, reference: &Path, candidate: &Candidate, timeout: Duration) -> EquivReport {
        let script_path = candidate.workdir.join("equiv_check.ys");
        let script = equivalence_script(reference, &candidate.source_path);
        if let Err(e) = tokio::fs::write(&script_path, script).await {
            return EquivReport::error(format!("failed to write equivalence script: {e}"));
        }

        let cmd = ToolCommand::new("yosys", timeout)
            .arg("-s")
            .arg(script_path.as_os_str())
            .current_dir(&candidate.workdir);

        match run_tool(&cmd).await {
            ToolOutcome::Finished(output) => {
                let report_path = candidate.workdir.join("equiv_report.txt");
                let transcript = format!("{}\n{}", output.stdout, output.stderr);
                if let Err(e) = tokio::fs::write(&report_path, transcript).await {
                    debug!(error = %e, "could not save equivalence transcript");
                }
                parse_equiv_output(&output.stdout, &output.stderr)
            }
            ToolOutcome::TimedOut { .. } => EquivReport::timeout(),
            other => EquivReport::error(other.describe()),
        }
    }
}
