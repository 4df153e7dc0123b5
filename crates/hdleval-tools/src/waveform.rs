//! Reference traces for waveform comparison.
//!
//! The reference design is simulated once per (reference, testbench) pair
//! with the same dumping testbench the candidate used; the parsed trace is
//! kept for later attempts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hdleval_core::{compare_traces, parse_vcd, Candidate, Trace, WaveformAnalyzer, WaveformDiff};
use tracing::debug;

use crate::runner::is_tool_available;
use crate::simulator::{build_and_run, find_trace, prepare_dumping_testbench};

type TraceKey = (PathBuf, PathBuf);

#[derive(Debug, Default)]
pub struct ReferenceTraceAnalyzer {
    traces: Mutex<HashMap<TraceKey, Arc<Trace>>>,
}

impl ReferenceTraceAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    fn cached(&self, key: &TraceKey) -> Option<Arc<Trace>> {
        self.traces
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    async fn reference_trace(
        &self,
        reference_hdl: &Path,
        testbench: &Path,
        workdir: &Path,
        timeout: Duration,
    ) -> Option<Arc<Trace>> {
        let key = (reference_hdl.to_path_buf(), testbench.to_path_buf());
        if let Some(trace) = self.cached(&key) {
            return Some(trace);
        }

        let ref_dir = workdir.join("reference");
        if let Err(e) = tokio::fs::create_dir_all(&ref_dir).await {
            debug!(error = %e, "could not create reference trace directory");
            return None;
        }
        let dumping_tb = match prepare_dumping_testbench(testbench, &ref_dir).await {
            Ok(path) => path,
            Err(e) => {
                debug!(error = %e, "could not prepare reference testbench");
                return None;
            }
        };
        if let Err(reason) = build_and_run(reference_hdl, &dumping_tb, &ref_dir, timeout).await {
            debug!(reason = %reason, "reference simulation failed");
            return None;
        }

        let text = tokio::fs::read_to_string(find_trace(&ref_dir)?).await.ok()?;
        let trace = Arc::new(parse_vcd(&text));
        if trace.is_empty() {
            debug!("reference trace has no signals");
            return None;
        }

        self.traces
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, Arc::clone(&trace));
        Some(trace)
    }
}

#[async_trait]
impl WaveformAnalyzer for ReferenceTraceAnalyzer {
    fn is_available(&self) -> bool {
        is_tool_available("iverilog") && is_tool_available("vvp")
    }

    async fn diff(
        &self,
        reference_hdl: &Path,
        testbench: &Path,
        candidate_trace: &Path,
        candidate: &Candidate,
        timeout: Duration,
    ) -> Option<WaveformDiff> {
        let text = match tokio::fs::read_to_string(candidate_trace).await {
            Ok(text) => text,
            Err(e) => {
                debug!(error = %e, "candidate trace unreadable");
                return None;
            }
        };
        let reference = self
            .reference_trace(reference_hdl, testbench, &candidate.workdir, timeout)
            .await?;
        Some(compare_traces(&reference, &parse_vcd(&text)))
    }
}
