//! Natural-language feedback for the next generation request.
//!
//! Each section (compile, simulation, semantic) is rendered and truncated
//! independently, then the present sections are joined with a `---`
//! delimiter and the whole block is truncated again.

use crate::domain::TaskCategory;
use crate::waveform::WaveformDiff;

pub const DEFAULT_MAX_FEEDBACK_LEN: usize = 500;

const SECTION_DELIMITER: &str = "\n\n---\n\n";
const ELLIPSIS: &str = "...";
const MAX_COMPILE_ERRORS: usize = 5;
const MAX_ERROR_LEN: usize = 100;
const MAX_SIM_ERRORS: usize = 3;
const MAX_WAVEFORM_SIGNALS: usize = 3;
const MAX_HINTS: usize = 5;

/// Longest prefix of `s` that fits in `max` bytes on a char boundary.
pub fn truncate_to(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Everything the composer may draw on for one attempt.
#[derive(Debug, Clone, Copy)]
pub struct FeedbackInput<'a> {
    pub compile_errors: &'a [String],
    pub sim_errors: &'a [String],
    pub waveform: Option<&'a WaveformDiff>,
    pub hints: &'a [String],
    pub category: TaskCategory,
    pub code: &'a str,
}

#[derive(Debug, Clone)]
pub struct FeedbackComposer {
    max_len: usize,
    category_feedback: bool,
}

impl Default for FeedbackComposer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FEEDBACK_LEN)
    }
}

impl FeedbackComposer {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            category_feedback: false,
        }
    }

    /// Add FSM and mixed-design reminders to the sections.
    pub fn with_category_feedback(mut self, enabled: bool) -> Self {
        self.category_feedback = enabled;
        self
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    fn bounded(&self, text: String) -> Option<String> {
        if text.is_empty() {
            None
        } else {
            Some(truncate_to(&text, self.max_len).to_string())
        }
    }

    pub fn compile_section(&self, errors: &[String], category: TaskCategory) -> Option<String> {
        if errors.is_empty() {
            return None;
        }

        let mut text = String::from("Compilation errors found:\n");
        for (i, error) in errors.iter().take(MAX_COMPILE_ERRORS).enumerate() {
            let clean = error.trim();
            let shown = truncate_to(clean, MAX_ERROR_LEN);
            let marker = if shown.len() < clean.len() { ELLIPSIS } else { "" };
            text.push_str(&format!("{}. {shown}{marker}\n", i + 1));
        }

        if self.category_feedback {
            let error_text = errors.join(" ").to_lowercase();
            for trigger in category_compile_triggers(category, &error_text) {
                text.push_str(trigger);
            }
        }

        text.push_str("\nPlease fix these errors in your Verilog code.");
        self.bounded(text)
    }

    pub fn simulation_section(
        &self,
        sim_errors: &[String],
        waveform: Option<&WaveformDiff>,
        category: TaskCategory,
        code: &str,
    ) -> Option<String> {
        let mut text = String::new();

        if !sim_errors.is_empty() {
            text.push_str("Simulation errors:\n");
            for error in sim_errors.iter().take(MAX_SIM_ERRORS) {
                text.push_str(&format!("- {error}\n"));
            }
        }

        if let Some(diff) = waveform.filter(|d| !d.is_empty()) {
            text.push_str("\nWaveform mismatches detected:\n");
            for sig in diff.signals.iter().take(MAX_WAVEFORM_SIGNALS) {
                text.push_str(&format!(
                    "- Signal '{}' has {} mismatch(es)\n",
                    sig.signal,
                    sig.mismatches.len()
                ));
            }
            text.push_str("\nPlease review the logic implementation.");
        }

        if self.category_feedback && !text.is_empty() && !code.is_empty() {
            match category {
                TaskCategory::Fsm => text.push_str(
                    "\n--- FSM Logic Check:\n\
                     Verify state transitions are correct in the combinational block.\n\
                     Ensure next_state logic matches the state machine specification.\n",
                ),
                TaskCategory::Mixed if code.to_lowercase().contains("alu") => text.push_str(
                    "\n--- Mixed Design Logic Check:\n\
                     For ALU: verify each operation is correctly implemented.\n\
                     Check that carry_out and zero flags are computed correctly.\n",
                ),
                _ => {}
            }
        }

        self.bounded(text)
    }

    pub fn semantic_section(&self, hints: &[String], category: TaskCategory) -> Option<String> {
        if hints.is_empty() {
            return None;
        }

        let mut text = String::from("Semantic analysis suggests:\n");
        for (i, hint) in hints.iter().take(MAX_HINTS).enumerate() {
            text.push_str(&format!("{}. {hint}\n", i + 1));
        }

        if self.category_feedback {
            match category {
                TaskCategory::Fsm => text.push_str(
                    "\n--- FSM Structure Reminder:\n\
                     Use one clocked block for state <= next_state and one combinational \
                     block with a case statement for next_state.\n\
                     Include a default case in every case statement.\n",
                ),
                TaskCategory::Mixed => text.push_str(
                    "\n--- Mixed Design Reminder:\n\
                     Use combinational always blocks for ALU operations.\n\
                     Initialize outputs before the case statement.\n",
                ),
                _ => {}
            }
        }

        text.push_str("\nPlease address these issues in your design.");
        self.bounded(text)
    }

    /// Join the present sections and bound the result to `max_len` bytes.
    pub fn compose(
        &self,
        compile: Option<&str>,
        simulation: Option<&str>,
        semantic: Option<&str>,
    ) -> String {
        let sections: Vec<&str> = [compile, simulation, semantic]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect();
        let combined = sections.join(SECTION_DELIMITER);

        if combined.len() <= self.max_len {
            return combined;
        }
        // No room for the marker.
        if self.max_len < ELLIPSIS.len() {
            return truncate_to(&combined, self.max_len).to_string();
        }
        let keep = self.max_len.saturating_sub(ELLIPSIS.len());
        format!("{}{ELLIPSIS}", truncate_to(&combined, keep))
    }

    /// Render every section for one attempt and combine them.
    pub fn render(&self, input: &FeedbackInput<'_>) -> String {
        let compile = self.compile_section(input.compile_errors, input.category);
        let simulation =
            self.simulation_section(input.sim_errors, input.waveform, input.category, input.code);
        let semantic = self.semantic_section(input.hints, input.category);
        self.compose(compile.as_deref(), simulation.as_deref(), semantic.as_deref())
    }
}

fn category_compile_triggers(category: TaskCategory, error_text: &str) -> Vec<&'static str> {
    let mut triggers = Vec::new();
    match category {
        TaskCategory::Fsm => {
            if error_text.contains("case") && !error_text.contains("always") {
                triggers.push(
                    "\n--- FSM Issue Detected:\n- Case statement appears outside an always block. \
                     Move it into a combinational always block.\n",
                );
            }
            if error_text.contains("unexpected") && error_text.contains("case") {
                triggers.push(
                    "\n--- FSM Issue Detected:\n- Multi-statement case branches missing begin/end.\n",
                );
            }
        }
        TaskCategory::Mixed => {
            if error_text.contains("unexpected 'end'") || error_text.contains("unexpected end") {
                triggers.push(
                    "\n--- Mixed Design Issue Detected:\n- Stray 'end' in case item. \
                     Use begin/end for multi-statement branches.\n",
                );
            }
            if error_text.contains("case")
                && (error_text.contains("unexpected") || error_text.contains("missing"))
            {
                triggers.push(
                    "\n--- Mixed Design Issue Detected:\n- Multi-statement case branches without begin/end.\n",
                );
            }
        }
        _ => {}
    }
    triggers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_compile_section_lists_first_five_errors() {
        let composer = FeedbackComposer::default();
        let errors = v(&["e1", "e2", "e3", "e4", "e5", "e6"]);
        let text = composer
            .compile_section(&errors, TaskCategory::Combinational)
            .unwrap();
        assert!(text.starts_with("Compilation errors found:\n1. e1\n"));
        assert!(text.contains("5. e5"));
        assert!(!text.contains("e6"));
        assert!(text.ends_with("Please fix these errors in your Verilog code."));
    }

    #[test]
    fn test_long_errors_are_clipped() {
        let composer = FeedbackComposer::default();
        let errors = vec!["x".repeat(150)];
        let text = composer
            .compile_section(&errors, TaskCategory::Combinational)
            .unwrap();
        assert!(text.contains(&format!("1. {}...\n", "x".repeat(100))));
    }

    #[test]
    fn test_empty_inputs_produce_no_sections() {
        let composer = FeedbackComposer::default();
        assert!(composer.compile_section(&[], TaskCategory::Fsm).is_none());
        assert!(composer
            .simulation_section(&[], None, TaskCategory::Fsm, "")
            .is_none());
        assert!(composer.semantic_section(&[], TaskCategory::Fsm).is_none());
        assert_eq!(composer.compose(None, None, None), "");
    }

    #[test]
    fn test_compose_joins_with_delimiter() {
        let composer = FeedbackComposer::default();
        let out = composer.compose(Some("A"), None, Some("C"));
        assert_eq!(out, "A\n\n---\n\nC");
    }

    #[test]
    fn test_compose_truncates_with_ellipsis() {
        let composer = FeedbackComposer::new(20);
        let out = composer.compose(Some(&"a".repeat(30)), Some("b"), None);
        assert_eq!(out.len(), 20);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn test_sections_are_bounded_individually() {
        let composer = FeedbackComposer::new(60);
        let hints = v(&[&"h".repeat(80)]);
        let text = composer
            .semantic_section(&hints, TaskCategory::Combinational)
            .unwrap();
        assert_eq!(text.len(), 60);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_to("héllo", 2), "h");
        assert_eq!(truncate_to("abc", 10), "abc");
    }

    #[test]
    fn test_compose_below_marker_width() {
        for max_len in 0..ELLIPSIS.len() {
            let out = FeedbackComposer::new(max_len).compose(Some("abcdef"), None, None);
            assert_eq!(out, &"abcdef"[..max_len]);
        }
        let out = FeedbackComposer::new(3).compose(Some("abcdef"), None, None);
        assert_eq!(out, "...");
    }

    #[test]
    fn test_simulation_section_lists_waveform_signals() {
        use crate::waveform::{Mismatch, SignalDiff};
        let diff = WaveformDiff {
            signals: vec![SignalDiff {
                signal: "tb.q".into(),
                mismatches: vec![
                    Mismatch { time: 1, expected: "0".into(), actual: "1".into() },
                    Mismatch { time: 2, expected: "1".into(), actual: "0".into() },
                ],
                initial_mismatch: false,
            }],
        };
        let composer = FeedbackComposer::default();
        let text = composer
            .simulation_section(&v(&["1/2 tests passed"]), Some(&diff), TaskCategory::Sequential, "")
            .unwrap();
        assert!(text.starts_with("Simulation errors:\n- 1/2 tests passed\n"));
        assert!(text.contains("- Signal 'tb.q' has 2 mismatch(es)"));
    }

    #[test]
    fn test_category_reminders_only_when_enabled() {
        let hints = v(&["Review logic implementation for correctness"]);
        let plain = FeedbackComposer::default()
            .semantic_section(&hints, TaskCategory::Fsm)
            .unwrap();
        assert!(!plain.contains("FSM Structure Reminder"));

        let aware = FeedbackComposer::new(1000)
            .with_category_feedback(true)
            .semantic_section(&hints, TaskCategory::Fsm)
            .unwrap();
        assert!(aware.contains("FSM Structure Reminder"));
    }

    #[test]
    fn test_mixed_compile_trigger() {
        let composer = FeedbackComposer::new(1000).with_category_feedback(true);
        let errors = v(&["alu.v:12: syntax error, unexpected end"]);
        let text = composer.compile_section(&errors, TaskCategory::Mixed).unwrap();
        assert!(text.contains("Stray 'end' in case item"));
    }

    #[test]
    fn test_render_combines_all_sections() {
        let compile = v(&["t.v:1: syntax error"]);
        let hints = v(&["Fix syntax error in code structure"]);
        let input = FeedbackInput {
            compile_errors: &compile,
            sim_errors: &[],
            waveform: None,
            hints: &hints,
            category: TaskCategory::Combinational,
            code: "",
        };
        let out = FeedbackComposer::new(2000).render(&input);
        assert!(out.contains("t.v:1: syntax error"));
        assert!(out.contains("\n---\n"));
        assert!(out.contains("Fix syntax error in code structure"));
    }
}
