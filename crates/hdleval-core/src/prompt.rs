//! Prompt construction for generation requests.

use crate::domain::Task;

/// Renders the base prompt for a task.
///
/// The refinement loop appends feedback to whatever the strategy produces,
/// so implementations only describe the first request.
pub trait PromptStrategy: Send + Sync {
    fn base_prompt(&self, task: &Task) -> String;
}

/// Strict rule-list prompt naming the expected module and its ports.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstrainedPrompt;

impl PromptStrategy for ConstrainedPrompt {
    fn base_prompt(&self, task: &Task) -> String {
        let module = task.module_name();
        let mut prompt = String::with_capacity(task.specification.len() + 768);
        prompt.push_str("Generate ONLY synthesizable Verilog code. Follow these rules EXACTLY:\n\n");
        prompt.push_str(&format!("SPECIFICATION: {}\n\n", task.specification.trim()));
        prompt.push_str(&format!("MODULE NAME: {module}\n"));
        if !task.inputs.is_empty() {
            prompt.push_str(&format!("INPUTS: {}\n", task.inputs.join(", ")));
        }
        if !task.outputs.is_empty() {
            prompt.push_str(&format!("OUTPUTS: {}\n", task.outputs.join(", ")));
        }
        prompt.push_str(&format!(
            "\nMANDATORY RULES:\n\
             1. Start with: module {module}(\n\
             2. Declare all ports with 'input wire' or 'output wire'\n\
             3. For combinational logic, use ONLY 'assign' statements\n\
             4. For sequential logic, use 'output reg' and 'always @(posedge clk)'\n\
             5. End with: endmodule\n\
             6. NO explanations, NO comments, NO text outside the module\n\n\
             CORRECT FORMAT:\n\
             module {module}(<ports>);\n    <logic>\nendmodule\n\n\
             Generate ONLY the Verilog module now:\n"
        ));
        prompt
    }
}

/// Base prompt followed by the previous attempt's feedback.
pub fn refinement_prompt(base: &str, feedback: &str) -> String {
    format!(
        "{base}\n\n---\nFEEDBACK FROM PREVIOUS ATTEMPT:\n{feedback}\n\n\
         Please address the issues above and regenerate the Verilog code."
    )
}

/// Prompt for a given attempt: the base prompt, plus feedback when there is any.
pub fn prompt_for_attempt(
    strategy: &dyn PromptStrategy,
    task: &Task,
    feedback: Option<&str>,
) -> String {
    let base = strategy.base_prompt(task);
    match feedback {
        Some(text) if !text.trim().is_empty() => refinement_prompt(&base, text),
        _ => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskCategory;

    fn task() -> Task {
        Task::new(
            "comb_mux_2to1_001",
            "A 2-to-1 multiplexer selecting a or b on sel.",
            TaskCategory::Combinational,
        )
        .with_ports(["a", "b", "sel"], ["y"])
    }

    #[test]
    fn test_constrained_prompt_names_module_and_ports() {
        let prompt = ConstrainedPrompt.base_prompt(&task());
        assert!(prompt.contains("module mux_2to1("));
        assert!(prompt.contains("INPUTS: a, b, sel"));
        assert!(prompt.contains("OUTPUTS: y"));
        assert!(prompt.contains("2-to-1 multiplexer"));
    }

    #[test]
    fn test_first_attempt_has_no_feedback_block() {
        let prompt = prompt_for_attempt(&ConstrainedPrompt, &task(), None);
        assert!(!prompt.contains("FEEDBACK FROM PREVIOUS ATTEMPT"));

        let blank = prompt_for_attempt(&ConstrainedPrompt, &task(), Some("  "));
        assert_eq!(prompt, blank);
    }

    #[test]
    fn test_refinement_prompt_appends_feedback() {
        let prompt = prompt_for_attempt(&ConstrainedPrompt, &task(), Some("missing semicolon"));
        assert!(prompt.starts_with(&ConstrainedPrompt.base_prompt(&task())));
        assert!(prompt.contains("FEEDBACK FROM PREVIOUS ATTEMPT:\nmissing semicolon"));
    }
}
