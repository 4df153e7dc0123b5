//! Task tiers and per-task configuration derivation.
//!
//! A tier is a coarse cost bucket. In fast mode it decides how many
//! attempts a task gets and which expensive oracles run; strict mode keeps
//! the full configuration for every task.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{Difficulty, EvalMode, RunConfiguration, Task, TaskCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Trivial,
    Simple,
    Complex,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Trivial => "trivial",
            Tier::Simple => "simple",
            Tier::Complex => "complex",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucket a task by category and declared difficulty.
pub fn assign_tier(task: &Task) -> Tier {
    match (task.category, task.difficulty) {
        (TaskCategory::Combinational, Difficulty::Easy) => Tier::Trivial,
        (TaskCategory::Combinational, _) => Tier::Simple,
        (TaskCategory::Sequential, Difficulty::Easy) => Tier::Simple,
        (TaskCategory::Sequential, _) => Tier::Complex,
        (TaskCategory::Fsm, _) | (TaskCategory::Mixed, _) => Tier::Complex,
    }
}

/// The tier of a task and the configuration derived for it.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskPlan {
    pub tier: Tier,
    pub config: RunConfiguration,
}

/// Derive the effective configuration for `task`.
///
/// Always returns a new configuration; `base` is left untouched.
pub fn plan_for_task(base: &RunConfiguration, task: &Task) -> TaskPlan {
    let tier = if base.task_tiers {
        assign_tier(task)
    } else {
        Tier::Complex
    };

    let mut config = base.clone();

    if base.mode == EvalMode::Strict {
        config.entropy_gate.enabled = false;
        return TaskPlan { tier, config };
    }

    if !base.task_tiers {
        return TaskPlan { tier, config };
    }

    match tier {
        Tier::Trivial => {
            config.max_iterations = 1;
            config.waveform_analysis = false;
            config.formal_verification = false;
        }
        Tier::Simple => {
            config.max_iterations = base.category_caps.sequential.min(base.max_iterations);
            config.waveform_analysis = false;
            config.formal_verification = false;
        }
        Tier::Complex => {
            config.max_iterations = base
                .category_caps
                .cap_for(task.category)
                .min(base.max_iterations);
            config.entropy_gate = base.entropy_gate.for_category(task.category);
            config.formal_verification =
                task.category == TaskCategory::Fsm && base.formal_verification;
            config.waveform_analysis = matches!(
                task.category,
                TaskCategory::Fsm | TaskCategory::Mixed
            ) && base.waveform_analysis;
        }
    }
    // A zero cap in a hand-written config would make the task unrunnable.
    config.max_iterations = config.max_iterations.max(1);

    TaskPlan { tier, config }
}
