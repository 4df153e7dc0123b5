//! Run configuration and named presets.
//!
//! A [`RunConfiguration`] is built once per run and never mutated while the
//! run is in flight. Per-task adjustments (see [`crate::tiering`]) derive a
//! fresh copy instead.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use super::task::TaskCategory;

/// How aggressively fast-path shortcuts are applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalMode {
    /// Tiered iteration caps, entropy gating and caching.
    #[default]
    Fast,
    /// Full pipeline for every task; entropy gating is never applied.
    Strict,
}

/// Named configuration profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigPreset {
    /// General refinement profile: five iterations, fast mode, entropy gating on.
    Refinement,
    /// Deeper profile for FSM and mixed designs: strict mode, formal checks,
    /// category-aware feedback and larger per-category caps.
    Targeted,
}

/// Iteration caps per task category, applied by tiering in fast mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCaps {
    pub combinational: u32,
    pub sequential: u32,
    pub mixed: u32,
    pub fsm: u32,
}

impl CategoryCaps {
    pub fn cap_for(&self, category: TaskCategory) -> u32 {
        match category {
            TaskCategory::Combinational => self.combinational,
            TaskCategory::Sequential => self.sequential,
            TaskCategory::Mixed => self.mixed,
            TaskCategory::Fsm => self.fsm,
        }
    }
}

impl Default for CategoryCaps {
    fn default() -> Self {
        Self {
            combinational: 1,
            sequential: 2,
            mixed: 2,
            fsm: 4,
        }
    }
}

/// Multi-sample confidence tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceSettings {
    pub enabled: bool,

    /// Total samples per attempt, including the primary generation.
    pub samples: usize,

    /// Sampling temperature for the extra samples.
    pub sample_temperature: f32,
}

impl Default for ConfidenceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            samples: 3,
            sample_temperature: 0.3,
        }
    }
}

/// Gate parameters that replace the global ones for a single category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateOverride {
    pub enabled: bool,
    pub threshold: f64,
}

/// Entropy-based simulation gating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntropyGateSettings {
    pub enabled: bool,

    /// Attempts with entropy strictly above this value skip simulation.
    pub threshold: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mixed: Option<GateOverride>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fsm: Option<GateOverride>,
}

impl EntropyGateSettings {
    /// Whether an attempt with the given entropy must be fast-skipped.
    pub fn trips(&self, entropy: Option<f64>) -> bool {
        match entropy {
            Some(e) => self.enabled && e > self.threshold,
            None => false,
        }
    }

    /// Settings with the category override (if any) folded in.
    pub fn for_category(&self, category: TaskCategory) -> Self {
        let over = match category {
            TaskCategory::Mixed => self.mixed.as_ref(),
            TaskCategory::Fsm => self.fsm.as_ref(),
            _ => None,
        };
        match over {
            Some(o) => Self {
                enabled: o.enabled,
                threshold: o.threshold,
                ..self.clone()
            },
            None => self.clone(),
        }
    }
}

impl Default for EntropyGateSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.3,
            mixed: None,
            fsm: None,
        }
    }
}

/// Timeouts for the external verification tools, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolTimeouts {
    pub compile_secs: u64,
    pub simulate_secs: u64,
    pub formal_secs: u64,
}

impl ToolTimeouts {
    pub fn compile(&self) -> Duration {
        Duration::from_secs(self.compile_secs)
    }

    pub fn simulate(&self) -> Duration {
        Duration::from_secs(self.simulate_secs)
    }

    pub fn formal(&self) -> Duration {
        Duration::from_secs(self.formal_secs)
    }
}

impl Default for ToolTimeouts {
    fn default() -> Self {
        Self {
            compile_secs: 30,
            simulate_secs: 30,
            formal_secs: 60,
        }
    }
}

/// Immutable per-run policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfiguration {
    pub mode: EvalMode,

    pub max_iterations: u32,

    pub adaptive_stopping: bool,

    /// Minimum score gain between the last two attempts to keep going.
    pub min_improvement: f64,

    /// Derive per-task settings from the task tier.
    pub task_tiers: bool,

    pub category_caps: CategoryCaps,

    pub confidence: ConfidenceSettings,

    pub entropy_gate: EntropyGateSettings,

    /// Wall-clock budget for one (task, generator, repetition) run.
    pub task_budget_secs: f64,

    pub waveform_analysis: bool,

    pub formal_verification: bool,

    pub generation_cache: bool,

    /// Append category-specific reminders to feedback for FSM and mixed tasks.
    pub category_feedback: bool,

    pub feedback_max_len: usize,

    /// Temperature for the primary generation of each attempt.
    pub temperature: f32,

    pub timeouts: ToolTimeouts,
}

impl Default for RunConfiguration {
    fn default() -> Self {
        Self::preset(ConfigPreset::Refinement)
    }
}

impl RunConfiguration {
    /// Build a named preset.
    pub fn preset(preset: ConfigPreset) -> Self {
        match preset {
            ConfigPreset::Refinement => Self {
                mode: EvalMode::Fast,
                max_iterations: 5,
                adaptive_stopping: true,
                min_improvement: 0.1,
                task_tiers: true,
                category_caps: CategoryCaps::default(),
                confidence: ConfidenceSettings::default(),
                entropy_gate: EntropyGateSettings::default(),
                task_budget_secs: 60.0,
                waveform_analysis: true,
                formal_verification: false,
                generation_cache: true,
                category_feedback: false,
                feedback_max_len: crate::feedback::DEFAULT_MAX_FEEDBACK_LEN,
                temperature: 0.0,
                timeouts: ToolTimeouts::default(),
            },
            ConfigPreset::Targeted => Self {
                mode: EvalMode::Strict,
                max_iterations: 6,
                adaptive_stopping: true,
                min_improvement: 0.05,
                task_tiers: true,
                category_caps: CategoryCaps {
                    combinational: 1,
                    sequential: 3,
                    mixed: 6,
                    fsm: 7,
                },
                confidence: ConfidenceSettings::default(),
                entropy_gate: EntropyGateSettings {
                    enabled: false,
                    threshold: 0.3,
                    mixed: Some(GateOverride {
                        enabled: false,
                        threshold: 0.20,
                    }),
                    fsm: Some(GateOverride {
                        enabled: false,
                        threshold: 0.05,
                    }),
                },
                task_budget_secs: 90.0,
                waveform_analysis: true,
                formal_verification: true,
                generation_cache: true,
                category_feedback: true,
                feedback_max_len: crate::feedback::DEFAULT_MAX_FEEDBACK_LEN,
                temperature: 0.0,
                timeouts: ToolTimeouts::default(),
            },
        }
    }

    /// Derive a copy running in `mode`.
    pub fn with_mode(&self, mode: EvalMode) -> Self {
        Self {
            mode,
            ..self.clone()
        }
    }

    pub fn task_budget(&self) -> Duration {
        Duration::from_secs_f64(self.task_budget_secs.max(0.0))
    }

    /// Reject values the controller cannot honour.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if !(0.0..=1.0).contains(&self.entropy_gate.threshold) {
            return Err(ConfigError::OutOfUnitRange {
                field: "entropy_gate.threshold",
                value: self.entropy_gate.threshold,
            });
        }
        for (field, over) in [
            ("entropy_gate.mixed.threshold", &self.entropy_gate.mixed),
            ("entropy_gate.fsm.threshold", &self.entropy_gate.fsm),
        ] {
            if let Some(o) = over {
                if !(0.0..=1.0).contains(&o.threshold) {
                    return Err(ConfigError::OutOfUnitRange {
                        field,
                        value: o.threshold,
                    });
                }
            }
        }
        if self.confidence.enabled && self.confidence.samples == 0 {
            return Err(ConfigError::ZeroSamples);
        }
        if !(self.task_budget_secs > 0.0) {
            return Err(ConfigError::NonPositiveBudget(self.task_budget_secs));
        }
        if self.feedback_max_len < 4 {
            return Err(ConfigError::FeedbackTooShort(self.feedback_max_len));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refinement_preset_values() {
        let config = RunConfiguration::preset(ConfigPreset::Refinement);
        assert_eq!(config.mode, EvalMode::Fast);
        assert_eq!(config.max_iterations, 5);
        assert!(config.adaptive_stopping);
        assert!((config.min_improvement - 0.1).abs() < f64::EPSILON);
        assert!(config.entropy_gate.enabled);
        assert!(!config.formal_verification);
        assert_eq!(config.task_budget(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_targeted_preset_values() {
        let config = RunConfiguration::preset(ConfigPreset::Targeted);
        assert_eq!(config.mode, EvalMode::Strict);
        assert_eq!(config.max_iterations, 6);
        assert_eq!(config.category_caps.cap_for(TaskCategory::Fsm), 7);
        assert!(config.formal_verification);
        assert!(config.category_feedback);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_with_mode_leaves_original_untouched() {
        let base = RunConfiguration::default();
        let strict = base.with_mode(EvalMode::Strict);
        assert_eq!(base.mode, EvalMode::Fast);
        assert_eq!(strict.mode, EvalMode::Strict);
        assert_eq!(strict.max_iterations, base.max_iterations);
    }

    #[test]
    fn test_gate_trips_only_above_threshold() {
        let gate = EntropyGateSettings::default();
        assert!(gate.trips(Some(0.5)));
        assert!(!gate.trips(Some(0.3)));
        assert!(!gate.trips(None));

        let disabled = EntropyGateSettings {
            enabled: false,
            ..Default::default()
        };
        assert!(!disabled.trips(Some(0.99)));
    }

    #[test]
    fn test_gate_category_override() {
        let gate = RunConfiguration::preset(ConfigPreset::Targeted).entropy_gate;
        let fsm = gate.for_category(TaskCategory::Fsm);
        assert!((fsm.threshold - 0.05).abs() < f64::EPSILON);
        let comb = gate.for_category(TaskCategory::Combinational);
        assert!((comb.threshold - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = RunConfiguration {
            max_iterations: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroIterations)));

        let mut config = RunConfiguration::default();
        config.entropy_gate.threshold = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfUnitRange { .. })
        ));

        let mut config = RunConfiguration::default();
        config.confidence.samples = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroSamples)));

        let config = RunConfiguration {
            task_budget_secs: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositiveBudget(_))
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RunConfiguration =
            serde_json::from_str(r#"{"max_iterations": 2, "mode": "strict"}"#).unwrap();
        assert_eq!(config.max_iterations, 2);
        assert_eq!(config.mode, EvalMode::Strict);
        assert_eq!(config.feedback_max_len, 500);
    }
}
