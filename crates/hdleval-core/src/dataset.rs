//! Dataset manifest loading.
//!
//! A manifest is a JSON array of task records. Reference paths are
//! resolved against the manifest's directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::domain::{EvalError, Result, Task};

/// Load every task from the manifest at `path`.
pub fn load_manifest(path: &Path) -> Result<Vec<Task>> {
    let content = std::fs::read_to_string(path)?;
    let mut tasks: Vec<Task> =
        serde_json::from_str(&content).map_err(|e| EvalError::InvalidManifest {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let root = path.parent().unwrap_or_else(|| Path::new("."));
    let mut seen = BTreeMap::new();
    for (position, task) in tasks.iter_mut().enumerate() {
        if task.task_id.trim().is_empty() {
            return Err(EvalError::InvalidManifest {
                path: path.to_path_buf(),
                reason: format!("task at position {position} has an empty task_id"),
            });
        }
        if let Some(first) = seen.insert(task.task_id.clone(), position) {
            return Err(EvalError::InvalidManifest {
                path: path.to_path_buf(),
                reason: format!(
                    "duplicate task_id {:?} at positions {first} and {position}",
                    task.task_id
                ),
            });
        }
        task.reference_hdl = task.reference_hdl.take().map(|p| resolve(root, p));
        task.reference_testbench = task.reference_testbench.take().map(|p| resolve(root, p));
    }

    tracing::debug!(path = ?path, tasks = tasks.len(), "manifest loaded");
    Ok(tasks)
}

fn resolve(root: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        root.join(path)
    }
}

/// Which reference file is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Hdl,
    Testbench,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingReference {
    pub task_id: String,
    pub kind: ReferenceKind,
    /// `None` when the manifest declares no path at all.
    pub path: Option<PathBuf>,
}

/// Report every task whose reference HDL or testbench is absent.
pub fn validate_tasks(tasks: &[Task]) -> Vec<MissingReference> {
    let mut missing = Vec::new();
    for task in tasks {
        for (kind, path) in [
            (ReferenceKind::Hdl, &task.reference_hdl),
            (ReferenceKind::Testbench, &task.reference_testbench),
        ] {
            if !path.as_deref().is_some_and(Path::is_file) {
                missing.push(MissingReference {
                    task_id: task.task_id.clone(),
                    kind,
                    path: path.clone(),
                });
            }
        }
    }
    missing
}
