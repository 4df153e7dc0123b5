//! Concurrent evaluation of independent (task, generator, repetition) runs.
//!
//! Runs share nothing but the controller's collaborators, so the only
//! shared mutable state is the generation cache.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::controller::RefinementController;
use crate::domain::{RunOutcome, Task};
use crate::generator::Generator;

/// The outcome of one run, tagged with what produced it.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub task_id: String,
    pub generator: String,
    pub repetition: u32,
    pub outcome: RunOutcome,
}

/// Evaluate every task with every generator `repetitions` times, at most
/// `concurrency` runs at once.
///
/// Results come back in (task, generator, repetition) order. A run whose
/// task panics outside the controller's attempt boundary is logged and
/// left out.
pub async fn run_batch(
    controller: Arc<RefinementController>,
    tasks: Vec<Task>,
    generators: Vec<Arc<dyn Generator>>,
    repetitions: u32,
    concurrency: usize,
) -> Vec<BatchResult> {
    let sem = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::new();

    for task in tasks.into_iter().map(Arc::new) {
        for generator in &generators {
            for repetition in 0..repetitions {
                let controller = Arc::clone(&controller);
                let task = Arc::clone(&task);
                let generator = Arc::clone(generator);
                let sem = Arc::clone(&sem);

                let handle = tokio::spawn(async move {
                    let _permit = sem.acquire_owned().await.ok();
                    let outcome = controller.run(&task, generator.as_ref(), repetition).await;
                    BatchResult {
                        task_id: task.task_id.clone(),
                        generator: generator.name().to_string(),
                        repetition,
                        outcome,
                    }
                });
                handles.push(handle);
            }
        }
    }

    let total = handles.len();
    let mut results = Vec::with_capacity(total);
    for handle in handles {
        match handle.await {
            Ok(result) => results.push(result),
            Err(e) => warn!(error = %e, "evaluation task aborted"),
        }
    }

    info!(runs = results.len(), scheduled = total, "batch finished");
    results
}
