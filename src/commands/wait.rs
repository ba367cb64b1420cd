use anyhow::{Context, Result, bail};
use log::info;
use std::sync::Arc;
use tokio::sync::Notify;

use crate::task::{
    ModelReference, TaskStatus, TrainingService, TrainingTask, WaitPolicy, wait_for_completion,
};

use super::print_json;

/// Wait for a training task to finish and print its final state
#[tracing::instrument(skip(service, policy))]
pub async fn wait<S: TrainingService>(
    service: &S,
    task_id: &str,
    policy: &WaitPolicy,
) -> Result<()> {
    let task = service
        .poll_status(task_id)
        .await
        .with_context(|| format!("Failed to get status of task {}", task_id))?;

    let task = wait_interruptibly(service, task, policy).await?;
    print_json(&task)?;
    ensure_succeeded(&task)?;
    Ok(())
}

/// Runs the wait loop with Ctrl-C wired to cancellation.
pub(crate) async fn wait_interruptibly<S: TrainingService>(
    service: &S,
    task: TrainingTask,
    policy: &WaitPolicy,
) -> Result<TrainingTask> {
    info!(
        "Waiting for task {} (polling every {:?})...",
        task.task_id, policy.interval
    );

    let cancel = Arc::new(Notify::new());
    let trigger = Arc::clone(&cancel);
    let ctrl_c_handler = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, no longer waiting.");
            trigger.notify_one();
        }
    });

    let result = wait_for_completion(service, task, policy, &cancel).await;
    ctrl_c_handler.abort();

    Ok(result?)
}

/// Returns the model of a finished task, or fails if training did not succeed.
pub(crate) fn ensure_succeeded(task: &TrainingTask) -> Result<&ModelReference> {
    match (task.status, &task.model_reference) {
        (TaskStatus::Succeeded, Some(model_reference)) => Ok(model_reference),
        (status, _) => bail!("Training task {} finished as {}", task.task_id, status),
    }
}
