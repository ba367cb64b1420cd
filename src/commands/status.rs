use anyhow::{Context, Result};
use log::debug;

use crate::task::TrainingService;

use super::print_json;

/// Print the current state of a training task
#[tracing::instrument(skip(service))]
pub async fn status<S: TrainingService>(service: &S, task_id: &str) -> Result<()> {
    let task = service
        .poll_status(task_id)
        .await
        .with_context(|| format!("Failed to get status of task {}", task_id))?;
    debug!("Task {} is {}", task.task_id, task.status);

    print_json(&task)
}
