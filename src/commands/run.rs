use anyhow::Result;
use log::info;
use std::path::Path;

use crate::runtime::Runtime;
use crate::task::{TrainingService, TrainingSubmission, WaitPolicy};

use super::predict::{OutputFormat, emit, score};
use super::train::submit;
use super::wait::{ensure_succeeded, wait_interruptibly};

/// Train on one file, wait for the model, then score another file
#[tracing::instrument(skip(runtime, service, policy))]
pub async fn run<R: Runtime, S: TrainingService>(
    runtime: &R,
    service: &S,
    train_file: &Path,
    predict_file: &Path,
    policy: &WaitPolicy,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<()> {
    let model_reference = match submit(runtime, service, train_file).await? {
        TrainingSubmission::Completed { model_reference, .. } => model_reference,
        TrainingSubmission::Deferred(task) => {
            let task = wait_interruptibly(service, task, policy).await?;
            ensure_succeeded(&task)?.clone()
        }
    };
    info!("Using model {}", model_reference);

    let result = score(runtime, service, predict_file, &model_reference).await?;
    emit(runtime, &result, format, output)
}
