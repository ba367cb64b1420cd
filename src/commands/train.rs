use anyhow::{Context, Result, bail};
use log::info;
use std::path::Path;

use crate::runtime::Runtime;
use crate::task::{TrainingService, TrainingSubmission, WaitPolicy};

use super::print_json;
use super::wait::{ensure_succeeded, wait_interruptibly};

/// Upload a CSV training set, optionally waiting for the model
#[tracing::instrument(skip(runtime, service, wait))]
pub async fn train<R: Runtime, S: TrainingService>(
    runtime: &R,
    service: &S,
    file: &Path,
    wait: Option<&WaitPolicy>,
) -> Result<()> {
    let submission = submit(runtime, service, file).await?;
    print_json(&submission)?;

    if let (Some(policy), TrainingSubmission::Deferred(task)) = (wait, &submission) {
        let task = wait_interruptibly(service, task.clone(), policy).await?;
        print_json(&task)?;
        ensure_succeeded(&task)?;
    }
    Ok(())
}

pub(crate) async fn submit<R: Runtime, S: TrainingService>(
    runtime: &R,
    service: &S,
    file: &Path,
) -> Result<TrainingSubmission> {
    let payload = runtime.read(file)?;
    if payload.is_empty() {
        bail!("{} is empty", file.display());
    }

    info!("Uploading {} byte(s) from {}...", payload.len(), file.display());
    service
        .submit_training(&payload)
        .await
        .context("Training request failed")
}
