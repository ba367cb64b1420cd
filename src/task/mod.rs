//! Training tasks, predictions and the service that runs them.
//!
//! The remote service owns every task's state. This module only observes it:
//! [`TrainingService::poll_status`] reads the current state and
//! [`TrainingTask::advance`] checks that what was read is a legal successor of
//! what was seen before.

mod client;
pub mod rows;
pub mod wait;
mod wire;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ClientError;

pub use client::AutoMlClient;
pub use rows::Record;
pub use wait::{WaitError, WaitPolicy, wait_for_completion};

/// Lifecycle of a training task as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }

    /// Maps a state string reported by the service. Case-insensitive.
    ///
    /// Returns `None` for anything unrecognized; callers must not guess.
    pub fn from_remote(state: &str) -> Option<Self> {
        match state.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" | "received" => Some(TaskStatus::Pending),
            "running" | "started" | "in_progress" | "progress" | "training" => {
                Some(TaskStatus::Running)
            }
            "succeeded" | "success" | "completed" | "done" | "finished" => {
                Some(TaskStatus::Succeeded)
            }
            "failed" | "failure" | "error" | "revoked" => Some(TaskStatus::Failed),
            _ => None,
        }
    }

    /// Whether a task observed in `self` may later be observed in `next`.
    ///
    /// Pending may jump straight to a terminal state. Terminal states only
    /// ever repeat.
    pub fn can_become(self, next: TaskStatus) -> bool {
        match (self, next) {
            (current, next) if current == next => true,
            (TaskStatus::Pending, _) => true,
            (TaskStatus::Running, TaskStatus::Succeeded | TaskStatus::Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Succeeded => write!(f, "succeeded"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Name of the form field that identifies the model on `/predict`.
///
/// Deployments disagree: some key predictions by the artifact path the
/// training call returned, others by the training task id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelKey {
    #[default]
    ModelPath,
    TaskId,
}

impl ModelKey {
    pub fn field_name(self) -> &'static str {
        match self {
            ModelKey::ModelPath => "modelpath",
            ModelKey::TaskId => "task_id",
        }
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKey::ModelPath => write!(f, "modelpath"),
            ModelKey::TaskId => write!(f, "task-id"),
        }
    }
}

impl FromStr for ModelKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "modelpath" | "model-path" | "model_path" => Ok(ModelKey::ModelPath),
            "task-id" | "task_id" | "taskid" => Ok(ModelKey::TaskId),
            _ => anyhow::bail!("Unknown model key: {}. Expected modelpath or task-id.", s),
        }
    }
}

/// Which status endpoint the deployment exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StatusRoute {
    /// `GET /monitor/{task_id}`
    #[default]
    Monitor,
    /// `GET /status/{task_id}`
    Status,
}

impl StatusRoute {
    pub fn segment(self) -> &'static str {
        match self {
            StatusRoute::Monitor => "monitor",
            StatusRoute::Status => "status",
        }
    }
}

impl fmt::Display for StatusRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

impl FromStr for StatusRoute {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "monitor" => Ok(StatusRoute::Monitor),
            "status" => Ok(StatusRoute::Status),
            _ => anyhow::bail!("Unknown status route: {}. Expected monitor or status.", s),
        }
    }
}

/// Opaque handle on a trained artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelReference {
    value: String,
    key: ModelKey,
}

impl ModelReference {
    pub fn new(value: impl Into<String>, key: ModelKey) -> Self {
        Self {
            value: value.into(),
            key,
        }
    }

    pub fn model_path(value: impl Into<String>) -> Self {
        Self::new(value, ModelKey::ModelPath)
    }

    pub fn task_id(value: impl Into<String>) -> Self {
        Self::new(value, ModelKey::TaskId)
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn key(&self) -> ModelKey {
        self.key
    }
}

impl fmt::Display for ModelReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// A training task as last observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingTask {
    pub task_id: String,
    pub status: TaskStatus,
    /// Present only once the task has succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_reference: Option<ModelReference>,
}

impl TrainingTask {
    pub fn pending(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Pending,
            model_reference: None,
        }
    }

    /// Accepts `next` as the new observation of this task, or reports why the
    /// service contradicted itself.
    pub fn advance(&self, next: TrainingTask) -> Result<TrainingTask, ClientError> {
        if next.task_id != self.task_id {
            return Err(ClientError::ProtocolViolation(format!(
                "asked about task {} but got task {}",
                self.task_id, next.task_id
            )));
        }

        if !self.status.can_become(next.status) {
            return Err(ClientError::ProtocolViolation(format!(
                "task {} cannot go from {} to {}",
                self.task_id, self.status, next.status
            )));
        }

        if self.status == TaskStatus::Succeeded && next.model_reference != self.model_reference {
            return Err(ClientError::ProtocolViolation(format!(
                "task {} changed its model reference after succeeding",
                self.task_id
            )));
        }

        Ok(next)
    }
}

/// What the training endpoint handed back, resolved once at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrainingSubmission {
    /// Training was queued; poll the task to learn the outcome.
    Deferred(TrainingTask),
    /// Training ran synchronously and the model is ready.
    Completed {
        model_reference: ModelReference,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_id: Option<String>,
    },
}

impl TrainingSubmission {
    pub fn model_reference(&self) -> Option<&ModelReference> {
        match self {
            TrainingSubmission::Deferred(task) => task.model_reference.as_ref(),
            TrainingSubmission::Completed {
                model_reference, ..
            } => Some(model_reference),
        }
    }

    pub fn task_id(&self) -> Option<&str> {
        match self {
            TrainingSubmission::Deferred(task) => Some(&task.task_id),
            TrainingSubmission::Completed { task_id, .. } => task_id.as_deref(),
        }
    }
}

/// Rows to score against a trained model. Borrowed, built per call.
#[derive(Debug, Clone, Copy)]
pub struct PredictionRequest<'a> {
    pub model_reference: &'a ModelReference,
    pub input_rows: &'a [Record],
}

impl<'a> PredictionRequest<'a> {
    /// Checks the preconditions of a prediction call.
    pub fn new(
        model_reference: &'a ModelReference,
        input_rows: &'a [Record],
    ) -> Result<Self, ClientError> {
        if model_reference.value().trim().is_empty() {
            return Err(ClientError::InvalidInput(
                "model reference is empty".to_string(),
            ));
        }
        rows::ensure_consistent(input_rows)
            .map_err(|e| ClientError::InvalidInput(e.to_string()))?;

        Ok(Self {
            model_reference,
            input_rows,
        })
    }

    /// Encodes the rows as the CSV file the service expects.
    pub fn to_csv(&self) -> Result<Vec<u8>, ClientError> {
        rows::write_csv(self.input_rows).map_err(|e| ClientError::InvalidInput(e.to_string()))
    }

    /// Enforces one output row per input row.
    pub fn accept(&self, rows: Vec<Record>) -> Result<PredictionResult, ClientError> {
        if rows.len() != self.input_rows.len() {
            return Err(ClientError::ProtocolViolation(format!(
                "sent {} rows but received {} predictions",
                self.input_rows.len(),
                rows.len()
            )));
        }
        Ok(PredictionResult { rows })
    }
}

/// Predictions in input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub rows: Vec<Record>,
}

/// Operations offered by a training/prediction service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrainingService: Send + Sync {
    /// Uploads a CSV training set.
    async fn submit_training(&self, csv_payload: &[u8]) -> Result<TrainingSubmission, ClientError>;

    /// Reads the current state of a task. Stateless and idempotent.
    async fn poll_status(&self, task_id: &str) -> Result<TrainingTask, ClientError>;

    /// Scores `input_rows` with the given model.
    async fn predict(
        &self,
        model_reference: &ModelReference,
        input_rows: &[Record],
    ) -> Result<PredictionResult, ClientError>;
}

/// Polls `previous.task_id` once and checks the result against `previous`.
pub async fn refresh<S: TrainingService + ?Sized>(
    service: &S,
    previous: &TrainingTask,
) -> Result<TrainingTask, ClientError> {
    let observed = service.poll_status(&previous.task_id).await?;
    previous.advance(observed)
}
