//! JSON shapes returned by the service and their conversion into the task model.

use serde::Deserialize;
use serde_json::Value;

use super::rows::Record;
use super::{ModelKey, ModelReference, TaskStatus, TrainingSubmission, TrainingTask};
use crate::error::ClientError;
use crate::http::RawResponse;

/// An identifier the service may send as a string or as a number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Opaque {
    Text(String),
    Number(serde_json::Number),
}

impl Opaque {
    /// Blank strings count as absent.
    fn into_string(self) -> Option<String> {
        match self {
            Opaque::Text(s) if s.trim().is_empty() => None,
            Opaque::Text(s) => Some(s),
            Opaque::Number(n) => Some(n.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TrainResponse {
    #[serde(default)]
    task_id: Option<Opaque>,
    #[serde(default, alias = "model_path", alias = "model_reference")]
    modelpath: Option<Opaque>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default, alias = "state")]
    status: Option<String>,
    #[serde(default, alias = "modelpath", alias = "model_path")]
    model_reference: Option<Opaque>,
    /// Task result as some queue backends report it: a path, or an object
    /// holding one. Only consulted once the task has succeeded.
    #[serde(default)]
    result: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PredictResponse {
    Rows(Vec<Record>),
    Wrapped { predictions: Vec<Record> },
}

fn decode<T: serde::de::DeserializeOwned>(
    response: &RawResponse,
    what: &str,
) -> Result<T, ClientError> {
    response.json().map_err(|e| {
        ClientError::MalformedResponse(format!("{} response is not the expected JSON: {}", what, e))
    })
}

pub(crate) fn parse_submission(response: &RawResponse) -> Result<TrainingSubmission, ClientError> {
    let body: TrainResponse = decode(response, "training")?;
    let task_id = body.task_id.and_then(Opaque::into_string);

    match body.modelpath.and_then(Opaque::into_string) {
        Some(path) => Ok(TrainingSubmission::Completed {
            model_reference: ModelReference::model_path(path),
            task_id,
        }),
        None => match task_id {
            Some(task_id) => Ok(TrainingSubmission::Deferred(TrainingTask::pending(task_id))),
            None => Err(ClientError::MalformedResponse(
                "training response has neither task_id nor modelpath".to_string(),
            )),
        },
    }
}

pub(crate) fn parse_status(
    task_id: &str,
    response: &RawResponse,
    model_key: ModelKey,
) -> Result<TrainingTask, ClientError> {
    let body: StatusResponse = decode(response, "status")?;

    let state = body.status.ok_or_else(|| {
        ClientError::MalformedResponse(format!("status response for task {} has no state", task_id))
    })?;
    let status = TaskStatus::from_remote(&state).ok_or_else(|| ClientError::UnknownState {
        task_id: task_id.to_string(),
        state: state.clone(),
    })?;

    let model_reference = if status == TaskStatus::Succeeded {
        let reference = match model_key {
            ModelKey::TaskId => Some(ModelReference::task_id(task_id)),
            ModelKey::ModelPath => body
                .model_reference
                .and_then(Opaque::into_string)
                .or_else(|| body.result.as_ref().and_then(path_from_result))
                .map(ModelReference::model_path),
        };
        Some(reference.ok_or_else(|| {
            ClientError::MalformedResponse(format!(
                "task {} succeeded but no model path was reported",
                task_id
            ))
        })?)
    } else {
        None
    };

    Ok(TrainingTask {
        task_id: task_id.to_string(),
        status,
        model_reference,
    })
}

fn path_from_result(result: &Value) -> Option<String> {
    let path = match result {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => ["modelpath", "model_path", "model_reference"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str)),
        _ => None,
    }?;

    let path = path.trim();
    (!path.is_empty()).then(|| path.to_string())
}

pub(crate) fn parse_predictions(response: &RawResponse) -> Result<Vec<Record>, ClientError> {
    let body: PredictResponse = decode(response, "prediction")?;
    Ok(match body {
        PredictResponse::Rows(rows) => rows,
        PredictResponse::Wrapped { predictions } => predictions,
    })
}
