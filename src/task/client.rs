use async_trait::async_trait;
use log::{debug, info};
use std::time::Duration;

use super::rows::Record;
use super::{
    ModelKey, ModelReference, PredictionRequest, PredictionResult, StatusRoute, TrainingService,
    TrainingSubmission, TrainingTask, wire,
};
use crate::error::ClientError;
use crate::http::{Body, FilePart, HttpClient, Method};

/// [`TrainingService`] backed by the AutoML HTTP API.
#[derive(Clone)]
pub struct AutoMlClient {
    http: HttpClient,
    timeout: Duration,
    status_route: StatusRoute,
    model_key: ModelKey,
}

impl AutoMlClient {
    /// `timeout` bounds each HTTP attempt, not the whole retried call.
    pub fn new(http: HttpClient, timeout: Duration) -> Self {
        Self {
            http,
            timeout,
            status_route: StatusRoute::default(),
            model_key: ModelKey::default(),
        }
    }

    pub fn with_status_route(mut self, status_route: StatusRoute) -> Self {
        self.status_route = status_route;
        self
    }

    /// How models of succeeded tasks are identified on `/predict`.
    pub fn with_model_key(mut self, model_key: ModelKey) -> Self {
        self.model_key = model_key;
        self
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn model_key(&self) -> ModelKey {
        self.model_key
    }
}

#[async_trait]
impl TrainingService for AutoMlClient {
    #[tracing::instrument(skip(self, csv_payload), fields(bytes = csv_payload.len()))]
    async fn submit_training(&self, csv_payload: &[u8]) -> Result<TrainingSubmission, ClientError> {
        if csv_payload.is_empty() {
            return Err(ClientError::InvalidInput(
                "training data is empty".to_string(),
            ));
        }

        let body = Body::Multipart {
            file: FilePart::csv("file", "train.csv", csv_payload.to_vec()),
            fields: Vec::new(),
        };
        let response = self
            .http
            .send(Method::Post, &["train"], Some(&body), self.timeout)
            .await?;

        let submission = wire::parse_submission(&response)?;
        match &submission {
            TrainingSubmission::Deferred(task) => info!("Training queued as task {}", task.task_id),
            TrainingSubmission::Completed {
                model_reference, ..
            } => info!("Training finished, model at {}", model_reference),
        }
        Ok(submission)
    }

    #[tracing::instrument(skip(self))]
    async fn poll_status(&self, task_id: &str) -> Result<TrainingTask, ClientError> {
        if task_id.trim().is_empty() {
            return Err(ClientError::InvalidInput("task id is empty".to_string()));
        }

        let response = self
            .http
            .send(
                Method::Get,
                &[self.status_route.segment(), task_id],
                None,
                self.timeout,
            )
            .await?;

        let task = wire::parse_status(task_id, &response, self.model_key)?;
        debug!("Task {} is {}", task.task_id, task.status);
        Ok(task)
    }

    #[tracing::instrument(skip(self, input_rows), fields(rows = input_rows.len()))]
    async fn predict(
        &self,
        model_reference: &ModelReference,
        input_rows: &[Record],
    ) -> Result<PredictionResult, ClientError> {
        let request = PredictionRequest::new(model_reference, input_rows)?;

        let body = Body::Multipart {
            file: FilePart::csv("file", "predict.csv", request.to_csv()?),
            fields: vec![(
                model_reference.key().field_name().to_string(),
                model_reference.value().to_string(),
            )],
        };
        let response = self
            .http
            .send(Method::Post, &["predict"], Some(&body), self.timeout)
            .await?;

        let rows = wire::parse_predictions(&response)?;
        let result = request.accept(rows)?;
        info!("Received {} predictions", result.rows.len());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::http::RetryPolicy;
    use crate::task::{TaskStatus, refresh};
    use mockito::Matcher;
    use reqwest::Client;
    use serde_json::json;

    fn client_for(url: &str) -> AutoMlClient {
        let http = HttpClient::new(Client::new(), url, RetryPolicy::immediate(3)).unwrap();
        AutoMlClient::new(http, Duration::from_secs(5))
    }

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_submit_training_deferred() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/train")
            .match_header(
                "content-type",
                Matcher::Regex("multipart/form-data".to_string()),
            )
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="file"; filename="train.csv""#.to_string()),
                Matcher::Regex("x,y".to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"task_id": "3f2a", "message": "Training started"}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let submission = client.submit_training(b"x,y\n1,0\n").await.unwrap();

        mock.assert_async().await;
        match submission {
            TrainingSubmission::Deferred(task) => {
                assert_eq!(task.task_id, "3f2a");
                assert_eq!(task.status, TaskStatus::Pending);
            }
            other => panic!("expected Deferred, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_training_completed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/train")
            .with_status(200)
            .with_body(r#"{"modelpath": "/tmp/models/StackedEnsemble_1"}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let submission = client.submit_training(b"x,y\n1,0\n").await.unwrap();

        mock.assert_async().await;
        assert_eq!(
            submission.model_reference(),
            Some(&ModelReference::model_path("/tmp/models/StackedEnsemble_1"))
        );
    }

    #[tokio::test]
    async fn test_submit_training_without_task_id_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/train")
            .with_status(200)
            .with_body(r#"{"message": "ok"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client.submit_training(b"x\n1\n").await.unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn test_submit_training_empty_payload_sends_nothing() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/train")
            .expect(0)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client.submit_training(b"").await.unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_submit_training_rejected() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/train")
            .with_status(422)
            .with_body(r#"{"detail": "file must be CSV"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client.submit_training(b"not,csv").await.unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.kind(), ErrorKind::ClientRejected);
    }

    #[tokio::test]
    async fn test_poll_status_running() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/monitor/3f2a")
            .with_status(200)
            .with_body(r#"{"task_id": "3f2a", "status": "STARTED"}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let task = client.poll_status("3f2a").await.unwrap();

        mock.assert_async().await;
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.model_reference, None);
    }

    #[tokio::test]
    async fn test_poll_status_uses_configured_route() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/status/3f2a")
            .with_status(200)
            .with_body(r#"{"state": "pending"}"#)
            .create_async()
            .await;

        let client = client_for(&server.url()).with_status_route(StatusRoute::Status);
        let task = client.poll_status("3f2a").await.unwrap();

        mock.assert_async().await;
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_poll_status_is_idempotent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/monitor/3f2a")
            .with_status(200)
            .with_body(r#"{"status": "RUNNING"}"#)
            .expect(2)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let first = client.poll_status("3f2a").await.unwrap();
        let second = client.poll_status("3f2a").await.unwrap();

        mock.assert_async().await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_poll_status_unknown_task() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/monitor/nope")
            .with_status(200)
            .with_body(r#"{"status": "UNKNOWN TASK"}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client.poll_status("nope").await.unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.kind(), ErrorKind::UnknownState);
    }

    #[tokio::test]
    async fn test_poll_status_not_found() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/monitor/nope")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client.poll_status("nope").await.unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.kind(), ErrorKind::ClientRejected);
    }

    #[tokio::test]
    async fn test_poll_status_empty_id() {
        let client = client_for("http://127.0.0.1:1");
        let err = client.poll_status("").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_poll_status_unreachable() {
        let client = client_for("http://127.0.0.1:1");
        let err = client.poll_status("3f2a").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unreachable);
    }

    #[tokio::test]
    async fn test_refresh_detects_terminal_regression() {
        let mut server = mockito::Server::new_async().await;
        let _done = server
            .mock("GET", "/monitor/3f2a")
            .with_status(200)
            .with_body(r#"{"status": "SUCCESS", "modelpath": "/models/a"}"#)
            .expect(1)
            .create_async()
            .await;
        let _regressed = server
            .mock("GET", "/monitor/3f2a")
            .with_status(200)
            .with_body(r#"{"status": "RUNNING"}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let done = refresh(&client, &TrainingTask::pending("3f2a")).await.unwrap();
        assert_eq!(done.status, TaskStatus::Succeeded);

        let err = refresh(&client, &done).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
    }

    #[tokio::test]
    async fn test_predict_three_rows_in_order() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/predict")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="modelpath""#.to_string()),
                Matcher::Regex("/models/m1".to_string()),
                Matcher::Regex(r#"name="file"; filename="predict.csv""#.to_string()),
                Matcher::Regex("a,b\r?\n1,2\r?\n3,4\r?\n5,6".to_string()),
            ]))
            .with_status(200)
            .with_body(
                r#"[{"a": 1, "b": 2, "predict": 0},
                    {"a": 3, "b": 4, "predict": 1},
                    {"a": 5, "b": 6, "predict": 1}]"#,
            )
            .create_async()
            .await;

        let rows = vec![
            record(json!({"a": 1, "b": 2})),
            record(json!({"a": 3, "b": 4})),
            record(json!({"a": 5, "b": 6})),
        ];
        let client = client_for(&server.url());
        let result = client
            .predict(&ModelReference::model_path("/models/m1"), &rows)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.rows.len(), 3);
        assert_eq!(result.rows[0]["a"], json!(1));
        assert_eq!(result.rows[1]["a"], json!(3));
        assert_eq!(result.rows[2]["a"], json!(5));
    }

    #[tokio::test]
    async fn test_predict_keyed_by_task_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/predict")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="task_id""#.to_string()),
                Matcher::Regex("3f2a".to_string()),
            ]))
            .with_status(200)
            .with_body(r#"[{"predict": "yes"}]"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let result = client
            .predict(
                &ModelReference::task_id("3f2a"),
                &[record(json!({"age": 40}))],
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.rows.len(), 1);
    }

    #[tokio::test]
    async fn test_predict_row_count_mismatch() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/predict")
            .with_status(200)
            .with_body(r#"[{"predict": 0}]"#)
            .create_async()
            .await;

        let rows = vec![record(json!({"a": 1})), record(json!({"a": 2}))];
        let client = client_for(&server.url());
        let err = client
            .predict(&ModelReference::model_path("/models/m1"), &rows)
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
    }

    #[tokio::test]
    async fn test_predict_empty_result_is_not_success() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/predict")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client
            .predict(
                &ModelReference::model_path("/models/m1"),
                &[record(json!({"a": 1}))],
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
    }

    #[tokio::test]
    async fn test_predict_invalid_input_sends_nothing() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/predict")
            .expect(0)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let model = ModelReference::model_path("/models/m1");

        let err = client.predict(&model, &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let mixed = vec![record(json!({"a": 1})), record(json!({"b": 1}))];
        let err = client.predict(&model, &mixed).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = client
            .predict(&ModelReference::model_path(""), &[record(json!({"a": 1}))])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_predict_server_error_is_unreachable() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/predict")
            .with_status(502)
            .expect(3)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client
            .predict(
                &ModelReference::model_path("/models/m1"),
                &[record(json!({"a": 1}))],
            )
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert_eq!(err.kind(), ErrorKind::Unreachable);
    }
}
