//! Caller-side polling until a training task settles.
//!
//! The client itself never loops. This module owns the "wait until done"
//! policy so it can be tuned, cancelled and tested on its own.

use log::{debug, info};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{TaskStatus, TrainingService, TrainingTask, refresh};
use crate::error::ClientError;

/// Default pause between two status polls.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    /// Give up after this long. `None` waits forever.
    pub deadline: Option<Duration>,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            deadline: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("task {task_id} still {status} after {elapsed:?}")]
    TimedOut {
        task_id: String,
        status: TaskStatus,
        elapsed: Duration,
    },

    #[error("stopped waiting for task {task_id} while it was {status}")]
    Cancelled { task_id: String, status: TaskStatus },
}

/// Polls `task` until it reaches a terminal state.
///
/// Every observation is checked against the previous one, so a service that
/// un-finishes a task surfaces as a protocol violation. The deadline bounds
/// the pauses and the polls themselves: no poll starts after it has passed,
/// and one in flight when it passes is abandoned. `cancel` is checked at
/// every await point; signal it with [`Notify::notify_one`] so a cancellation
/// that races the start of the wait is not lost.
#[tracing::instrument(skip(service, task, policy, cancel), fields(task_id = %task.task_id))]
pub async fn wait_for_completion<S: TrainingService + ?Sized>(
    service: &S,
    task: TrainingTask,
    policy: &WaitPolicy,
    cancel: &Notify,
) -> Result<TrainingTask, WaitError> {
    let started = Instant::now();
    let deadline_at = policy.deadline.map(|deadline| started + deadline);
    let expired = || deadline_at.is_some_and(|at| Instant::now() >= at);
    let mut current = task;

    loop {
        if current.status.is_terminal() {
            info!("Task {} finished as {}", current.task_id, current.status);
            return Ok(current);
        }
        if expired() {
            return Err(timed_out(current, started));
        }

        let next_poll = Instant::now() + policy.interval;
        let wake = deadline_at.map_or(next_poll, |at| at.min(next_poll));
        tokio::select! {
            _ = cancel.notified() => return Err(cancelled(current)),
            _ = tokio::time::sleep_until(wake) => {}
        }
        if expired() {
            return Err(timed_out(current, started));
        }

        let step = tokio::select! {
            _ = cancel.notified() => Step::Cancelled,
            _ = sleep_until_deadline(deadline_at) => Step::TimedOut,
            next = refresh(service, &current) => Step::Observed(next?),
        };
        current = match step {
            Step::Observed(next) => next,
            Step::Cancelled => return Err(cancelled(current)),
            Step::TimedOut => return Err(timed_out(current, started)),
        };
        debug!("Task {} is {}", current.task_id, current.status);
    }
}

enum Step {
    Observed(TrainingTask),
    Cancelled,
    TimedOut,
}

/// Never completes when there is no deadline.
async fn sleep_until_deadline(deadline_at: Option<Instant>) {
    match deadline_at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn timed_out(task: TrainingTask, started: Instant) -> WaitError {
    WaitError::TimedOut {
        task_id: task.task_id,
        status: task.status,
        elapsed: started.elapsed(),
    }
}

fn cancelled(task: TrainingTask) -> WaitError {
    WaitError::Cancelled {
        task_id: task.task_id,
        status: task.status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::task::{MockTrainingService, ModelReference};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast() -> WaitPolicy {
        WaitPolicy {
            interval: Duration::from_millis(5),
            deadline: None,
        }
    }

    fn with_status(status: TaskStatus) -> TrainingTask {
        TrainingTask {
            task_id: "t-1".to_string(),
            status,
            model_reference: (status == TaskStatus::Succeeded)
                .then(|| ModelReference::model_path("/models/t-1")),
        }
    }

    /// A service that reports the given statuses in order, then repeats the last.
    fn scripted(statuses: Vec<TaskStatus>) -> (MockTrainingService, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut service = MockTrainingService::new();
        service.expect_poll_status().returning(move |_| {
            let index = counter.fetch_add(1, Ordering::SeqCst);
            let status = statuses[index.min(statuses.len() - 1)];
            Ok(with_status(status))
        });
        (service, calls)
    }

    #[tokio::test]
    async fn test_terminal_task_returns_without_polling() {
        let service = MockTrainingService::new();
        let task = with_status(TaskStatus::Failed);

        let result = wait_for_completion(&service, task.clone(), &fast(), &Notify::new())
            .await
            .unwrap();

        assert_eq!(result, task);
    }

    #[test_log::test(tokio::test)]
    async fn test_waits_until_succeeded() {
        let (service, calls) = scripted(vec![
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Running,
            TaskStatus::Succeeded,
        ]);

        let result = wait_for_completion(
            &service,
            TrainingTask::pending("t-1"),
            &fast(),
            &Notify::new(),
        )
        .await
        .unwrap();

        assert_eq!(result.status, TaskStatus::Succeeded);
        assert_eq!(result.model_reference.unwrap().value(), "/models/t-1");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_regression_is_protocol_violation() {
        let (service, _calls) = scripted(vec![TaskStatus::Running, TaskStatus::Pending]);

        let err = wait_for_completion(
            &service,
            TrainingTask::pending("t-1"),
            &fast(),
            &Notify::new(),
        )
        .await
        .unwrap_err();

        match err {
            WaitError::Client(e) => assert_eq!(e.kind(), ErrorKind::ProtocolViolation),
            other => panic!("expected client error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_client_errors_propagate() {
        let mut service = MockTrainingService::new();
        service.expect_poll_status().times(1).returning(|_| {
            Err(ClientError::UnknownState {
                task_id: "t-1".to_string(),
                state: "LOST".to_string(),
            })
        });

        let err = wait_for_completion(
            &service,
            TrainingTask::pending("t-1"),
            &fast(),
            &Notify::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            WaitError::Client(ClientError::UnknownState { .. })
        ));
    }

    #[tokio::test]
    async fn test_deadline() {
        let (service, _calls) = scripted(vec![TaskStatus::Running]);
        let policy = WaitPolicy {
            interval: Duration::from_millis(5),
            deadline: Some(Duration::from_millis(30)),
        };

        let err = wait_for_completion(
            &service,
            TrainingTask::pending("t-1"),
            &policy,
            &Notify::new(),
        )
        .await
        .unwrap_err();

        match err {
            WaitError::TimedOut {
                task_id, status, ..
            } => {
                assert_eq!(task_id, "t-1");
                assert_eq!(status, TaskStatus::Running);
            }
            other => panic!("expected TimedOut, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_deadline_shorter_than_interval() {
        let (service, calls) = scripted(vec![TaskStatus::Running]);
        let policy = WaitPolicy {
            interval: Duration::from_millis(500),
            deadline: Some(Duration::from_millis(20)),
        };

        let started = std::time::Instant::now();
        let err = wait_for_completion(
            &service,
            TrainingTask::pending("t-1"),
            &policy,
            &Notify::new(),
        )
        .await
        .unwrap_err();

        assert!(started.elapsed() < Duration::from_millis(400));
        assert!(matches!(err, WaitError::TimedOut { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    /// Answers every status poll only after a long stall.
    struct Stalled;

    #[async_trait::async_trait]
    impl TrainingService for Stalled {
        async fn submit_training(
            &self,
            _csv_payload: &[u8],
        ) -> Result<crate::task::TrainingSubmission, ClientError> {
            unreachable!("not used by the waiter")
        }

        async fn poll_status(&self, task_id: &str) -> Result<TrainingTask, ClientError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(TrainingTask::pending(task_id))
        }

        async fn predict(
            &self,
            _model_reference: &ModelReference,
            _input_rows: &[crate::task::Record],
        ) -> Result<crate::task::PredictionResult, ClientError> {
            unreachable!("not used by the waiter")
        }
    }

    #[tokio::test]
    async fn test_deadline_abandons_slow_poll() {
        let policy = WaitPolicy {
            interval: Duration::from_millis(1),
            deadline: Some(Duration::from_millis(50)),
        };

        let started = std::time::Instant::now();
        let err = wait_for_completion(
            &Stalled,
            TrainingTask::pending("t-1"),
            &policy,
            &Notify::new(),
        )
        .await
        .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(5));
        match err {
            WaitError::TimedOut { status, .. } => assert_eq!(status, TaskStatus::Pending),
            other => panic!("expected TimedOut, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let (service, calls) = scripted(vec![TaskStatus::Running]);
        let cancel = Notify::new();
        cancel.notify_one();

        let err = wait_for_completion(&service, TrainingTask::pending("t-1"), &fast(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            WaitError::Cancelled {
                status: TaskStatus::Pending,
                ..
            }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_while_waiting() {
        let (service, _calls) = scripted(vec![TaskStatus::Running]);
        let cancel = Arc::new(Notify::new());
        let trigger = Arc::clone(&cancel);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.notify_one();
        });

        let err = wait_for_completion(&service, TrainingTask::pending("t-1"), &fast(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, WaitError::Cancelled { .. }));
    }
}
