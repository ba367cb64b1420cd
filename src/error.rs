use crate::http::TransportError;

/// Errors returned by the task client.
///
/// Transport failures are wrapped rather than flattened so callers can tell
/// "service down" from "service rejected the request" from "service
/// answered with something we do not understand".
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A 2xx response whose body lacks a required field or has the wrong shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The service reported a task state outside the known lifecycle.
    #[error("unknown state {state:?} reported for task {task_id}")]
    UnknownState { task_id: String, state: String },

    /// The service broke an invariant: row count mismatch, terminal state regression.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The caller broke a precondition; nothing was sent.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Flat classification of [`ClientError`] for callers that only need to branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unreachable,
    ClientRejected,
    InvalidRequest,
    MalformedResponse,
    UnknownState,
    ProtocolViolation,
    InvalidInput,
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Transport(TransportError::Unreachable { .. }) => ErrorKind::Unreachable,
            ClientError::Transport(TransportError::ClientRejected { .. }) => {
                ErrorKind::ClientRejected
            }
            ClientError::Transport(TransportError::InvalidRequest(_)) => ErrorKind::InvalidRequest,
            ClientError::Transport(TransportError::UnexpectedStatus { .. }) => {
                ErrorKind::MalformedResponse
            }
            ClientError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            ClientError::UnknownState { .. } => ErrorKind::UnknownState,
            ClientError::ProtocolViolation(_) => ErrorKind::ProtocolViolation,
            ClientError::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }
}
