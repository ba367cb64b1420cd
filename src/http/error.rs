use reqwest::StatusCode;

/// Failures surfaced by [`HttpClient::send`](super::HttpClient::send).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Every attempt failed with a connection error, a timeout or a 5xx.
    #[error("service unreachable after {attempts} attempt(s): {last}")]
    Unreachable {
        attempts: usize,
        /// Status of the last attempt, if the server answered at all.
        status: Option<StatusCode>,
        last: String,
    },

    /// The server answered with a non-retryable status (4xx).
    #[error("request rejected with HTTP {status}: {body}")]
    ClientRejected { status: StatusCode, body: String },

    /// The server answered with a status that is neither success nor error
    /// (an unfollowed redirect, an informational status). Not retried.
    #[error("unexpected HTTP {status} from service")]
    UnexpectedStatus { status: StatusCode },

    /// The request could not be built (bad base URL, bad multipart part).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TransportError::Unreachable { status, .. } => *status,
            TransportError::ClientRejected { status, .. }
            | TransportError::UnexpectedStatus { status } => Some(*status),
            TransportError::InvalidRequest(_) => None,
        }
    }
}
