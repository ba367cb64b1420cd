//! HTTP client with built-in retry logic and error handling.

use log::{debug, warn};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;

use super::error::TransportError;
use super::retry::{Disposition, RetryPolicy, classify_status, is_transient};

/// Longest server message kept in a [`TransportError::ClientRejected`].
const MAX_ERROR_BODY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        }
    }
}

/// A file uploaded as one part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl FilePart {
    pub fn csv(field: &str, file_name: &str, bytes: Vec<u8>) -> Self {
        Self {
            field: field.to_string(),
            file_name: file_name.to_string(),
            content_type: "text/csv".to_string(),
            bytes,
        }
    }
}

/// Request payload. Kept as plain data so every attempt can rebuild it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// `multipart/form-data` with one file and any number of text fields.
    Multipart {
        file: FilePart,
        fields: Vec<(String, String)>,
    },
    /// `application/x-www-form-urlencoded` key-value pairs.
    Form(Vec<(String, String)>),
}

impl Body {
    fn apply(&self, request: RequestBuilder) -> Result<RequestBuilder, TransportError> {
        match self {
            Body::Multipart { file, fields } => {
                let part = Part::bytes(file.bytes.clone())
                    .file_name(file.file_name.clone())
                    .mime_str(&file.content_type)
                    .map_err(|e| {
                        TransportError::InvalidRequest(format!(
                            "bad content type {:?}: {}",
                            file.content_type, e
                        ))
                    })?;

                let form = fields
                    .iter()
                    .fold(Form::new(), |form, (key, value)| {
                        form.text(key.clone(), value.clone())
                    })
                    .part(file.field.clone(), part);

                Ok(request.multipart(form))
            }
            Body::Form(fields) => Ok(request.form(fields)),
        }
    }
}

/// A 2xx response, body fully read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Outcome of a single failed attempt.
#[derive(Debug)]
enum AttemptError {
    /// Connection failure, timeout or 5xx: worth another attempt.
    Transient {
        status: Option<StatusCode>,
        message: String,
    },
    /// The exchange broke after a 2xx arrived. Never retried.
    Abandoned {
        status: Option<StatusCode>,
        message: String,
    },
    /// Stop immediately with this error.
    Fatal(TransportError),
}

/// HTTP client with built-in retry logic for network operations.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    base_url: Url,
    policy: RetryPolicy,
}

impl HttpClient {
    /// Creates a transport rooted at `base_url`.
    pub fn new(client: Client, base_url: &str, policy: RetryPolicy) -> Result<Self, TransportError> {
        let parsed = Url::parse(base_url).map_err(|e| {
            TransportError::InvalidRequest(format!("invalid base URL {:?}: {}", base_url, e))
        })?;

        if parsed.cannot_be_a_base() || !matches!(parsed.scheme(), "http" | "https") {
            return Err(TransportError::InvalidRequest(format!(
                "base URL must be an http(s) URL, got {:?}",
                base_url
            )));
        }

        Ok(Self {
            client,
            base_url: parsed,
            policy,
        })
    }

    /// Returns a reference to the underlying reqwest Client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Appends path segments to the base URL. Segments are percent-encoded,
    /// so an opaque id containing `/` stays a single segment.
    pub fn url(&self, path: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                TransportError::InvalidRequest(format!("cannot extend base URL {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(path);
        Ok(url)
    }

    /// Performs one logical request.
    ///
    /// Connection errors, timeouts and 5xx responses are retried with
    /// exponential backoff up to the policy bound. 4xx responses fail at once.
    /// `timeout` applies to each attempt; zero disables it.
    ///
    /// Dropping the returned future abandons the in-flight attempt and any
    /// pending backoff.
    #[tracing::instrument(skip(self, body))]
    pub async fn send(
        &self,
        method: Method,
        path: &[&str],
        body: Option<&Body>,
        timeout: Duration,
    ) -> Result<RawResponse, TransportError> {
        let url = self.url(path)?;
        debug!("{} {}...", method, url);

        let operation_name = format!("{} {}", method, url.path());
        self.with_retry(&operation_name, || self.send_once(method, &url, body, timeout))
            .await
    }

    /// Single attempt without retry.
    async fn send_once(
        &self,
        method: Method,
        url: &Url,
        body: Option<&Body>,
        timeout: Duration,
    ) -> Result<RawResponse, AttemptError> {
        let mut request = self.client.request(method.into(), url.clone());
        if !timeout.is_zero() {
            request = request.timeout(timeout);
        }
        if let Some(body) = body {
            request = body.apply(request).map_err(AttemptError::Fatal)?;
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if is_transient(&e) => {
                return Err(AttemptError::Transient {
                    status: None,
                    message: e.to_string(),
                });
            }
            Err(e) => {
                return Err(AttemptError::Fatal(TransportError::InvalidRequest(
                    e.to_string(),
                )));
            }
        };

        let status = response.status();
        match classify_status(status) {
            Disposition::Accept => {
                let body = response.bytes().await.map_err(|e| AttemptError::Abandoned {
                    status: Some(status),
                    message: format!("failed to read response body: {}", e),
                })?;
                debug!("HTTP {} with {} bytes", status, body.len());
                Ok(RawResponse {
                    status,
                    body: body.to_vec(),
                })
            }
            Disposition::Retry => Err(AttemptError::Transient {
                status: Some(status),
                message: format!("HTTP {}", status),
            }),
            Disposition::Reject => {
                let mut body = response.text().await.unwrap_or_default();
                truncate_on_char_boundary(&mut body, MAX_ERROR_BODY);
                Err(AttemptError::Fatal(TransportError::ClientRejected {
                    status,
                    body,
                }))
            }
            Disposition::Unexpected => Err(AttemptError::Fatal(
                TransportError::UnexpectedStatus { status },
            )),
        }
    }

    /// Executes an async operation with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T, TransportError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, AttemptError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_status = None;
        let mut last_message = String::new();

        for attempt in 1..=max_attempts {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(AttemptError::Fatal(e)) => {
                    debug!("{}: non-retryable error: {}", operation_name, e);
                    return Err(e);
                }
                Err(AttemptError::Abandoned { status, message }) => {
                    return Err(TransportError::Unreachable {
                        attempts: attempt,
                        status,
                        last: message,
                    });
                }
                Err(AttemptError::Transient { status, message }) => {
                    if attempt < max_attempts {
                        let delay = self.policy.delay_for(attempt);
                        warn!(
                            "{}: attempt {}/{} failed ({}), retrying in {}ms...",
                            operation_name,
                            attempt,
                            max_attempts,
                            message,
                            delay.as_millis()
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_status = status;
                    last_message = message;
                }
            }
        }

        Err(TransportError::Unreachable {
            attempts: max_attempts,
            status: last_status,
            last: last_message,
        })
    }
}

fn truncate_on_char_boundary(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}
