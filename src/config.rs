use anyhow::{Context, Result};
use log::debug;
use reqwest::Client;
use std::time::Duration;

use crate::http::{HttpClient, RetryPolicy};
use crate::task::{AutoMlClient, ModelKey, StatusRoute};

/// Per-attempt timeout used when none is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const USER_AGENT: &str = concat!("automl-client/", env!("CARGO_PKG_VERSION"));

/// Everything needed to talk to one AutoML deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub base_url: String,
    /// Applies to each HTTP attempt.
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub status_route: StatusRoute,
    pub model_key: ModelKey,
}

impl Config {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            status_route: StatusRoute::default(),
            model_key: ModelKey::default(),
        }
    }

    /// Builds a client for this deployment.
    pub fn client(&self) -> Result<AutoMlClient> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        let http = HttpClient::new(client, &self.base_url, self.retry)
            .context("Invalid AutoML service URL")?;
        debug!(
            "Using AutoML service at {} ({} attempt(s), {:?} timeout)",
            http.base_url(),
            self.retry.max_attempts,
            self.timeout
        );

        Ok(AutoMlClient::new(http, self.timeout)
            .with_status_route(self.status_route)
            .with_model_key(self.model_key))
    }
}
