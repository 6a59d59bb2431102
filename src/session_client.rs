//! Default [`SessionApiClient`]: an authenticated HTTP client with its own
//! retry/backoff loop, reusing [`crate::retry::RetryConfig`].

use crate::error::ShipperError;
use crate::retry::RetryConfig;
use crate::target::SessionApiClient;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;
use uuid::Uuid;

/// Talks to the enterprise collector at `base_url`, authenticating every
/// request with `auth_token` and retrying failed attempts per `retry`.
pub struct HttpSessionApiClient {
    http: Client,
    base_url: String,
    auth_token: String,
    retry: RetryConfig,
}

impl HttpSessionApiClient {
    pub fn new(http: Client, base_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            auth_token: auth_token.into(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl SessionApiClient for HttpSessionApiClient {
    async fn post(
        &self,
        path: &str,
        body: Bytes,
        retry: bool,
        max_attempts: u32,
        description: &str,
    ) -> Result<(), ShipperError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let max_attempts = if retry { max_attempts.max(1) } else { 1 };
        let request_id = Uuid::new_v4();

        let mut attempt = 0u32;
        let mut delay = self.retry.initial_backoff;
        loop {
            let result = self
                .http
                .post(&url)
                .bearer_auth(&self.auth_token)
                .header("content-type", "application/json")
                .header("x-request-id", request_id.to_string())
                .body(body.clone())
                .send()
                .await
                .and_then(|resp| resp.error_for_status());

            match result {
                Ok(_) => return Ok(()),
                Err(err) => {
                    attempt += 1;
                    let err = ShipperError::from(err);
                    if attempt >= max_attempts || !err.is_retryable() {
                        tracing::debug!(
                            description,
                            %request_id,
                            attempt,
                            max_attempts,
                            error = %err,
                            "enterprise post exhausted retries"
                        );
                        return Err(err);
                    }
                    delay = self.retry.next_backoff(attempt - 1, delay);
                    tracing::debug!(
                        description,
                        %request_id,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "enterprise post failed, retrying"
                    );
                    tokio::time::sleep(delay.max(Duration::from_millis(1))).await;
                }
            }
        }
    }
}
