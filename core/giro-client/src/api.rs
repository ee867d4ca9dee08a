//! HTTP client for the license server.
//!
//! The [`ValidationApi`] trait is the seam between the controller and
//! the network: production uses [`HttpValidationApi`], tests inject a
//! fake. Transient failures are retried with exponential backoff;
//! domain errors (4xx) are never retried, they will not succeed on a
//! retry.

use async_trait::async_trait;
use giro_license::protocol::{
    ActivateRequest, ActivateResponse, ApiErrorBody, ErrorCode, ValidateRequest, ValidateResponse,
};
use std::time::Duration;

/// Maximum attempts for transient failures.
const MAX_RETRIES: u32 = 3;
/// Base delay for exponential backoff.
const BASE_DELAY_MS: u64 = 500;

/// How a request failed.
#[derive(Debug, Clone)]
pub enum ApiFailure {
    /// Could not reach the server at all.
    Network(String),
    /// Server answered 5xx; retryable.
    Server(String),
    /// Token bucket drained; retryable later.
    RateLimited,
    /// Domain rejection. Never retried.
    Denied {
        code: ErrorCode,
        message: String,
        conflicting_fingerprints: Option<Vec<String>>,
    },
}

impl ApiFailure {
    /// True for failures the grace window should absorb.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Server(_) | Self::RateLimited)
    }
}

impl std::fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "network unavailable: {msg}"),
            Self::Server(msg) => write!(f, "server error: {msg}"),
            Self::RateLimited => write!(f, "rate limited"),
            Self::Denied { message, .. } => write!(f, "denied: {message}"),
        }
    }
}

/// Network seam for the validation controller.
#[async_trait]
pub trait ValidationApi: Send + Sync {
    async fn validate(
        &self,
        key: &str,
        request: &ValidateRequest,
    ) -> Result<ValidateResponse, ApiFailure>;

    async fn activate(
        &self,
        key: &str,
        request: &ActivateRequest,
    ) -> Result<ActivateResponse, ApiFailure>;
}

/// Production API client.
pub struct HttpValidationApi {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpValidationApi {
    /// Builds a client for the given server.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ApiFailure> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiFailure::Network(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    async fn post_with_retry<T, B>(&self, url: &str, body: &B) -> Result<T, ApiFailure>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize + Sync,
    {
        let mut last_failure = ApiFailure::Network("no attempt made".to_string());

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_DELAY_MS * (1 << attempt);
                tracing::debug!(url, attempt, delay_ms = delay, "retrying license call");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let result = self
                .client
                .post(url)
                .header("X-Api-Key", &self.api_key)
                .json(body)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<T>()
                            .await
                            .map_err(|e| ApiFailure::Server(format!("bad response body: {e}")));
                    }

                    let failure = decode_failure(status, response).await;
                    if !failure.is_transient() {
                        return Err(failure);
                    }
                    last_failure = failure;
                }
                Err(e) => {
                    last_failure = ApiFailure::Network(e.to_string());
                }
            }
        }

        Err(last_failure)
    }
}

async fn decode_failure(status: reqwest::StatusCode, response: reqwest::Response) -> ApiFailure {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return ApiFailure::RateLimited;
    }
    let body = response.text().await.unwrap_or_default();
    if status.is_server_error() {
        return ApiFailure::Server(format!("{status}: {body}"));
    }
    match serde_json::from_str::<ApiErrorBody>(&body) {
        Ok(parsed) => ApiFailure::Denied {
            code: parsed.code,
            message: parsed.message,
            conflicting_fingerprints: parsed.conflicting_fingerprints,
        },
        Err(_) => ApiFailure::Denied {
            code: ErrorCode::Internal,
            message: format!("{status}: {body}"),
            conflicting_fingerprints: None,
        },
    }
}

#[async_trait]
impl ValidationApi for HttpValidationApi {
    async fn validate(
        &self,
        key: &str,
        request: &ValidateRequest,
    ) -> Result<ValidateResponse, ApiFailure> {
        let url = format!("{}/api/v1/licenses/{}/validate", self.base_url, key);
        self.post_with_retry(&url, request).await
    }

    async fn activate(
        &self,
        key: &str,
        request: &ActivateRequest,
    ) -> Result<ActivateResponse, ApiFailure> {
        let url = format!("{}/api/v1/licenses/{}/activate", self.base_url, key);
        self.post_with_retry(&url, request).await
    }
}
