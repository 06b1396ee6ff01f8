//! Shared JSON POST with retry/backoff for the HTTP provider adapters.
//!
//! Retry strategy:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Request timeouts → fail immediately as [`ProviderError::Timeout`]
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use tracing::debug;

use crate::error::ProviderError;

/// How a provider call is labelled in errors and which error variant wraps it.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Service {
    Embedding,
    Generation,
}

impl Service {
    fn error(self, message: String) -> ProviderError {
        match self {
            Service::Embedding => ProviderError::Embedding(message),
            Service::Generation => ProviderError::Generation(message),
        }
    }

    fn operation(self) -> &'static str {
        match self {
            Service::Embedding => "embedding request",
            Service::Generation => "generation request",
        }
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(5))
}

/// Longest a single [`post_json`] call can take: every attempt running into
/// the request timeout plus every backoff sleep between attempts.
pub(crate) fn retry_budget(timeout_secs: u64, max_retries: u32) -> Duration {
    let sleeps = (1..=max_retries).fold(Duration::ZERO, |acc, attempt| {
        acc.saturating_add(backoff(attempt))
    });
    Duration::from_secs(timeout_secs)
        .saturating_mul(max_retries.saturating_add(1))
        .saturating_add(sleeps)
}

/// Build a client with the given per-request timeout.
pub(crate) fn client(timeout_secs: u64, service: Service) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| service.error(format!("failed to build HTTP client: {}", e)))
}

/// POST `body` to `url` and return the parsed JSON response.
pub(crate) async fn post_json(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    timeout_secs: u64,
    service: Service,
) -> Result<serde_json::Value, ProviderError> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff(attempt);
            debug!(url, attempt, ?delay, "retrying provider request");
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(token) = bearer {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json()
                        .await
                        .map_err(|e| service.error(format!("invalid JSON response: {}", e)));
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = service.error(format!("{} returned {}: {}", url, status, body_text));

                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(e) if e.is_timeout() => {
                return Err(ProviderError::Timeout {
                    operation: service.operation(),
                    secs: timeout_secs,
                });
            }
            Err(e) => {
                last_err = Some(service.error(format!("connection to {} failed: {}", url, e)));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| service.error("request failed after retries".to_string())))
}
