use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{ExtractRequest, ExtractResponse};
use crate::config::{NluConfig, RequestConfig};
use crate::error::{NluError, NluResult};

/// Client for the external text-understanding service
#[derive(Clone)]
pub struct NluClient {
    client: Client,
    base_url: String,
    model: String,
    request_config: RequestConfig,
}

impl NluClient {
    /// Create a new client from configuration
    pub fn new(config: &NluConfig, request_config: RequestConfig) -> NluResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(NluError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            request_config,
        })
    }

    /// The model name sent with every request.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Ask the service to extract a slot value from an utterance.
    ///
    /// Transient failures (timeout, connection) are retried up to the
    /// configured bound; API-level errors are not, since the service gave a
    /// definitive answer.
    pub async fn extract(&self, request: ExtractRequest) -> NluResult<ExtractResponse> {
        let url = format!("{}/v1/extract", self.base_url);
        let slot = request.slot.clone();

        let mut last_error = None;
        let mut attempts = 0;

        while attempts <= self.request_config.max_retries {
            if attempts > 0 {
                let delay = Duration::from_millis(self.request_config.retry_delay_ms);
                warn!(
                    slot = %slot,
                    retry = attempts,
                    delay_ms = delay.as_millis(),
                    "Retrying text-understanding request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, &request).await {
                Ok(response) => {
                    let latency = start.elapsed();
                    info!(
                        slot = %slot,
                        latency_ms = latency.as_millis(),
                        unparseable = response.unparseable,
                        "Text-understanding call succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    let latency = start.elapsed();
                    error!(
                        slot = %slot,
                        error = %e,
                        latency_ms = latency.as_millis(),
                        attempt = attempts,
                        "Text-understanding call failed"
                    );
                    let transient = is_transient(&e);
                    last_error = Some(e);
                    if !transient {
                        break;
                    }
                    attempts += 1;
                }
            }
        }

        Err(NluError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries: attempts.min(self.request_config.max_retries),
        })
    }

    /// Execute a single request (internal)
    async fn execute_request(
        &self,
        url: &str,
        request: &ExtractRequest,
    ) -> NluResult<ExtractResponse> {
        debug!(
            slot = %request.slot,
            model = %request.model,
            "Calling text-understanding service"
        );

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NluError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    NluError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(NluError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let extract_response: ExtractResponse =
            response
                .json()
                .await
                .map_err(|e| NluError::InvalidResponse {
                    message: format!("Failed to parse response: {}", e),
                })?;

        Ok(extract_response)
    }
}

/// Whether an error is worth one more attempt.
fn is_transient(error: &NluError) -> bool {
    match error {
        NluError::Timeout { .. } => true,
        NluError::Http(e) => e.is_connect() || e.is_timeout(),
        NluError::Api { .. } | NluError::InvalidResponse { .. } | NluError::Unavailable { .. } => {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let config = NluConfig {
            base_url: "http://localhost:11434".to_string(),
            model: "phi4".to_string(),
        };

        let request_config = RequestConfig::default();

        let client = NluClient::new(&config, request_config);
        assert!(client.is_ok());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = NluConfig {
            base_url: "http://localhost:11434/".to_string(),
            model: "phi4".to_string(),
        };

        let client = NluClient::new(&config, RequestConfig::default()).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_timeout_is_transient() {
        assert!(is_transient(&NluError::Timeout { timeout_ms: 5000 }));
    }

    #[test]
    fn test_api_error_is_not_transient() {
        assert!(!is_transient(&NluError::Api {
            status: 500,
            message: "boom".to_string(),
        }));
    }
}
