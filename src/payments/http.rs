//! Shared HTTP client for provider API calls.
//!
//! Applies a bounded timeout, bearer auth and capped retry with
//! exponential backoff for transient failures (network errors, 5xx, 429).
//! Rejections from the provider surface as non-retryable errors.

use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::warn;

use crate::error::{PaymentError, PaymentResult};
use crate::payments::types::Provider;

pub struct PaymentHttpClient {
    client: Client,
    max_retries: u32,
}

impl PaymentHttpClient {
    pub fn new(timeout: Duration, max_retries: u32) -> PaymentResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentError::ProviderRequest {
                provider: "http".to_string(),
                message: format!("failed to build HTTP client: {}", e),
                retryable: false,
            })?;
        Ok(Self { client, max_retries })
    }

    /// Send an authenticated JSON request, retrying transient failures
    pub async fn request_json<T>(
        &self,
        provider: Provider,
        method: reqwest::Method,
        url: &str,
        secret_key: &str,
        body: Option<&serde_json::Value>,
    ) -> PaymentResult<T>
    where
        T: DeserializeOwned,
    {
        let mut last_transport_error: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = Duration::from_secs(2_u64.pow(attempt - 1));
                warn!(
                    provider = %provider,
                    attempt,
                    "retrying provider request after {:?}",
                    backoff
                );
                tokio::time::sleep(backoff).await;
            }

            let mut request = self
                .client
                .request(method.clone(), url)
                .header("Authorization", format!("Bearer {}", secret_key))
                .header("Content-Type", "application/json");
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();

                    if status.is_success() {
                        return serde_json::from_str::<T>(&text).map_err(|e| {
                            PaymentError::ProviderRequest {
                                provider: provider.to_string(),
                                message: format!("invalid response format: {}", e),
                                retryable: false,
                            }
                        });
                    }

                    let transient = status.is_server_error() || status.as_u16() == 429;
                    if transient && attempt < self.max_retries {
                        last_transport_error = Some(format!("HTTP {}", status));
                        continue;
                    }
                    return Err(PaymentError::ProviderRequest {
                        provider: provider.to_string(),
                        message: format!("HTTP {}: {}", status, text),
                        retryable: transient,
                    });
                }
                Err(e) => {
                    last_transport_error = Some(e.to_string());
                    if attempt < self.max_retries {
                        continue;
                    }
                }
            }
        }

        Err(PaymentError::ProviderRequest {
            provider: provider.to_string(),
            message: format!(
                "request failed after {} retries: {}",
                self.max_retries,
                last_transport_error.unwrap_or_else(|| "unknown error".to_string())
            ),
            retryable: true,
        })
    }
}
