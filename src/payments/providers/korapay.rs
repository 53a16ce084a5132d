//! Korapay gateway adapter.
//!
//! Korapay bills in major units, verifies by our reference and signs
//! webhooks with HMAC-SHA256 in the `x-korapay-signature` header.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::info;

use crate::error::{PaymentError, PaymentResult};
use crate::payments::adapter::ProviderAdapter;
use crate::payments::gateway::GatewayCredentials;
use crate::payments::http::PaymentHttpClient;
use crate::payments::signature::verify_hmac_sha256_hex;
use crate::payments::types::{
    minor_to_major, InitiateOutcome, InitiateRequest, Provider, VerifyOutcome, VerifyStatus,
};

pub struct KorapayAdapter {
    credentials: GatewayCredentials,
    http: PaymentHttpClient,
}

impl KorapayAdapter {
    pub fn new(credentials: GatewayCredentials) -> PaymentResult<Self> {
        let http = PaymentHttpClient::new(
            Duration::from_secs(credentials.timeout_secs),
            credentials.max_retries,
        )?;
        Ok(Self { credentials, http })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.credentials.base_url, path)
    }

    /// Korapay expects major units; convert from canonical minor.
    fn initiate_payload(request: &InitiateRequest) -> JsonValue {
        serde_json::json!({
            "reference": request.reference,
            "amount": minor_to_major(request.amount_minor),
            "currency": request.currency,
            "redirect_url": request.redirect_url,
            "customer": {
                "name": request.full_name,
                "email": request.email,
            },
            "metadata": request.metadata,
        })
    }

    /// Success iff the envelope reports `status: true` and the charge
    /// reports `data.status == "success"`.
    fn map_verify_payload(body: &JsonValue) -> VerifyOutcome {
        let envelope_ok = body.get("status").and_then(|v| v.as_bool()).unwrap_or(false);
        let data = body.get("data").cloned().unwrap_or(JsonValue::Null);
        let tx_status = data.get("status").and_then(|v| v.as_str()).unwrap_or("");

        let status = if envelope_ok && tx_status == "success" {
            VerifyStatus::Confirmed
        } else if matches!(tx_status, "failed" | "expired") {
            VerifyStatus::Declined
        } else {
            VerifyStatus::Pending
        };

        let provider_transaction_id = data
            .get("payment_reference")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .or_else(|| {
                data.get("reference")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
            });

        VerifyOutcome {
            status,
            provider_transaction_id,
            raw: body.clone(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for KorapayAdapter {
    fn provider(&self) -> Provider {
        Provider::Korapay
    }

    async fn initiate(&self, request: &InitiateRequest) -> PaymentResult<InitiateOutcome> {
        let payload = Self::initiate_payload(request);
        let body: JsonValue = self
            .http
            .request_json(
                Provider::Korapay,
                reqwest::Method::POST,
                &self.endpoint("/merchant/api/v1/charges/initialize"),
                &self.credentials.secret_key,
                Some(&payload),
            )
            .await?;

        let envelope_ok = body.get("status").and_then(|v| v.as_bool()).unwrap_or(false);
        if !envelope_ok {
            let message = body
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("initialization rejected")
                .to_string();
            return Err(PaymentError::ProviderRequest {
                provider: Provider::Korapay.to_string(),
                message,
                retryable: false,
            });
        }

        let data = body.get("data").cloned().unwrap_or(JsonValue::Null);
        let payment_url = data
            .get("checkout_url")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| PaymentError::ProviderRequest {
                provider: Provider::Korapay.to_string(),
                message: "missing checkout_url in response".to_string(),
                retryable: false,
            })?;

        info!(reference = %request.reference, "korapay payment initiated");

        Ok(InitiateOutcome {
            payment_url,
            provider_reference: data
                .get("reference")
                .and_then(|v| v.as_str())
                .unwrap_or(&request.reference)
                .to_string(),
        })
    }

    async fn verify(&self, reference: &str) -> PaymentResult<VerifyOutcome> {
        let body: JsonValue = self
            .http
            .request_json(
                Provider::Korapay,
                reqwest::Method::GET,
                &self.endpoint(&format!("/merchant/api/v1/charges/{}", reference)),
                &self.credentials.secret_key,
                None,
            )
            .await?;

        Ok(Self::map_verify_payload(&body))
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool {
        verify_hmac_sha256_hex(self.credentials.secret_key.as_bytes(), payload, signature)
    }

    fn webhook_reference(&self, payload: &JsonValue) -> Option<String> {
        payload
            .get("data")
            .and_then(|d| d.get("reference"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }
}
