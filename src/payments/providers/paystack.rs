//! Paystack gateway adapter.
//!
//! Paystack bills in minor units (kobo), verifies by our reference and
//! signs webhooks with HMAC-SHA512 in the `x-paystack-signature` header.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::info;

use crate::error::{PaymentError, PaymentResult};
use crate::payments::adapter::ProviderAdapter;
use crate::payments::gateway::GatewayCredentials;
use crate::payments::http::PaymentHttpClient;
use crate::payments::signature::verify_hmac_sha512_hex;
use crate::payments::types::{
    InitiateOutcome, InitiateRequest, Provider, VerifyOutcome, VerifyStatus,
};

pub struct PaystackAdapter {
    credentials: GatewayCredentials,
    http: PaymentHttpClient,
}

impl PaystackAdapter {
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

    /// Build the initialize payload. Paystack expects kobo, which is our
    /// canonical unit, so the amount passes through unconverted.
    fn initiate_payload(request: &InitiateRequest) -> JsonValue {
        serde_json::json!({
            "email": request.email,
            "amount": request.amount_minor,
            "currency": request.currency,
            "reference": request.reference,
            "callback_url": request.redirect_url,
            "metadata": request.metadata,
        })
    }

    /// Success iff the envelope reports `status: true` and the transaction
    /// itself reports `data.status == "success"`.
    fn map_verify_payload(body: &JsonValue) -> VerifyOutcome {
        let envelope_ok = body.get("status").and_then(|v| v.as_bool()).unwrap_or(false);
        let data = body.get("data").cloned().unwrap_or(JsonValue::Null);
        let tx_status = data.get("status").and_then(|v| v.as_str()).unwrap_or("");

        let status = if envelope_ok && tx_status == "success" {
            VerifyStatus::Confirmed
        } else if matches!(tx_status, "failed" | "abandoned" | "reversed") {
            VerifyStatus::Declined
        } else {
            VerifyStatus::Pending
        };

        VerifyOutcome {
            status,
            provider_transaction_id: data
                .get("id")
                .and_then(|v| v.as_i64())
                .map(|id| id.to_string()),
            raw: body.clone(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for PaystackAdapter {
    fn provider(&self) -> Provider {
        Provider::Paystack
    }

    async fn initiate(&self, request: &InitiateRequest) -> PaymentResult<InitiateOutcome> {
        let payload = Self::initiate_payload(request);
        let body: JsonValue = self
            .http
            .request_json(
                Provider::Paystack,
                reqwest::Method::POST,
                &self.endpoint("/transaction/initialize"),
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
                provider: Provider::Paystack.to_string(),
                message,
                retryable: false,
            });
        }

        let data = body.get("data").cloned().unwrap_or(JsonValue::Null);
        let payment_url = data
            .get("authorization_url")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| PaymentError::ProviderRequest {
                provider: Provider::Paystack.to_string(),
                message: "missing authorization_url in response".to_string(),
                retryable: false,
            })?;

        info!(reference = %request.reference, "paystack payment initiated");

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
                Provider::Paystack,
                reqwest::Method::GET,
                &self.endpoint(&format!("/transaction/verify/{}", reference)),
                &self.credentials.secret_key,
                None,
            )
            .await?;

        Ok(Self::map_verify_payload(&body))
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool {
        verify_hmac_sha512_hex(self.credentials.secret_key.as_bytes(), payload, signature)
    }

    fn webhook_reference(&self, payload: &JsonValue) -> Option<String> {
        payload
            .get("data")
            .and_then(|d| d.get("reference"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }
}
