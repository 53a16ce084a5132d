//! Flutterwave gateway adapter.
//!
//! Flutterwave bills in major units, verifies by `tx_ref` and tags
//! webhooks with a pre-shared hash in the `verif-hash` header rather
//! than a computed signature.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::info;

use crate::error::{PaymentError, PaymentResult};
use crate::payments::adapter::ProviderAdapter;
use crate::payments::gateway::GatewayCredentials;
use crate::payments::http::PaymentHttpClient;
use crate::payments::signature::secure_eq;
use crate::payments::types::{
    minor_to_major, InitiateOutcome, InitiateRequest, Provider, VerifyOutcome, VerifyStatus,
};

pub struct FlutterwaveAdapter {
    credentials: GatewayCredentials,
    http: PaymentHttpClient,
}

impl FlutterwaveAdapter {
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

    /// Flutterwave expects major units; convert from canonical minor.
    fn initiate_payload(request: &InitiateRequest) -> JsonValue {
        serde_json::json!({
            "tx_ref": request.reference,
            "amount": minor_to_major(request.amount_minor),
            "currency": request.currency,
            "redirect_url": request.redirect_url,
            "customer": {
                "email": request.email,
                "name": request.full_name,
                "phonenumber": request.phone,
            },
            "meta": request.metadata,
            "customizations": {
                "title": "CampusPay"
            }
        })
    }

    /// Success iff the envelope reports `"success"` and the transaction
    /// reports `data.status == "successful"`.
    fn map_verify_payload(body: &JsonValue) -> VerifyOutcome {
        let envelope_ok = body
            .get("status")
            .and_then(|v| v.as_str())
            .map(|s| s.eq_ignore_ascii_case("success"))
            .unwrap_or(false);
        let data = body.get("data").cloned().unwrap_or(JsonValue::Null);
        let tx_status = data
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_lowercase();

        let status = if envelope_ok && tx_status == "successful" {
            VerifyStatus::Confirmed
        } else if matches!(tx_status.as_str(), "failed" | "cancelled") {
            VerifyStatus::Declined
        } else {
            VerifyStatus::Pending
        };

        let provider_transaction_id = data
            .get("id")
            .and_then(|v| v.as_i64())
            .map(|id| id.to_string())
            .or_else(|| {
                data.get("flw_ref")
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
impl ProviderAdapter for FlutterwaveAdapter {
    fn provider(&self) -> Provider {
        Provider::Flutterwave
    }

    async fn initiate(&self, request: &InitiateRequest) -> PaymentResult<InitiateOutcome> {
        let payload = Self::initiate_payload(request);
        let body: JsonValue = self
            .http
            .request_json(
                Provider::Flutterwave,
                reqwest::Method::POST,
                &self.endpoint("/payments"),
                &self.credentials.secret_key,
                Some(&payload),
            )
            .await?;

        let envelope_ok = body
            .get("status")
            .and_then(|v| v.as_str())
            .map(|s| s.eq_ignore_ascii_case("success"))
            .unwrap_or(false);
        if !envelope_ok {
            let message = body
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("initialization rejected")
                .to_string();
            return Err(PaymentError::ProviderRequest {
                provider: Provider::Flutterwave.to_string(),
                message,
                retryable: false,
            });
        }

        let payment_url = body
            .get("data")
            .and_then(|d| d.get("link"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| PaymentError::ProviderRequest {
                provider: Provider::Flutterwave.to_string(),
                message: "missing payment link in response".to_string(),
                retryable: false,
            })?;

        info!(tx_ref = %request.reference, "flutterwave payment initiated");

        Ok(InitiateOutcome {
            payment_url,
            // Flutterwave reports events under our tx_ref.
            provider_reference: request.reference.clone(),
        })
    }

    async fn verify(&self, reference: &str) -> PaymentResult<VerifyOutcome> {
        let url = format!(
            "{}?tx_ref={}",
            self.endpoint("/transactions/verify_by_reference"),
            reference
        );
        let body: JsonValue = self
            .http
            .request_json(
                Provider::Flutterwave,
                reqwest::Method::GET,
                &url,
                &self.credentials.secret_key,
                None,
            )
            .await?;

        Ok(Self::map_verify_payload(&body))
    }

    fn verify_webhook_signature(&self, _payload: &[u8], signature: &str) -> bool {
        match self.credentials.webhook_secret.as_deref() {
            Some(expected) => secure_eq(expected.trim().as_bytes(), signature.trim().as_bytes()),
            // A provider without a configured hash cannot authenticate
            // any delivery.
            None => false,
        }
    }

    fn webhook_reference(&self, payload: &JsonValue) -> Option<String> {
        let data = payload.get("data")?;
        data.get("tx_ref")
            .or_else(|| data.get("txRef"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }
}
