use axum::extract::{Path, Query, State};
use axum::response::Redirect;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use tracing::warn;

use crate::api::AppState;
use crate::error::PaymentResult;
use crate::payments::engine::{InitiatePayment, ReconcileTrigger};
use crate::payments::types::{PaymentRecord, PaymentStatus, PaymentType, Provider};

#[derive(Debug, Deserialize)]
pub struct InitiateBody {
    /// Amount in the smallest currency unit (kobo for NGN).
    pub amount: i64,
    pub currency: Option<String>,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub provider: Provider,
    #[serde(rename = "type")]
    pub payment_type: PaymentType,
    #[serde(default)]
    pub metadata: JsonValue,
    pub redirect_url: Option<String>,
}

/// Payment record shape exposed over the API. Payer contact details and
/// raw metadata stay internal.
#[derive(Debug, Serialize)]
pub struct PaymentView {
    pub reference: String,
    pub provider: Provider,
    pub amount_minor: i64,
    pub currency: String,
    #[serde(rename = "type")]
    pub payment_type: PaymentType,
    pub status: PaymentStatus,
    pub provider_transaction_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<PaymentRecord> for PaymentView {
    fn from(record: PaymentRecord) -> Self {
        PaymentView {
            reference: record.reference,
            provider: record.provider,
            amount_minor: record.amount_minor,
            currency: record.currency,
            payment_type: record.payment_type,
            status: record.status,
            provider_transaction_id: record.provider_transaction_id,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// POST /api/payments/initiate
pub async fn initiate_payment(
    State(state): State<AppState>,
    Json(body): Json<InitiateBody>,
) -> PaymentResult<Json<JsonValue>> {
    let request = InitiatePayment {
        provider: body.provider,
        amount_minor: body.amount,
        currency: body
            .currency
            .unwrap_or_else(|| state.config.payments.currency.clone()),
        email: body.email,
        full_name: body.name,
        phone: body.phone,
        payment_type: body.payment_type,
        metadata: body.metadata,
        redirect_url: Some(
            body.redirect_url
                .unwrap_or_else(|| state.config.callback_url()),
        ),
    };

    let initiated = state.engine.initiate(request).await?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "reference": initiated.reference,
            "payment_url": initiated.payment_url,
        }
    })))
}

/// GET /api/payments/verify/:reference
///
/// Re-confirms with the provider before answering; a completed payment
/// here has already had its settlement effects applied.
pub async fn verify_payment(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> PaymentResult<Json<JsonValue>> {
    let outcome = state
        .engine
        .reconcile(&reference, ReconcileTrigger::Poll)
        .await?;

    if let Some(error) = &outcome.transient_error {
        warn!(reference = %reference, error = %error, "verification deferred, provider unreachable");
    }

    Ok(Json(json!({
        "success": true,
        "status": outcome.status,
        "payment": PaymentView::from(outcome.record),
    })))
}

/// GET /api/payments/callback
///
/// Providers differ in the query key carrying our reference: Paystack
/// sends `reference`/`trxref`, Flutterwave `tx_ref`.
pub async fn payment_callback(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Redirect {
    let frontend = state
        .config
        .payments
        .frontend_url
        .trim_end_matches('/')
        .to_string();

    let reference = ["reference", "tx_ref", "trxref"]
        .iter()
        .find_map(|key| params.get(*key))
        .cloned();

    let Some(reference) = reference else {
        return Redirect::to(&format!(
            "{}/payment/status?status=failed&message=missing-reference",
            frontend
        ));
    };

    match state
        .engine
        .reconcile(&reference, ReconcileTrigger::Callback)
        .await
    {
        Ok(outcome) => {
            let (status, message) = match outcome.status {
                PaymentStatus::Completed => ("completed", "payment-successful"),
                PaymentStatus::Failed => ("failed", "payment-failed"),
                PaymentStatus::Pending => ("pending", "payment-processing"),
            };
            Redirect::to(&format!(
                "{}/payment/status?status={}&message={}&reference={}",
                frontend, status, message, reference
            ))
        }
        Err(e) => {
            warn!(reference = %reference, error = %e, "callback reconciliation failed");
            Redirect::to(&format!(
                "{}/payment/status?status=failed&message=verification-error&reference={}",
                frontend, reference
            ))
        }
    }
}
