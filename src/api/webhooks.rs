use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use tracing::{info, warn};

use crate::api::AppState;
use crate::payments::types::Provider;

/// Header each provider uses to authenticate its deliveries
fn signature_header(provider: Provider) -> &'static str {
    match provider {
        Provider::Paystack => "x-paystack-signature",
        Provider::Flutterwave => "verif-hash",
        Provider::Korapay => "x-korapay-signature",
    }
}

/// POST /api/webhooks/:provider
///
/// Always acknowledges known providers with 200 once a processing
/// attempt was made; a non-2xx would only make the provider redeliver a
/// payload we will handle idempotently anyway.
pub async fn handle_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let provider: Provider = match provider.parse() {
        Ok(p) => p,
        Err(_) => return StatusCode::NOT_FOUND,
    };

    // Audit the delivery before any processing; a malformed body is
    // still worth recording.
    let payload: serde_json::Value =
        serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    let event_type = payload
        .get("event")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    let delivery = match state
        .webhooks
        .record_delivery(provider, &event_type, payload)
        .await
    {
        Ok(d) => Some(d),
        Err(e) => {
            warn!(provider = %provider, error = %e, "could not record webhook delivery");
            None
        }
    };

    let signature = headers
        .get(signature_header(provider))
        .and_then(|v| v.to_str().ok());

    match state.engine.process_webhook(provider, &body, signature).await {
        Ok(outcome) => {
            if outcome.status.is_terminal() {
                info!(
                    provider = %provider,
                    reference = %outcome.record.reference,
                    status = outcome.status.as_str(),
                    "webhook reconciled"
                );
                if let Some(d) = &delivery {
                    if let Err(e) = state.webhooks.mark_processed(&d.id).await {
                        warn!(delivery_id = %d.id, error = %e, "could not mark delivery processed");
                    }
                }
            } else {
                // Left unprocessed so a redelivery or poll can finish it.
                let note = outcome
                    .transient_error
                    .unwrap_or_else(|| "provider still reports pending".to_string());
                if let Some(d) = &delivery {
                    if let Err(e) = state.webhooks.record_failure(&d.id, &note).await {
                        warn!(delivery_id = %d.id, error = %e, "could not record delivery attempt");
                    }
                }
            }
            StatusCode::OK
        }
        Err(e) => {
            warn!(provider = %provider, error = %e, "webhook processing failed");
            if let Some(d) = &delivery {
                if let Err(mark_err) = state.webhooks.record_failure(&d.id, &e.to_string()).await {
                    warn!(delivery_id = %d.id, error = %mark_err, "could not record delivery failure");
                }
            }
            StatusCode::OK
        }
    }
}
