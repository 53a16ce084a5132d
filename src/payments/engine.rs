//! The reconciliation engine: the only writer of payment status.
//!
//! Both webhook delivery and verify-on-demand funnel into
//! [`ReconciliationEngine::reconcile`], which drives the provider
//! adapter and applies settlement effects at most once per reference.

use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{PaymentError, PaymentResult};
use crate::payments::adapter::ProviderRegistry;
use crate::payments::settlement::{TicketIssuanceApplier, WalletCreditApplier};
use crate::payments::store::PaymentRecordStore;
use crate::payments::types::{
    InitiateRequest, Payer, PaymentRecord, PaymentStatus, PaymentType, Provider, VerifyStatus,
};

/// What asked for this reconciliation; logged on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileTrigger {
    Webhook,
    Poll,
    Callback,
}

impl ReconcileTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileTrigger::Webhook => "webhook",
            ReconcileTrigger::Poll => "poll",
            ReconcileTrigger::Callback => "callback",
        }
    }
}

/// Engine-level initiation request, assembled by the API layer
#[derive(Debug, Clone)]
pub struct InitiatePayment {
    pub provider: Provider,
    pub amount_minor: i64,
    pub currency: String,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub payment_type: PaymentType,
    pub metadata: serde_json::Value,
    pub redirect_url: Option<String>,
}

/// Result of a successful initiation
#[derive(Debug, Clone)]
pub struct InitiatedPayment {
    pub reference: String,
    pub payment_url: String,
}

/// Result of one reconciliation pass.
///
/// `transient_error` is set when the provider could not be reached; the
/// record is still pending and the attempt is safe to repeat.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub status: PaymentStatus,
    pub record: PaymentRecord,
    pub transient_error: Option<String>,
}

/// Generate a globally unique payment reference: millisecond timestamp
/// plus a random hex suffix.
pub fn generate_reference() -> String {
    let suffix: [u8; 4] = rand::random();
    format!(
        "CPY-{}-{}",
        chrono::Utc::now().timestamp_millis(),
        hex::encode(suffix)
    )
}

pub struct ReconciliationEngine {
    records: Arc<dyn PaymentRecordStore>,
    registry: ProviderRegistry,
    wallet_credits: WalletCreditApplier,
    ticket_issuance: TicketIssuanceApplier,
}

impl ReconciliationEngine {
    pub fn new(
        records: Arc<dyn PaymentRecordStore>,
        registry: ProviderRegistry,
        wallet_credits: WalletCreditApplier,
        ticket_issuance: TicketIssuanceApplier,
    ) -> Self {
        Self {
            records,
            registry,
            wallet_credits,
            ticket_issuance,
        }
    }

    /// Create a pending payment record and open a checkout session with
    /// the provider.
    ///
    /// A failed initiation leaves the record `failed` (or absent if the
    /// insert itself failed), never anything else.
    pub async fn initiate(&self, request: InitiatePayment) -> PaymentResult<InitiatedPayment> {
        validate_initiate(&request)?;

        let adapter = self.registry.get(request.provider)?;
        let reference = generate_reference();
        let now = chrono::Utc::now();

        let mut metadata = match request.metadata {
            serde_json::Value::Object(map) => serde_json::Value::Object(map),
            serde_json::Value::Null => serde_json::json!({}),
            _ => {
                return Err(PaymentError::validation("metadata must be a JSON object"));
            }
        };
        metadata["gateway_provider"] = serde_json::Value::String(request.provider.to_string());

        let record = PaymentRecord {
            reference: reference.clone(),
            provider: request.provider,
            amount_minor: request.amount_minor,
            currency: request.currency.clone(),
            payer: Payer {
                email: request.email.clone(),
                full_name: request.full_name.clone(),
                phone: request.phone.clone(),
            },
            payment_type: request.payment_type,
            status: PaymentStatus::Pending,
            metadata: metadata.clone(),
            provider_transaction_id: None,
            created_at: now,
            updated_at: now,
        };
        self.records.create(&record).await?;

        let initiate_request = InitiateRequest {
            reference: reference.clone(),
            amount_minor: request.amount_minor,
            currency: request.currency,
            email: request.email,
            full_name: request.full_name,
            phone: request.phone,
            redirect_url: request.redirect_url,
            metadata,
        };

        match adapter.initiate(&initiate_request).await {
            Ok(outcome) => {
                info!(
                    reference = %reference,
                    provider = %request.provider,
                    "payment initiated"
                );
                Ok(InitiatedPayment {
                    reference,
                    payment_url: outcome.payment_url,
                })
            }
            Err(e) => {
                warn!(reference = %reference, error = %e, "initiation failed, marking record failed");
                if let Err(mark_err) = self
                    .records
                    .mark_failed(&reference, &format!("initiation failed: {}", e))
                    .await
                {
                    warn!(reference = %reference, error = %mark_err, "could not mark failed record");
                }
                Err(e)
            }
        }
    }

    /// Drive one payment toward a terminal state.
    ///
    /// Identical semantics for webhook, poll and callback triggers:
    /// terminal records short-circuit, everything else is re-confirmed
    /// with the provider before any settlement effect runs.
    pub async fn reconcile(
        &self,
        reference: &str,
        trigger: ReconcileTrigger,
    ) -> PaymentResult<ReconcileOutcome> {
        let record = self
            .records
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| PaymentError::NotFound {
                reference: reference.to_string(),
            })?;

        if record.status.is_terminal() {
            info!(
                reference,
                status = record.status.as_str(),
                trigger = trigger.as_str(),
                "payment already terminal, skipping"
            );
            return Ok(ReconcileOutcome {
                status: record.status,
                record,
                transient_error: None,
            });
        }

        let adapter = self.registry.get(record.provider)?;
        let verification = match adapter.verify(&record.reference).await {
            Ok(v) => v,
            Err(e) if e.is_retryable() => {
                // Transient infrastructure failure is not an answer; the
                // record stays pending for webhook redelivery or the next
                // poll.
                warn!(
                    reference,
                    trigger = trigger.as_str(),
                    error = %e,
                    "provider verify unavailable, leaving payment pending"
                );
                return Ok(ReconcileOutcome {
                    status: PaymentStatus::Pending,
                    record,
                    transient_error: Some(e.to_string()),
                });
            }
            Err(e) => return Err(e),
        };

        match verification.status {
            VerifyStatus::Confirmed => {
                self.settle(&record).await?;

                let updated = self
                    .records
                    .mark_completed(
                        &record.reference,
                        verification.provider_transaction_id.as_deref(),
                        &verification.raw,
                    )
                    .await?;
                if !updated {
                    // A concurrent invocation completed it between our
                    // status read and this update; effects were deduped.
                    info!(reference, "completion race lost, record already terminal");
                }
                info!(
                    reference,
                    trigger = trigger.as_str(),
                    "payment completed and settled"
                );
                let mut record = record;
                record.status = PaymentStatus::Completed;
                record.provider_transaction_id = verification.provider_transaction_id;
                Ok(ReconcileOutcome {
                    status: PaymentStatus::Completed,
                    record,
                    transient_error: None,
                })
            }
            VerifyStatus::Declined => {
                self.records
                    .mark_failed(&record.reference, "provider reported failure")
                    .await?;
                info!(reference, trigger = trigger.as_str(), "payment failed");
                let mut record = record;
                record.status = PaymentStatus::Failed;
                Ok(ReconcileOutcome {
                    status: PaymentStatus::Failed,
                    record,
                    transient_error: None,
                })
            }
            VerifyStatus::Pending => Ok(ReconcileOutcome {
                status: PaymentStatus::Pending,
                record,
                transient_error: None,
            }),
        }
    }

    /// Handle one webhook delivery: authenticate it over the raw body,
    /// pull out our reference and run a normal reconciliation.
    ///
    /// The payload's own status fields are never trusted; a delivery is
    /// only a hint to re-verify with the provider.
    pub async fn process_webhook(
        &self,
        provider: Provider,
        body: &[u8],
        signature: Option<&str>,
    ) -> PaymentResult<ReconcileOutcome> {
        let adapter = self.registry.get(provider)?;

        let signature = signature.ok_or_else(|| PaymentError::SignatureMismatch {
            provider: provider.to_string(),
        })?;
        if !adapter.verify_webhook_signature(body, signature) {
            warn!(provider = %provider, "webhook signature mismatch, delivery ignored");
            return Err(PaymentError::SignatureMismatch {
                provider: provider.to_string(),
            });
        }

        let payload: serde_json::Value = serde_json::from_slice(body)
            .map_err(|_| PaymentError::validation("webhook body is not valid JSON"))?;
        let reference = adapter.webhook_reference(&payload).ok_or_else(|| {
            PaymentError::validation("webhook payload carries no payment reference")
        })?;

        self.reconcile(&reference, ReconcileTrigger::Webhook).await
    }

    /// Fetch a record without touching the provider
    pub async fn find_payment(&self, reference: &str) -> PaymentResult<PaymentRecord> {
        self.records
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| PaymentError::NotFound {
                reference: reference.to_string(),
            })
    }

    async fn settle(&self, record: &PaymentRecord) -> PaymentResult<()> {
        match record.payment_type {
            PaymentType::WalletFunding => self.wallet_credits.apply(record).await,
            PaymentType::EventTicket => self.ticket_issuance.apply(record).await,
            // General payments have no derived rows; the record itself
            // is the receipt.
            PaymentType::General => Ok(()),
        }
    }
}

fn validate_initiate(request: &InitiatePayment) -> PaymentResult<()> {
    if request.amount_minor <= 0 {
        return Err(PaymentError::validation("amount must be positive"));
    }
    if request.email.trim().is_empty() || !request.email.contains('@') {
        return Err(PaymentError::validation("a valid email is required"));
    }
    if request.full_name.trim().is_empty() {
        return Err(PaymentError::validation("full name is required"));
    }
    if request.currency.trim().is_empty() {
        return Err(PaymentError::validation("currency is required"));
    }
    match request.payment_type {
        PaymentType::WalletFunding => {
            if request
                .metadata
                .get("user_id")
                .and_then(|v| v.as_str())
                .map(|s| s.trim().is_empty())
                .unwrap_or(true)
            {
                return Err(PaymentError::validation(
                    "wallet funding requires metadata.user_id",
                ));
            }
        }
        PaymentType::EventTicket => {
            if request
                .metadata
                .get("event_id")
                .and_then(|v| v.as_str())
                .map(|s| s.trim().is_empty())
                .unwrap_or(true)
            {
                return Err(PaymentError::validation(
                    "event ticket purchase requires metadata.event_id",
                ));
            }
        }
        PaymentType::General => {}
    }
    Ok(())
}
