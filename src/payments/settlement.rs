//! Settlement effects: the real-world side of a confirmed payment.
//!
//! Each applier is naturally idempotent via a dedup lookup keyed by the
//! payment reference. That property, together with the engine's
//! terminal-state short-circuit, is what makes duplicate webhook
//! delivery and concurrent polling safe without a cross-store lock.

use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{PaymentError, PaymentResult};
use crate::payments::store::{TicketStore, WalletStore};
use crate::payments::types::{PaymentRecord, Ticket};

/// Derive the deterministic ticket codes for a payment reference.
///
/// Codes depend only on the reference and unit index, so a second
/// settlement attempt regenerates the same codes and collides with the
/// unique index instead of issuing duplicates.
pub fn derive_ticket_codes(reference: &str, count: u32) -> Vec<String> {
    let digest = hex::encode(Sha256::digest(reference.as_bytes()));
    let stem = digest[..10].to_uppercase();
    (1..=count).map(|i| format!("TKT-{}-{}", stem, i)).collect()
}

/// Credits a user's wallet exactly once per payment reference
pub struct WalletCreditApplier {
    wallets: Arc<dyn WalletStore>,
}

impl WalletCreditApplier {
    pub fn new(wallets: Arc<dyn WalletStore>) -> Self {
        Self { wallets }
    }

    pub async fn apply(&self, record: &PaymentRecord) -> PaymentResult<()> {
        let user_id = record.user_id().ok_or_else(|| {
            PaymentError::settlement(format!(
                "wallet funding payment '{}' has no user_id in metadata",
                record.reference
            ))
        })?;

        let existing = self
            .wallets
            .find_transaction_by_reference(&record.reference)
            .await
            .map_err(|e| {
                PaymentError::settlement(format!("wallet dedup check failed: {}", e))
            })?;
        if existing.is_some() {
            info!(reference = %record.reference, "wallet credit already applied, skipping");
            return Ok(());
        }

        let description = format!("Wallet funding via {}", record.provider);
        let inserted = self
            .wallets
            .apply_credit(user_id, record.amount_minor, &record.reference, &description)
            .await
            .map_err(|e| PaymentError::settlement(format!("wallet credit failed: {}", e)))?;

        if inserted {
            info!(
                reference = %record.reference,
                user_id,
                amount_minor = record.amount_minor,
                "wallet credited"
            );
        } else {
            // A concurrent settlement inserted first; the unique index on
            // reference absorbed the race.
            info!(reference = %record.reference, "wallet credit lost insert race, skipping");
        }
        Ok(())
    }
}

/// Issues event tickets exactly once per payment reference
pub struct TicketIssuanceApplier {
    tickets: Arc<dyn TicketStore>,
}

impl TicketIssuanceApplier {
    pub fn new(tickets: Arc<dyn TicketStore>) -> Self {
        Self { tickets }
    }

    pub async fn apply(&self, record: &PaymentRecord) -> PaymentResult<()> {
        let event_id = record.event_id().ok_or_else(|| {
            PaymentError::settlement(format!(
                "ticket payment '{}' has no event_id in metadata",
                record.reference
            ))
        })?;

        let count = record.ticket_count();
        if count == 0 {
            return Err(PaymentError::settlement(format!(
                "ticket payment '{}' has ticket_count of zero",
                record.reference
            )));
        }

        let codes = derive_ticket_codes(&record.reference, count);
        let existing = self
            .tickets
            .find_by_code(&codes[0])
            .await
            .map_err(|e| PaymentError::settlement(format!("ticket dedup check failed: {}", e)))?;
        if existing.is_some() {
            info!(reference = %record.reference, "tickets already issued, skipping");
            return Ok(());
        }

        let now = chrono::Utc::now();
        let rows: Vec<Ticket> = codes
            .into_iter()
            .map(|ticket_code| Ticket {
                id: Uuid::new_v4().to_string(),
                event_id: event_id.to_string(),
                attendee_name: record.payer.full_name.clone(),
                attendee_email: record.payer.email.clone(),
                ticket_code,
                payment_reference: record.reference.clone(),
                status: "valid".to_string(),
                created_at: now,
            })
            .collect();

        let inserted = self
            .tickets
            .insert_tickets(&rows)
            .await
            .map_err(|e| PaymentError::settlement(format!("ticket insert failed: {}", e)))?;

        info!(
            reference = %record.reference,
            event_id,
            issued = inserted,
            requested = count,
            "tickets issued"
        );
        Ok(())
    }
}
