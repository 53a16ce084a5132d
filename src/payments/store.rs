//! Storage seams for the reconciliation engine.
//!
//! The engine only ever touches durable state through these traits; the
//! Postgres repositories in `crate::database` implement them, and tests
//! substitute in-memory fakes.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::database::error::DbResult;
use crate::payments::types::{PaymentRecord, Ticket, WalletTransaction};

/// Durable record of payment attempts, keyed by reference.
///
/// Only the engine writes status; terminal transitions are conditional
/// so a record completes or fails at most once even under races.
#[async_trait]
pub trait PaymentRecordStore: Send + Sync {
    async fn create(&self, record: &PaymentRecord) -> DbResult<()>;

    async fn find_by_reference(&self, reference: &str) -> DbResult<Option<PaymentRecord>>;

    /// Transition pending → completed, recording the provider's
    /// transaction id and verification payload. Returns false if the
    /// record was no longer pending (another invocation won the race).
    async fn mark_completed(
        &self,
        reference: &str,
        provider_transaction_id: Option<&str>,
        verification: &JsonValue,
    ) -> DbResult<bool>;

    /// Transition pending → failed. Returns false if not pending.
    async fn mark_failed(&self, reference: &str, reason: &str) -> DbResult<bool>;
}

/// Wallet balances and their transaction ledger
#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn find_transaction_by_reference(
        &self,
        reference: &str,
    ) -> DbResult<Option<WalletTransaction>>;

    /// Insert the credit row and adjust (or create) the wallet balance in
    /// one atomic step. Returns false if a transaction with this
    /// reference already existed, in which case nothing is written.
    async fn apply_credit(
        &self,
        user_id: &str,
        amount_minor: i64,
        reference: &str,
        description: &str,
    ) -> DbResult<bool>;
}

/// Issued event tickets
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn find_by_code(&self, ticket_code: &str) -> DbResult<Option<Ticket>>;

    /// Insert a batch of tickets, skipping any whose code already exists.
    /// Returns the number of rows actually inserted.
    async fn insert_tickets(&self, tickets: &[Ticket]) -> DbResult<u64>;
}
