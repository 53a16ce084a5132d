//! Core types shared across the payment reconciliation pipeline.
//!
//! Amounts are carried in the smallest currency unit (`amount_minor`)
//! throughout the engine; adapters convert at the provider boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported payment gateways
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Paystack,
    Flutterwave,
    Korapay,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Paystack => "paystack",
            Provider::Flutterwave => "flutterwave",
            Provider::Korapay => "korapay",
        }
    }

    pub const ALL: [Provider; 3] = [
        Provider::Paystack,
        Provider::Flutterwave,
        Provider::Korapay,
    ];
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "paystack" => Ok(Provider::Paystack),
            "flutterwave" => Ok(Provider::Flutterwave),
            "korapay" => Ok(Provider::Korapay),
            other => Err(format!("unknown payment provider '{}'", other)),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a successful payment settles into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    WalletFunding,
    EventTicket,
    General,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::WalletFunding => "wallet_funding",
            PaymentType::EventTicket => "event_ticket",
            PaymentType::General => "general",
        }
    }
}

impl FromStr for PaymentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wallet_funding" => Ok(PaymentType::WalletFunding),
            "event_ticket" => Ok(PaymentType::EventTicket),
            "general" => Ok(PaymentType::General),
            other => Err(format!("unknown payment type '{}'", other)),
        }
    }
}

/// Payment record lifecycle. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Failed)
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(format!("unknown payment status '{}'", other)),
        }
    }
}

/// Contact details captured at initiation, required for receipts and tickets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payer {
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
}

/// Durable record of one payment attempt, keyed by `reference`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Engine-generated globally unique reference; the idempotency key
    /// across the whole pipeline.
    pub reference: String,
    pub provider: Provider,
    /// Amount in the smallest currency unit.
    pub amount_minor: i64,
    pub currency: String,
    pub payer: Payer,
    pub payment_type: PaymentType,
    pub status: PaymentStatus,
    /// Open map carrying user_id, event_id, ticket_count and audit payloads.
    pub metadata: serde_json::Value,
    /// Set only once confirmed by the provider. Distinct from `reference`.
    pub provider_transaction_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl PaymentRecord {
    /// `metadata.user_id`, required for wallet funding settlement
    pub fn user_id(&self) -> Option<&str> {
        self.metadata.get("user_id").and_then(|v| v.as_str())
    }

    /// `metadata.event_id`, required for ticket settlement
    pub fn event_id(&self) -> Option<&str> {
        self.metadata.get("event_id").and_then(|v| v.as_str())
    }

    /// `metadata.ticket_count`, defaults to one ticket per payment
    pub fn ticket_count(&self) -> u32 {
        self.metadata
            .get("ticket_count")
            .and_then(|v| v.as_u64())
            .map(|n| n as u32)
            .unwrap_or(1)
    }
}

/// Ledger entry created exactly once per settled wallet funding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: String,
    pub user_id: String,
    pub amount_minor: i64,
    pub kind: WalletTransactionKind,
    /// Copied from PaymentRecord.reference; the settlement dedup key.
    pub reference: String,
    pub description: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletTransactionKind {
    Credit,
    Debit,
}

impl WalletTransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletTransactionKind::Credit => "credit",
            WalletTransactionKind::Debit => "debit",
        }
    }
}

/// Ticket issued once per unit purchased in an event_ticket settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub event_id: String,
    pub attendee_name: String,
    pub attendee_email: String,
    /// Derived deterministically from the payment reference so duplicate
    /// settlement attempts collide instead of issuing twice.
    pub ticket_code: String,
    pub payment_reference: String,
    pub status: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Adapter-level request to start a payment on a provider's hosted page
#[derive(Debug, Clone)]
pub struct InitiateRequest {
    pub reference: String,
    pub amount_minor: i64,
    pub currency: String,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub redirect_url: Option<String>,
    pub metadata: serde_json::Value,
}

/// Normalized initiation result
#[derive(Debug, Clone)]
pub struct InitiateOutcome {
    /// Hosted checkout page the user is redirected to.
    pub payment_url: String,
    /// Reference the provider will report events under (usually ours).
    pub provider_reference: String,
}

/// What the provider's verify API said about a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStatus {
    /// Provider confirms the payment succeeded.
    Confirmed,
    /// Provider reports a final failure (failed, abandoned, cancelled).
    Declined,
    /// Still in flight on the provider side.
    Pending,
}

/// Normalized verify-on-demand result. `raw` is kept for audit.
#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub status: VerifyStatus,
    pub provider_transaction_id: Option<String>,
    pub raw: serde_json::Value,
}

/// Format a minor-unit amount as a major-unit decimal string for
/// providers that bill in major units (Flutterwave, Korapay).
pub fn minor_to_major(amount_minor: i64) -> String {
    format!("{}.{:02}", amount_minor / 100, (amount_minor % 100).abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_round_trips_through_str() {
        for provider in Provider::ALL {
            assert_eq!(provider.as_str().parse::<Provider>(), Ok(provider));
        }
        assert!("stripe".parse::<Provider>().is_err());
    }

    #[test]
    fn status_terminality() {
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Completed.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
    }

    #[test]
    fn minor_to_major_formats_decimal() {
        assert_eq!(minor_to_major(500_000), "5000.00");
        assert_eq!(minor_to_major(150), "1.50");
        assert_eq!(minor_to_major(7), "0.07");
        assert_eq!(minor_to_major(100), "1.00");
    }

    #[test]
    fn ticket_count_defaults_to_one() {
        let record = PaymentRecord {
            reference: "CPY-1-aa".to_string(),
            provider: Provider::Korapay,
            amount_minor: 1000,
            currency: "NGN".to_string(),
            payer: Payer {
                email: "a@b.c".to_string(),
                full_name: "A B".to_string(),
                phone: None,
            },
            payment_type: PaymentType::EventTicket,
            status: PaymentStatus::Pending,
            metadata: serde_json::json!({"event_id": "evt_1"}),
            provider_transaction_id: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        assert_eq!(record.ticket_count(), 1);
        assert_eq!(record.event_id(), Some("evt_1"));
        assert_eq!(record.user_id(), None);
    }
}
