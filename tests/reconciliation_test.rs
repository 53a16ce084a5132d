//! End-to-end reconciliation tests over in-memory stores and a scripted
//! provider adapter: settlement idempotency, terminal-state behavior and
//! webhook authentication.

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use campuspay_backend::database::error::{DatabaseError, DatabaseErrorKind, DbResult};
use campuspay_backend::error::{PaymentError, PaymentResult};
use campuspay_backend::payments::adapter::{ProviderAdapter, ProviderRegistry};
use campuspay_backend::payments::engine::{
    InitiatePayment, ReconcileTrigger, ReconciliationEngine,
};
use campuspay_backend::payments::settlement::{TicketIssuanceApplier, WalletCreditApplier};
use campuspay_backend::payments::store::{PaymentRecordStore, TicketStore, WalletStore};
use campuspay_backend::payments::types::{
    InitiateOutcome, InitiateRequest, Payer, PaymentRecord, PaymentStatus, PaymentType, Provider,
    Ticket, VerifyOutcome, VerifyStatus, WalletTransaction, WalletTransactionKind,
};

const GOOD_SIGNATURE: &str = "sig-ok";

// ---------------------------------------------------------------------
// In-memory stores. Each mutation happens under a single lock so the
// check-and-set semantics match the conditional SQL they stand in for.
// ---------------------------------------------------------------------

#[derive(Default)]
struct InMemoryRecords {
    rows: Mutex<HashMap<String, PaymentRecord>>,
}

#[async_trait]
impl PaymentRecordStore for InMemoryRecords {
    async fn create(&self, record: &PaymentRecord) -> DbResult<()> {
        self.rows
            .lock()
            .unwrap()
            .insert(record.reference.clone(), record.clone());
        Ok(())
    }

    async fn find_by_reference(&self, reference: &str) -> DbResult<Option<PaymentRecord>> {
        Ok(self.rows.lock().unwrap().get(reference).cloned())
    }

    async fn mark_completed(
        &self,
        reference: &str,
        provider_transaction_id: Option<&str>,
        _verification: &JsonValue,
    ) -> DbResult<bool> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(reference) {
            Some(record) if record.status == PaymentStatus::Pending => {
                record.status = PaymentStatus::Completed;
                record.provider_transaction_id = provider_transaction_id.map(|s| s.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_failed(&self, reference: &str, _reason: &str) -> DbResult<bool> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(reference) {
            Some(record) if record.status == PaymentStatus::Pending => {
                record.status = PaymentStatus::Failed;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
struct WalletState {
    transactions: HashMap<String, WalletTransaction>,
    balances: HashMap<String, i64>,
}

#[derive(Default)]
struct InMemoryWallets {
    state: Mutex<WalletState>,
    /// When set, credit attempts fail like an unreachable database.
    unavailable: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl WalletStore for InMemoryWallets {
    async fn find_transaction_by_reference(
        &self,
        reference: &str,
    ) -> DbResult<Option<WalletTransaction>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .transactions
            .get(reference)
            .cloned())
    }

    async fn apply_credit(
        &self,
        user_id: &str,
        amount_minor: i64,
        reference: &str,
        description: &str,
    ) -> DbResult<bool> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DatabaseError::new(DatabaseErrorKind::ConnectionTimeout));
        }
        let mut state = self.state.lock().unwrap();
        if state.transactions.contains_key(reference) {
            return Ok(false);
        }
        state.transactions.insert(
            reference.to_string(),
            WalletTransaction {
                id: format!("wt-{}", reference),
                user_id: user_id.to_string(),
                amount_minor,
                kind: WalletTransactionKind::Credit,
                reference: reference.to_string(),
                description: description.to_string(),
                created_at: chrono::Utc::now(),
            },
        );
        *state.balances.entry(user_id.to_string()).or_insert(0) += amount_minor;
        Ok(true)
    }
}

impl InMemoryWallets {
    fn transaction_count(&self) -> usize {
        self.state.lock().unwrap().transactions.len()
    }

    fn balance(&self, user_id: &str) -> i64 {
        *self
            .state
            .lock()
            .unwrap()
            .balances
            .get(user_id)
            .unwrap_or(&0)
    }
}

#[derive(Default)]
struct InMemoryTickets {
    rows: Mutex<HashMap<String, Ticket>>,
}

#[async_trait]
impl TicketStore for InMemoryTickets {
    async fn find_by_code(&self, ticket_code: &str) -> DbResult<Option<Ticket>> {
        Ok(self.rows.lock().unwrap().get(ticket_code).cloned())
    }

    async fn insert_tickets(&self, tickets: &[Ticket]) -> DbResult<u64> {
        let mut rows = self.rows.lock().unwrap();
        let mut inserted = 0u64;
        for ticket in tickets {
            if !rows.contains_key(&ticket.ticket_code) {
                rows.insert(ticket.ticket_code.clone(), ticket.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

impl InMemoryTickets {
    fn count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

// ---------------------------------------------------------------------
// Scripted provider adapter
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum VerifyScript {
    Confirmed,
    Declined,
    Pending,
    /// Transient transport failure; the engine must leave the payment
    /// pending.
    Unreachable,
}

struct MockAdapter {
    provider: Provider,
    /// Consumed front-to-back; the last entry repeats once exhausted.
    script: Mutex<Vec<VerifyScript>>,
    fallback: VerifyScript,
    verify_calls: AtomicUsize,
    fail_initiate: bool,
}

impl MockAdapter {
    fn new(provider: Provider, script: Vec<VerifyScript>, fallback: VerifyScript) -> Self {
        Self {
            provider,
            script: Mutex::new(script),
            fallback,
            verify_calls: AtomicUsize::new(0),
            fail_initiate: false,
        }
    }

    fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn initiate(&self, request: &InitiateRequest) -> PaymentResult<InitiateOutcome> {
        if self.fail_initiate {
            return Err(PaymentError::ProviderRequest {
                provider: self.provider.to_string(),
                message: "initialization rejected".to_string(),
                retryable: false,
            });
        }
        Ok(InitiateOutcome {
            payment_url: format!("https://checkout.test/{}", request.reference),
            provider_reference: request.reference.clone(),
        })
    }

    async fn verify(&self, _reference: &str) -> PaymentResult<VerifyOutcome> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let step = {
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                self.fallback
            } else {
                script.remove(0)
            }
        };
        match step {
            VerifyScript::Confirmed => Ok(VerifyOutcome {
                status: VerifyStatus::Confirmed,
                provider_transaction_id: Some("tx-999".to_string()),
                raw: json!({"status": "success"}),
            }),
            VerifyScript::Declined => Ok(VerifyOutcome {
                status: VerifyStatus::Declined,
                provider_transaction_id: None,
                raw: json!({"status": "failed"}),
            }),
            VerifyScript::Pending => Ok(VerifyOutcome {
                status: VerifyStatus::Pending,
                provider_transaction_id: None,
                raw: json!({"status": "pending"}),
            }),
            VerifyScript::Unreachable => Err(PaymentError::ProviderRequest {
                provider: self.provider.to_string(),
                message: "connect timeout".to_string(),
                retryable: true,
            }),
        }
    }

    fn verify_webhook_signature(&self, _payload: &[u8], signature: &str) -> bool {
        signature == GOOD_SIGNATURE
    }

    fn webhook_reference(&self, payload: &JsonValue) -> Option<String> {
        payload
            .get("data")
            .and_then(|d| d.get("reference"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }
}

// ---------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------

struct Harness {
    engine: Arc<ReconciliationEngine>,
    records: Arc<InMemoryRecords>,
    wallets: Arc<InMemoryWallets>,
    tickets: Arc<InMemoryTickets>,
    adapter: Arc<MockAdapter>,
}

fn harness(adapter: MockAdapter) -> Harness {
    let records = Arc::new(InMemoryRecords::default());
    let wallets = Arc::new(InMemoryWallets::default());
    let tickets = Arc::new(InMemoryTickets::default());
    let adapter = Arc::new(adapter);

    let mut registry = ProviderRegistry::new();
    registry.register(adapter.clone());

    let engine = Arc::new(ReconciliationEngine::new(
        records.clone(),
        registry,
        WalletCreditApplier::new(wallets.clone()),
        TicketIssuanceApplier::new(tickets.clone()),
    ));

    Harness {
        engine,
        records,
        wallets,
        tickets,
        adapter,
    }
}

fn pending_record(
    reference: &str,
    provider: Provider,
    payment_type: PaymentType,
    amount_minor: i64,
    metadata: JsonValue,
) -> PaymentRecord {
    let now = chrono::Utc::now();
    PaymentRecord {
        reference: reference.to_string(),
        provider,
        amount_minor,
        currency: "NGN".to_string(),
        payer: Payer {
            email: "student@uni.edu".to_string(),
            full_name: "Ada O".to_string(),
            phone: None,
        },
        payment_type,
        status: PaymentStatus::Pending,
        metadata,
        provider_transaction_id: None,
        created_at: now,
        updated_at: now,
    }
}

// ---------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------

#[tokio::test]
async fn wallet_funding_settles_exactly_once_across_duplicate_webhooks() {
    let h = harness(MockAdapter::new(
        Provider::Paystack,
        vec![],
        VerifyScript::Confirmed,
    ));

    let initiated = h
        .engine
        .initiate(InitiatePayment {
            provider: Provider::Paystack,
            amount_minor: 5000,
            currency: "NGN".to_string(),
            email: "student@uni.edu".to_string(),
            full_name: "Ada O".to_string(),
            phone: None,
            payment_type: PaymentType::WalletFunding,
            metadata: json!({"user_id": "U1"}),
            redirect_url: None,
        })
        .await
        .expect("initiation should succeed");
    assert!(initiated.payment_url.starts_with("https://checkout.test/"));

    let body = json!({"event": "charge.success", "data": {"reference": initiated.reference}});
    let bytes = serde_json::to_vec(&body).unwrap();

    let first = h
        .engine
        .process_webhook(Provider::Paystack, &bytes, Some(GOOD_SIGNATURE))
        .await
        .expect("first delivery should reconcile");
    assert_eq!(first.status, PaymentStatus::Completed);

    // Duplicate delivery short-circuits on the terminal record.
    let second = h
        .engine
        .process_webhook(Provider::Paystack, &bytes, Some(GOOD_SIGNATURE))
        .await
        .expect("duplicate delivery is acknowledged");
    assert_eq!(second.status, PaymentStatus::Completed);

    assert_eq!(h.wallets.transaction_count(), 1);
    assert_eq!(h.wallets.balance("U1"), 5000);
    assert_eq!(h.adapter.verify_calls(), 1);
}

#[tokio::test]
async fn concurrent_reconciles_credit_the_wallet_once() {
    let h = harness(MockAdapter::new(
        Provider::Paystack,
        vec![],
        VerifyScript::Confirmed,
    ));
    let record = pending_record(
        "CPY-100-aa",
        Provider::Paystack,
        PaymentType::WalletFunding,
        250_000,
        json!({"user_id": "U7"}),
    );
    h.records.create(&record).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = h.engine.clone();
        handles.push(tokio::spawn(async move {
            engine.reconcile("CPY-100-aa", ReconcileTrigger::Poll).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().expect("reconcile should not error");
    }

    assert_eq!(h.wallets.transaction_count(), 1);
    assert_eq!(h.wallets.balance("U7"), 250_000);

    let record = h.records.find_by_reference("CPY-100-aa").await.unwrap();
    assert_eq!(record.unwrap().status, PaymentStatus::Completed);
}

#[tokio::test]
async fn declined_verification_fails_without_settlement() {
    let h = harness(MockAdapter::new(
        Provider::Paystack,
        vec![],
        VerifyScript::Declined,
    ));
    let record = pending_record(
        "CPY-200-bb",
        Provider::Paystack,
        PaymentType::WalletFunding,
        1000,
        json!({"user_id": "U2"}),
    );
    h.records.create(&record).await.unwrap();

    let outcome = h
        .engine
        .reconcile("CPY-200-bb", ReconcileTrigger::Webhook)
        .await
        .unwrap();
    assert_eq!(outcome.status, PaymentStatus::Failed);
    assert_eq!(h.wallets.transaction_count(), 0);

    // Terminal now: another pass never reaches the provider again.
    let again = h
        .engine
        .reconcile("CPY-200-bb", ReconcileTrigger::Poll)
        .await
        .unwrap();
    assert_eq!(again.status, PaymentStatus::Failed);
    assert_eq!(h.adapter.verify_calls(), 1);
}

#[tokio::test]
async fn transient_verify_failure_leaves_payment_pending() {
    let h = harness(MockAdapter::new(
        Provider::Flutterwave,
        vec![VerifyScript::Unreachable, VerifyScript::Confirmed],
        VerifyScript::Confirmed,
    ));
    let record = pending_record(
        "CPY-300-cc",
        Provider::Flutterwave,
        PaymentType::WalletFunding,
        7500,
        json!({"user_id": "U3"}),
    );
    h.records.create(&record).await.unwrap();

    let first = h
        .engine
        .reconcile("CPY-300-cc", ReconcileTrigger::Poll)
        .await
        .expect("transient failure is not an error to the caller");
    assert_eq!(first.status, PaymentStatus::Pending);
    assert!(first.transient_error.is_some());
    assert_eq!(h.wallets.transaction_count(), 0);

    let second = h
        .engine
        .reconcile("CPY-300-cc", ReconcileTrigger::Poll)
        .await
        .unwrap();
    assert_eq!(second.status, PaymentStatus::Completed);
    assert_eq!(h.wallets.transaction_count(), 1);
    assert_eq!(h.wallets.balance("U3"), 7500);
}

#[tokio::test]
async fn settlement_store_failure_keeps_payment_pending() {
    let h = harness(MockAdapter::new(
        Provider::Paystack,
        vec![],
        VerifyScript::Confirmed,
    ));
    let record = pending_record(
        "CPY-700-gg",
        Provider::Paystack,
        PaymentType::WalletFunding,
        4000,
        json!({"user_id": "U9"}),
    );
    h.records.create(&record).await.unwrap();

    h.wallets.unavailable.store(true, Ordering::SeqCst);
    let err = h
        .engine
        .reconcile("CPY-700-gg", ReconcileTrigger::Webhook)
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::Settlement { .. }));
    assert!(err.is_retryable());

    // The status update never ran: no completed record with effects
    // missing, and the attempt is safe to repeat.
    let stuck = h.records.find_by_reference("CPY-700-gg").await.unwrap();
    assert_eq!(stuck.unwrap().status, PaymentStatus::Pending);
    assert_eq!(h.wallets.transaction_count(), 0);

    h.wallets.unavailable.store(false, Ordering::SeqCst);
    let outcome = h
        .engine
        .reconcile("CPY-700-gg", ReconcileTrigger::Poll)
        .await
        .unwrap();
    assert_eq!(outcome.status, PaymentStatus::Completed);
    assert_eq!(h.wallets.transaction_count(), 1);
    assert_eq!(h.wallets.balance("U9"), 4000);
}

#[tokio::test]
async fn ticket_purchase_issues_requested_count_exactly_once() {
    let h = harness(MockAdapter::new(
        Provider::Korapay,
        vec![],
        VerifyScript::Confirmed,
    ));
    let record = pending_record(
        "CPY-400-dd",
        Provider::Korapay,
        PaymentType::EventTicket,
        30_000,
        json!({"event_id": "evt_42", "ticket_count": 3}),
    );
    h.records.create(&record).await.unwrap();

    let outcome = h
        .engine
        .reconcile("CPY-400-dd", ReconcileTrigger::Webhook)
        .await
        .unwrap();
    assert_eq!(outcome.status, PaymentStatus::Completed);
    assert_eq!(h.tickets.count(), 3);

    // An extra verify pass must not mint more tickets.
    h.engine
        .reconcile("CPY-400-dd", ReconcileTrigger::Poll)
        .await
        .unwrap();
    assert_eq!(h.tickets.count(), 3);
}

#[tokio::test]
async fn still_pending_on_provider_side_stays_pending() {
    let h = harness(MockAdapter::new(
        Provider::Paystack,
        vec![],
        VerifyScript::Pending,
    ));
    let record = pending_record(
        "CPY-500-ee",
        Provider::Paystack,
        PaymentType::General,
        900,
        json!({}),
    );
    h.records.create(&record).await.unwrap();

    let outcome = h
        .engine
        .reconcile("CPY-500-ee", ReconcileTrigger::Callback)
        .await
        .unwrap();
    assert_eq!(outcome.status, PaymentStatus::Pending);
    assert!(outcome.transient_error.is_none());
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected_before_any_processing() {
    let h = harness(MockAdapter::new(
        Provider::Paystack,
        vec![],
        VerifyScript::Confirmed,
    ));
    let record = pending_record(
        "CPY-600-ff",
        Provider::Paystack,
        PaymentType::WalletFunding,
        2000,
        json!({"user_id": "U6"}),
    );
    h.records.create(&record).await.unwrap();

    let body = json!({"event": "charge.success", "data": {"reference": "CPY-600-ff"}});
    let bytes = serde_json::to_vec(&body).unwrap();

    let err = h
        .engine
        .process_webhook(Provider::Paystack, &bytes, Some("forged"))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::SignatureMismatch { .. }));

    let missing = h
        .engine
        .process_webhook(Provider::Paystack, &bytes, None)
        .await
        .unwrap_err();
    assert!(matches!(missing, PaymentError::SignatureMismatch { .. }));

    assert_eq!(h.adapter.verify_calls(), 0);
    assert_eq!(h.wallets.transaction_count(), 0);
    let record = h.records.find_by_reference("CPY-600-ff").await.unwrap();
    assert_eq!(record.unwrap().status, PaymentStatus::Pending);
}

#[tokio::test]
async fn unknown_reference_is_not_found_and_never_created() {
    let h = harness(MockAdapter::new(
        Provider::Paystack,
        vec![],
        VerifyScript::Confirmed,
    ));

    let err = h
        .engine
        .reconcile("CPY-missing", ReconcileTrigger::Poll)
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::NotFound { .. }));
    assert!(h
        .records
        .find_by_reference("CPY-missing")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn failed_initiation_marks_the_record_failed() {
    let mut adapter = MockAdapter::new(Provider::Paystack, vec![], VerifyScript::Confirmed);
    adapter.fail_initiate = true;
    let h = harness(adapter);

    let err = h
        .engine
        .initiate(InitiatePayment {
            provider: Provider::Paystack,
            amount_minor: 1500,
            currency: "NGN".to_string(),
            email: "student@uni.edu".to_string(),
            full_name: "Ada O".to_string(),
            phone: None,
            payment_type: PaymentType::General,
            metadata: json!({}),
            redirect_url: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::ProviderRequest { .. }));

    let rows = h.records.rows.lock().unwrap();
    let record = rows.values().next().expect("record should exist");
    assert_eq!(record.status, PaymentStatus::Failed);
}

#[tokio::test]
async fn unregistered_provider_is_a_gateway_config_error() {
    let h = harness(MockAdapter::new(
        Provider::Paystack,
        vec![],
        VerifyScript::Confirmed,
    ));

    let err = h
        .engine
        .initiate(InitiatePayment {
            provider: Provider::Korapay,
            amount_minor: 1000,
            currency: "NGN".to_string(),
            email: "student@uni.edu".to_string(),
            full_name: "Ada O".to_string(),
            phone: None,
            payment_type: PaymentType::General,
            metadata: json!({}),
            redirect_url: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::GatewayConfig { .. }));
}
