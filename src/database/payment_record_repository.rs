use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

use crate::database::error::{DatabaseError, DatabaseErrorKind, DbResult};
use crate::payments::store::PaymentRecordStore;
use crate::payments::types::{
    Payer, PaymentRecord, PaymentStatus, PaymentType, Provider,
};

/// Row shape of the payment_records table
#[derive(Debug, Clone, FromRow)]
struct PaymentRecordRow {
    reference: String,
    provider: String,
    amount_minor: i64,
    currency: String,
    payer_email: String,
    payer_name: String,
    payer_phone: Option<String>,
    payment_type: String,
    status: String,
    metadata: JsonValue,
    provider_transaction_id: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl PaymentRecordRow {
    fn into_record(self) -> DbResult<PaymentRecord> {
        let provider = Provider::from_str(&self.provider).map_err(corrupt_row)?;
        let payment_type = PaymentType::from_str(&self.payment_type).map_err(corrupt_row)?;
        let status = PaymentStatus::from_str(&self.status).map_err(corrupt_row)?;

        Ok(PaymentRecord {
            reference: self.reference,
            provider,
            amount_minor: self.amount_minor,
            currency: self.currency,
            payer: Payer {
                email: self.payer_email,
                full_name: self.payer_name,
                phone: self.payer_phone,
            },
            payment_type,
            status,
            metadata: self.metadata,
            provider_transaction_id: self.provider_transaction_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn corrupt_row(message: String) -> DatabaseError {
    DatabaseError::new(DatabaseErrorKind::QueryError { message })
}

const RECORD_COLUMNS: &str = "reference, provider, amount_minor, currency, payer_email, \
     payer_name, payer_phone, payment_type, status, metadata, provider_transaction_id, \
     created_at, updated_at";

/// Repository for payment attempt records
pub struct PaymentRecordRepository {
    pool: PgPool,
}

impl PaymentRecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentRecordStore for PaymentRecordRepository {
    async fn create(&self, record: &PaymentRecord) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO payment_records \
             (reference, provider, amount_minor, currency, payer_email, payer_name, \
              payer_phone, payment_type, status, metadata, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(&record.reference)
        .bind(record.provider.as_str())
        .bind(record.amount_minor)
        .bind(&record.currency)
        .bind(&record.payer.email)
        .bind(&record.payer.full_name)
        .bind(&record.payer.phone)
        .bind(record.payment_type.as_str())
        .bind(record.status.as_str())
        .bind(&record.metadata)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }

    async fn find_by_reference(&self, reference: &str) -> DbResult<Option<PaymentRecord>> {
        let sql = format!(
            "SELECT {} FROM payment_records WHERE reference = $1",
            RECORD_COLUMNS
        );
        let row = sqlx::query_as::<_, PaymentRecordRow>(&sql)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        row.map(PaymentRecordRow::into_record).transpose()
    }

    async fn mark_completed(
        &self,
        reference: &str,
        provider_transaction_id: Option<&str>,
        verification: &JsonValue,
    ) -> DbResult<bool> {
        // The status predicate is the terminal-state guard: concurrent
        // invocations race here and only one row update wins.
        let result = sqlx::query(
            "UPDATE payment_records \
             SET status = 'completed', \
                 provider_transaction_id = $2, \
                 metadata = metadata || jsonb_build_object('verification', $3::jsonb), \
                 updated_at = NOW() \
             WHERE reference = $1 AND status = 'pending'",
        )
        .bind(reference)
        .bind(provider_transaction_id)
        .bind(verification)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_failed(&self, reference: &str, reason: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE payment_records \
             SET status = 'failed', \
                 metadata = metadata || jsonb_build_object('failure_reason', $2::text), \
                 updated_at = NOW() \
             WHERE reference = $1 AND status = 'pending'",
        )
        .bind(reference)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }
}
