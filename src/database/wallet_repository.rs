use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::database::error::{DatabaseError, DatabaseErrorKind, DbResult};
use crate::payments::store::WalletStore;
use crate::payments::types::{WalletTransaction, WalletTransactionKind};

#[derive(Debug, Clone, FromRow)]
struct WalletTransactionRow {
    id: String,
    user_id: String,
    amount_minor: i64,
    kind: String,
    reference: String,
    description: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl WalletTransactionRow {
    fn into_transaction(self) -> DbResult<WalletTransaction> {
        let kind = match self.kind.as_str() {
            "credit" => WalletTransactionKind::Credit,
            "debit" => WalletTransactionKind::Debit,
            other => {
                return Err(DatabaseError::new(DatabaseErrorKind::QueryError {
                    message: format!("unknown wallet transaction kind '{}'", other),
                }))
            }
        };
        Ok(WalletTransaction {
            id: self.id,
            user_id: self.user_id,
            amount_minor: self.amount_minor,
            kind,
            reference: self.reference,
            description: self.description,
            created_at: self.created_at,
        })
    }
}

/// Repository for wallets and their transaction ledger
pub struct WalletRepository {
    pool: PgPool,
}

impl WalletRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WalletStore for WalletRepository {
    async fn find_transaction_by_reference(
        &self,
        reference: &str,
    ) -> DbResult<Option<WalletTransaction>> {
        let row = sqlx::query_as::<_, WalletTransactionRow>(
            "SELECT id, user_id, amount_minor, kind, reference, description, created_at \
             FROM wallet_transactions WHERE reference = $1",
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.map(WalletTransactionRow::into_transaction).transpose()
    }

    async fn apply_credit(
        &self,
        user_id: &str,
        amount_minor: i64,
        reference: &str,
        description: &str,
    ) -> DbResult<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(DatabaseError::from_sqlx)?;

        // The unique index on reference is the authoritative dedup guard;
        // a concurrent settlement that got here first leaves this insert
        // a no-op and we must not touch the balance.
        let inserted = sqlx::query(
            "INSERT INTO wallet_transactions \
             (id, user_id, amount_minor, kind, reference, description, created_at) \
             VALUES ($1, $2, $3, 'credit', $4, $5, NOW()) \
             ON CONFLICT (reference) DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(amount_minor)
        .bind(reference)
        .bind(description)
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
            return Ok(false);
        }

        // Creates the wallet with this balance when none exists yet.
        sqlx::query(
            "INSERT INTO wallets (id, user_id, balance_minor, created_at, updated_at) \
             VALUES ($1, $2, $3, NOW(), NOW()) \
             ON CONFLICT (user_id) DO UPDATE \
             SET balance_minor = wallets.balance_minor + EXCLUDED.balance_minor, \
                 updated_at = NOW()",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(amount_minor)
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(true)
    }
}
