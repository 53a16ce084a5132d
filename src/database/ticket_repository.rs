use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use crate::database::error::{DatabaseError, DbResult};
use crate::payments::store::TicketStore;
use crate::payments::types::Ticket;

#[derive(Debug, Clone, FromRow)]
struct TicketRow {
    id: String,
    event_id: String,
    attendee_name: String,
    attendee_email: String,
    ticket_code: String,
    payment_reference: String,
    status: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<TicketRow> for Ticket {
    fn from(row: TicketRow) -> Self {
        Ticket {
            id: row.id,
            event_id: row.event_id,
            attendee_name: row.attendee_name,
            attendee_email: row.attendee_email,
            ticket_code: row.ticket_code,
            payment_reference: row.payment_reference,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

/// Repository for issued event tickets
pub struct TicketRepository {
    pool: PgPool,
}

impl TicketRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TicketStore for TicketRepository {
    async fn find_by_code(&self, ticket_code: &str) -> DbResult<Option<Ticket>> {
        let row = sqlx::query_as::<_, TicketRow>(
            "SELECT id, event_id, attendee_name, attendee_email, ticket_code, \
                    payment_reference, status, created_at \
             FROM tickets WHERE ticket_code = $1",
        )
        .bind(ticket_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(row.map(Ticket::from))
    }

    async fn insert_tickets(&self, tickets: &[Ticket]) -> DbResult<u64> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;
        let mut inserted = 0u64;

        // Code collisions mean another settlement attempt already issued
        // these tickets; skipping them keeps the batch idempotent.
        for ticket in tickets {
            let result = sqlx::query(
                "INSERT INTO tickets \
                 (id, event_id, attendee_name, attendee_email, ticket_code, \
                  payment_reference, status, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 ON CONFLICT (ticket_code) DO NOTHING",
            )
            .bind(&ticket.id)
            .bind(&ticket.event_id)
            .bind(&ticket.attendee_name)
            .bind(&ticket.attendee_email)
            .bind(&ticket.ticket_code)
            .bind(&ticket.payment_reference)
            .bind(&ticket.status)
            .bind(ticket.created_at)
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;

            inserted += result.rows_affected();
        }

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(inserted)
    }
}
