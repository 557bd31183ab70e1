// src/db/outbox_repo.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::outbox::{NewOutboxMessage, OutboxMessage},
};

#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn enqueue(&self, message: &NewOutboxMessage) -> Result<OutboxMessage, AppError>;

    /// Reserva as pendentes com next_attempt_at <= agora, mais antigas
    /// primeiro, empurrando next_attempt_at para `lease_until`. Outro
    /// despachante não as vê até lá.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutboxMessage>, AppError>;

    async fn mark_sent(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError>;

    /// Soma uma tentativa e reagenda.
    async fn mark_retry(&self, id: Uuid, error: &str, next_attempt_at: DateTime<Utc>) -> Result<(), AppError>;

    /// Soma uma tentativa e desiste.
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), AppError>;
}

const OUTBOX_COLUMNS: &str = r#"
    id, kind, recipient, subject, html_body, status, attempts,
    last_error, next_attempt_at, created_at, sent_at
"#;

#[derive(Clone)]
pub struct OutboxRepository {
    pool: PgPool,
}

impl OutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxStore for OutboxRepository {
    async fn enqueue(&self, message: &NewOutboxMessage) -> Result<OutboxMessage, AppError> {
        let created = sqlx::query_as::<_, OutboxMessage>(&format!(
            r#"
            INSERT INTO outbox_messages (kind, recipient, subject, html_body, status, attempts, next_attempt_at)
            VALUES ($1, $2, $3, $4, 'pending', 0, NOW())
            RETURNING {}
            "#,
            OUTBOX_COLUMNS
        ))
            .bind(&message.kind)
            .bind(&message.recipient)
            .bind(&message.subject)
            .bind(&message.html_body)
            .fetch_one(&self.pool)
            .await?;

        Ok(created)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutboxMessage>, AppError> {
        let mut messages = sqlx::query_as::<_, OutboxMessage>(&format!(
            r#"
            UPDATE outbox_messages SET next_attempt_at = $2
            WHERE id IN (
                SELECT id FROM outbox_messages
                WHERE status = 'pending' AND next_attempt_at <= $1
                ORDER BY created_at ASC
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            OUTBOX_COLUMNS
        ))
            .bind(now)
            .bind(lease_until)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        // RETURNING não garante a ordem do SELECT interno
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn mark_sent(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE outbox_messages SET status = 'sent', attempts = attempts + 1, sent_at = $2, last_error = NULL WHERE id = $1",
        )
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn mark_retry(&self, id: Uuid, error: &str, next_attempt_at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE outbox_messages
            SET attempts = attempts + 1, last_error = $2, next_attempt_at = $3
            WHERE id = $1
            "#,
        )
            .bind(id)
            .bind(error)
            .bind(next_attempt_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE outbox_messages SET status = 'failed', attempts = attempts + 1, last_error = $2 WHERE id = $1",
        )
            .bind(id)
            .bind(error)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
