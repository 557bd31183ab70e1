// src/db/journey_repo.rs
//
// Leitura das tabelas de outros módulos (eventos, doações, contas).
// O CRM nunca escreve nelas.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::{
    common::error::AppError,
    models::{
        journey::{DonationRecord, EventRegistrationRecord, UserAccount},
        lead::IdentityKey,
    },
};

#[async_trait]
pub trait JourneySourceStore: Send + Sync {
    async fn registrations_for(&self, key: &IdentityKey) -> Result<Vec<EventRegistrationRecord>, AppError>;

    async fn donations_for(&self, key: &IdentityKey) -> Result<Vec<DonationRecord>, AppError>;

    async fn user_account_for(&self, key: &IdentityKey) -> Result<Option<UserAccount>, AppError>;
}

fn key_condition(key: &IdentityKey) -> (&'static str, &str) {
    match key {
        IdentityKey::Cpf(cpf) => ("cpf = $1", cpf.as_str()),
        IdentityKey::Email(email) => ("lower(email) = lower($1)", email.as_str()),
    }
}

#[derive(Clone)]
pub struct JourneyRepository {
    pool: PgPool,
}

impl JourneyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JourneySourceStore for JourneyRepository {
    async fn registrations_for(&self, key: &IdentityKey) -> Result<Vec<EventRegistrationRecord>, AppError> {
        let (condition, value) = key_condition(key);

        let rows = sqlx::query_as::<_, EventRegistrationRecord>(&format!(
            r#"
            SELECT id, event_id, event_title, cpf, email, is_online, is_paid, amount, created_at
            FROM event_registrations
            WHERE {}
            ORDER BY created_at ASC
            "#,
            condition
        ))
            .bind(value)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn donations_for(&self, key: &IdentityKey) -> Result<Vec<DonationRecord>, AppError> {
        let (condition, value) = key_condition(key);

        let rows = sqlx::query_as::<_, DonationRecord>(&format!(
            r#"
            SELECT id, donation_ref, cpf, email, amount, is_paid, campaign, created_at
            FROM donations
            WHERE {}
            ORDER BY created_at ASC
            "#,
            condition
        ))
            .bind(value)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn user_account_for(&self, key: &IdentityKey) -> Result<Option<UserAccount>, AppError> {
        let (condition, value) = key_condition(key);

        let account = sqlx::query_as::<_, UserAccount>(&format!(
            "SELECT id, cpf, email, created_at FROM users WHERE {} ORDER BY created_at ASC LIMIT 1",
            condition
        ))
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        Ok(account)
    }
}
