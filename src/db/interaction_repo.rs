// src/db/interaction_repo.rs

use async_trait::async_trait;
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        interaction::{Interaction, InteractionRow, NewInteraction},
        lead::IdentityKey,
    },
};

#[async_trait]
pub trait InteractionStore: Send + Sync {
    async fn insert_interaction(&self, interaction: &NewInteraction) -> Result<Interaction, AppError>;

    async fn list_for_lead(&self, lead_id: Uuid) -> Result<Vec<Interaction>, AppError>;

    /// Interações do lead OU que citam a chave (CPF/e-mail) sem lead ligado.
    async fn list_for_identity(&self, key: &IdentityKey, lead_id: Option<Uuid>) -> Result<Vec<Interaction>, AppError>;

    /// Interações órfãs (sem lead) que ainda carregam CPF ou e-mail.
    async fn list_orphans(&self, limit: i64) -> Result<Vec<Interaction>, AppError>;

    /// Liga a órfã a um lead. Só afeta se ainda estiver órfã.
    async fn attach_to_lead(&self, interaction_id: Uuid, lead_id: Uuid) -> Result<bool, AppError>;
}

const INTERACTION_COLUMNS: &str = r#"
    id, lead_id, user_id, cpf, email, interaction_type, channel,
    description, metadata, created_at
"#;

#[derive(Clone)]
pub struct InteractionRepository {
    pool: PgPool,
}

impl InteractionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InteractionStore for InteractionRepository {
    async fn insert_interaction(&self, interaction: &NewInteraction) -> Result<Interaction, AppError> {
        let row = sqlx::query_as::<_, InteractionRow>(&format!(
            r#"
            INSERT INTO interactions (
                lead_id, user_id, cpf, email, interaction_type, channel, description, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            INTERACTION_COLUMNS
        ))
            .bind(interaction.lead_id)
            .bind(interaction.user_id)
            .bind(&interaction.cpf)
            .bind(&interaction.email)
            .bind(interaction.interaction_type)
            .bind(interaction.channel)
            .bind(&interaction.description)
            .bind(Json(interaction.metadata.to_json()))
            .fetch_one(&self.pool)
            .await?;

        Ok(row.into())
    }

    async fn list_for_lead(&self, lead_id: Uuid) -> Result<Vec<Interaction>, AppError> {
        let rows = sqlx::query_as::<_, InteractionRow>(&format!(
            "SELECT {} FROM interactions WHERE lead_id = $1 ORDER BY created_at DESC",
            INTERACTION_COLUMNS
        ))
            .bind(lead_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Interaction::from).collect())
    }

    async fn list_for_identity(&self, key: &IdentityKey, lead_id: Option<Uuid>) -> Result<Vec<Interaction>, AppError> {
        let (condition, value) = match key {
            IdentityKey::Cpf(cpf) => ("cpf = $1", cpf),
            IdentityKey::Email(email) => ("lower(email) = lower($1)", email),
        };

        let rows = sqlx::query_as::<_, InteractionRow>(&format!(
            r#"
            SELECT {} FROM interactions
            WHERE ($2::uuid IS NOT NULL AND lead_id = $2)
               OR ({})
            ORDER BY created_at ASC
            "#,
            INTERACTION_COLUMNS, condition
        ))
            .bind(value)
            .bind(lead_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Interaction::from).collect())
    }

    async fn list_orphans(&self, limit: i64) -> Result<Vec<Interaction>, AppError> {
        let rows = sqlx::query_as::<_, InteractionRow>(&format!(
            r#"
            SELECT {} FROM interactions
            WHERE lead_id IS NULL AND (cpf IS NOT NULL OR email IS NOT NULL)
            ORDER BY created_at ASC
            LIMIT $1
            "#,
            INTERACTION_COLUMNS
        ))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Interaction::from).collect())
    }

    async fn attach_to_lead(&self, interaction_id: Uuid, lead_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE interactions SET lead_id = $2 WHERE id = $1 AND lead_id IS NULL")
            .bind(interaction_id)
            .bind(lead_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
