// src/db/lead_repo.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::{db_utils::map_insert_error, error::AppError},
    models::lead::{ConsistencyWarning, IdentityKey, Lead, LeadPatch, LeadStatus, NewLead, NewWarning},
};

#[derive(Debug, Clone, Default)]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    // Busca por nome, e-mail ou CPF
    pub search: Option<String>,
    pub limit: i64,
}

#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Lead>, AppError>;

    /// Lead não-perdido com este CPF (no máximo um, pelo índice único).
    async fn find_active_by_cpf(&self, cpf: &str) -> Result<Option<Lead>, AppError>;

    /// Lead não-perdido mais antigo com este e-mail.
    async fn find_active_by_email(&self, email: &str) -> Result<Option<Lead>, AppError>;

    /// Para a jornada: prefere o lead ativo, mas aceita um perdido.
    async fn find_by_key(&self, key: &IdentityKey) -> Result<Option<Lead>, AppError>;

    /// Falha com DuplicateIdentity quando outro lead ativo já tem o CPF/e-mail.
    async fn insert_lead(&self, lead: &NewLead) -> Result<Lead, AppError>;

    /// Preenche só os campos nulos (COALESCE).
    async fn backfill_lead(&self, id: Uuid, patch: &LeadPatch) -> Result<Lead, AppError>;

    async fn update_status(&self, id: Uuid, status: LeadStatus) -> Result<Lead, AppError>;

    async fn mark_converted(&self, id: Uuid, user_id: Option<Uuid>, at: DateTime<Utc>) -> Result<Lead, AppError>;

    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>, AppError>;

    async fn record_warning(&self, warning: &NewWarning) -> Result<ConsistencyWarning, AppError>;

    async fn list_warnings(&self, open_only: bool) -> Result<Vec<ConsistencyWarning>, AppError>;
}

const LEAD_COLUMNS: &str = r#"
    id, full_name, email, phone, cpf, status,
    source, first_activity_type, first_activity_name,
    converted_user_id, converted_at, created_at, updated_at
"#;

#[derive(Clone)]
pub struct LeadRepository {
    pool: PgPool,
}

impl LeadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeadStore for LeadRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Lead>, AppError> {
        let lead = sqlx::query_as::<_, Lead>(&format!("SELECT {} FROM leads WHERE id = $1", LEAD_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(lead)
    }

    async fn find_active_by_cpf(&self, cpf: &str) -> Result<Option<Lead>, AppError> {
        let lead = sqlx::query_as::<_, Lead>(&format!(
            "SELECT {} FROM leads WHERE cpf = $1 AND status <> 'lost' LIMIT 1",
            LEAD_COLUMNS
        ))
            .bind(cpf)
            .fetch_optional(&self.pool)
            .await?;

        Ok(lead)
    }

    async fn find_active_by_email(&self, email: &str) -> Result<Option<Lead>, AppError> {
        let lead = sqlx::query_as::<_, Lead>(&format!(
            r#"
            SELECT {} FROM leads
            WHERE lower(email) = lower($1) AND status <> 'lost'
            ORDER BY created_at ASC
            LIMIT 1
            "#,
            LEAD_COLUMNS
        ))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(lead)
    }

    async fn find_by_key(&self, key: &IdentityKey) -> Result<Option<Lead>, AppError> {
        let (condition, value) = match key {
            IdentityKey::Cpf(cpf) => ("cpf = $1", cpf),
            IdentityKey::Email(email) => ("lower(email) = lower($1)", email),
        };

        // Ativos primeiro ('lost' por último), depois o mais antigo
        let lead = sqlx::query_as::<_, Lead>(&format!(
            r#"
            SELECT {} FROM leads
            WHERE {}
            ORDER BY (status = 'lost') ASC, created_at ASC
            LIMIT 1
            "#,
            LEAD_COLUMNS, condition
        ))
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        Ok(lead)
    }

    async fn insert_lead(&self, lead: &NewLead) -> Result<Lead, AppError> {
        let created = sqlx::query_as::<_, Lead>(&format!(
            r#"
            INSERT INTO leads (
                full_name, email, phone, cpf, status,
                source, first_activity_type, first_activity_name
            )
            VALUES ($1, $2, $3, $4, 'new', $5, $6, $7)
            RETURNING {}
            "#,
            LEAD_COLUMNS
        ))
            .bind(&lead.full_name)
            .bind(&lead.email)
            .bind(&lead.phone)
            .bind(&lead.cpf)
            .bind(&lead.source)
            .bind(&lead.first_activity_type)
            .bind(&lead.first_activity_name)
            .fetch_one(&self.pool)
            .await
            .map_err(map_insert_error)?;

        Ok(created)
    }

    async fn backfill_lead(&self, id: Uuid, patch: &LeadPatch) -> Result<Lead, AppError> {
        // COALESCE garante que um campo preenchido nunca é sobrescrito,
        // mesmo que outro pedido tenha preenchido no meio tempo
        let lead = sqlx::query_as::<_, Lead>(&format!(
            r#"
            UPDATE leads SET
                full_name = COALESCE(full_name, $2),
                email = COALESCE(email, $3),
                phone = COALESCE(phone, $4),
                cpf = COALESCE(cpf, $5),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            LEAD_COLUMNS
        ))
            .bind(id)
            .bind(&patch.full_name)
            .bind(&patch.email)
            .bind(&patch.phone)
            .bind(&patch.cpf)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_insert_error)?
            .ok_or(AppError::LeadNotFound)?;

        Ok(lead)
    }

    async fn update_status(&self, id: Uuid, status: LeadStatus) -> Result<Lead, AppError> {
        let lead = sqlx::query_as::<_, Lead>(&format!(
            "UPDATE leads SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            LEAD_COLUMNS
        ))
            .bind(id)
            .bind(status)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_insert_error)?
            .ok_or(AppError::LeadNotFound)?;

        Ok(lead)
    }

    async fn mark_converted(&self, id: Uuid, user_id: Option<Uuid>, at: DateTime<Utc>) -> Result<Lead, AppError> {
        let lead = sqlx::query_as::<_, Lead>(&format!(
            r#"
            UPDATE leads SET
                status = 'converted',
                converted_user_id = COALESCE(converted_user_id, $2),
                converted_at = COALESCE(converted_at, $3),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            LEAD_COLUMNS
        ))
            .bind(id)
            .bind(user_id)
            .bind(at)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_insert_error)?
            .ok_or(AppError::LeadNotFound)?;

        Ok(lead)
    }

    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>, AppError> {
        let search_term = filter.search.as_ref().map(|q| format!("%{}%", q));

        let leads = sqlx::query_as::<_, Lead>(&format!(
            r#"
            SELECT {} FROM leads
            WHERE ($1::lead_status IS NULL OR status = $1)
            AND (
                $2::text IS NULL
                OR full_name ILIKE $2
                OR email ILIKE $2
                OR cpf ILIKE $2
            )
            ORDER BY created_at DESC
            LIMIT $3
            "#,
            LEAD_COLUMNS
        ))
            .bind(filter.status)
            .bind(search_term)
            .bind(filter.limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(leads)
    }

    async fn record_warning(&self, warning: &NewWarning) -> Result<ConsistencyWarning, AppError> {
        let recorded = sqlx::query_as::<_, ConsistencyWarning>(
            r#"
            INSERT INTO crm_consistency_warnings (kind, lead_id, other_lead_id, details)
            VALUES ($1, $2, $3, $4)
            RETURNING id, kind, lead_id, other_lead_id, details, created_at, resolved_at
            "#,
        )
            .bind(warning.kind)
            .bind(warning.lead_id)
            .bind(warning.other_lead_id)
            .bind(&warning.details)
            .fetch_one(&self.pool)
            .await?;

        Ok(recorded)
    }

    async fn list_warnings(&self, open_only: bool) -> Result<Vec<ConsistencyWarning>, AppError> {
        let warnings = sqlx::query_as::<_, ConsistencyWarning>(
            r#"
            SELECT id, kind, lead_id, other_lead_id, details, created_at, resolved_at
            FROM crm_consistency_warnings
            WHERE NOT $1 OR resolved_at IS NULL
            ORDER BY created_at DESC
            "#,
        )
            .bind(open_only)
            .fetch_all(&self.pool)
            .await?;

        Ok(warnings)
    }
}
