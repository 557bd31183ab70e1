// src/db/pipeline_repo.rs

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use crate::{
    common::{db_utils::map_insert_error, error::AppError},
    models::pipeline::{Deal, DealMetadata, NewDeal, NewStage, Pipeline, PipelineStage, PipelineWithStages, StageTransition},
};

#[async_trait]
pub trait PipelineStore: Send + Sync {
    // --- Funis e etapas ---
    async fn list_pipelines(&self) -> Result<Vec<Pipeline>, AppError>;

    async fn find_pipeline(&self, id: Uuid) -> Result<Option<Pipeline>, AppError>;

    async fn find_default_pipeline(&self) -> Result<Option<Pipeline>, AppError>;

    /// Cria o funil com as etapas nas posições 0..n, tudo ou nada.
    async fn create_pipeline(&self, name: &str, is_default: bool, stages: &[NewStage]) -> Result<PipelineWithStages, AppError>;

    /// Etapas do funil ordenadas por posição.
    async fn list_stages(&self, pipeline_id: Uuid) -> Result<Vec<PipelineStage>, AppError>;

    async fn find_stage(&self, id: Uuid) -> Result<Option<PipelineStage>, AppError>;

    /// Acrescenta a etapa no fim (posição = maior + 1).
    async fn append_stage(&self, pipeline_id: Uuid, stage: &NewStage) -> Result<PipelineStage, AppError>;

    // --- Negócios ---
    async fn list_deals(&self, pipeline_id: Uuid) -> Result<Vec<Deal>, AppError>;

    async fn find_deal(&self, id: Uuid) -> Result<Option<Deal>, AppError>;

    async fn find_open_deal(&self, lead_id: Uuid, product_id: &str) -> Result<Option<Deal>, AppError>;

    /// Falha com DuplicateIdentity se já existir negócio aberto (lead, produto).
    async fn insert_deal(&self, deal: &NewDeal) -> Result<Deal, AppError>;

    /// Atualiza valor/metadados de um negócio ainda aberto; indicação só
    /// entra se estava vazia.
    async fn refresh_open_deal(
        &self,
        id: Uuid,
        value: Decimal,
        referral_code: Option<&str>,
        metadata: &DealMetadata,
    ) -> Result<Option<Deal>, AppError>;

    /// Aplica a transição só se o negócio ainda estiver aberto.
    /// None = não existe ou já foi encerrado por outro pedido.
    async fn apply_transition(&self, deal_id: Uuid, transition: &StageTransition) -> Result<Option<Deal>, AppError>;

    async fn delete_deal(&self, id: Uuid) -> Result<bool, AppError>;
}

const DEAL_COLUMNS: &str = r#"
    id, lead_id, user_id, title, value, pipeline_id, stage_id,
    product_id, referral_code, won, closed_at, metadata, created_at, updated_at
"#;

const STAGE_COLUMNS: &str = "id, pipeline_id, name, color, position, kind, created_at";

#[derive(Clone)]
pub struct PipelineRepository {
    pool: PgPool,
}

impl PipelineRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PipelineStore for PipelineRepository {
    async fn list_pipelines(&self) -> Result<Vec<Pipeline>, AppError> {
        let pipelines = sqlx::query_as::<_, Pipeline>(
            "SELECT id, name, is_default, created_at, updated_at FROM pipelines ORDER BY is_default DESC, created_at ASC",
        )
            .fetch_all(&self.pool)
            .await?;

        Ok(pipelines)
    }

    async fn find_pipeline(&self, id: Uuid) -> Result<Option<Pipeline>, AppError> {
        let pipeline = sqlx::query_as::<_, Pipeline>(
            "SELECT id, name, is_default, created_at, updated_at FROM pipelines WHERE id = $1",
        )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(pipeline)
    }

    async fn find_default_pipeline(&self) -> Result<Option<Pipeline>, AppError> {
        let pipeline = sqlx::query_as::<_, Pipeline>(
            r#"
            SELECT id, name, is_default, created_at, updated_at
            FROM pipelines
            WHERE is_default = TRUE
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
            .fetch_optional(&self.pool)
            .await?;

        Ok(pipeline)
    }

    async fn create_pipeline(&self, name: &str, is_default: bool, stages: &[NewStage]) -> Result<PipelineWithStages, AppError> {
        let mut tx = self.pool.begin().await?;

        let pipeline = sqlx::query_as::<_, Pipeline>(
            r#"
            INSERT INTO pipelines (name, is_default)
            VALUES ($1, $2)
            RETURNING id, name, is_default, created_at, updated_at
            "#,
        )
            .bind(name)
            .bind(is_default)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_insert_error)?;

        let mut created = Vec::with_capacity(stages.len());
        for (position, stage) in stages.iter().enumerate() {
            let row = sqlx::query_as::<_, PipelineStage>(&format!(
                r#"
                INSERT INTO pipeline_stages (pipeline_id, name, color, position, kind)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING {}
                "#,
                STAGE_COLUMNS
            ))
                .bind(pipeline.id)
                .bind(&stage.name)
                .bind(&stage.color)
                .bind(position as i32)
                .bind(stage.kind)
                .fetch_one(&mut *tx)
                .await?;
            created.push(row);
        }

        tx.commit().await?;

        Ok(PipelineWithStages { pipeline, stages: created })
    }

    async fn list_stages(&self, pipeline_id: Uuid) -> Result<Vec<PipelineStage>, AppError> {
        let stages = sqlx::query_as::<_, PipelineStage>(&format!(
            "SELECT {} FROM pipeline_stages WHERE pipeline_id = $1 ORDER BY position ASC",
            STAGE_COLUMNS
        ))
            .bind(pipeline_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(stages)
    }

    async fn find_stage(&self, id: Uuid) -> Result<Option<PipelineStage>, AppError> {
        let stage = sqlx::query_as::<_, PipelineStage>(&format!(
            "SELECT {} FROM pipeline_stages WHERE id = $1",
            STAGE_COLUMNS
        ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(stage)
    }

    async fn append_stage(&self, pipeline_id: Uuid, stage: &NewStage) -> Result<PipelineStage, AppError> {
        // O UNIQUE (pipeline_id, position) segura duas inserções simultâneas
        let created = sqlx::query_as::<_, PipelineStage>(&format!(
            r#"
            INSERT INTO pipeline_stages (pipeline_id, name, color, position, kind)
            VALUES (
                $1, $2, $3,
                (SELECT COALESCE(MAX(position) + 1, 0) FROM pipeline_stages WHERE pipeline_id = $1),
                $4
            )
            RETURNING {}
            "#,
            STAGE_COLUMNS
        ))
            .bind(pipeline_id)
            .bind(&stage.name)
            .bind(&stage.color)
            .bind(stage.kind)
            .fetch_one(&self.pool)
            .await
            .map_err(map_insert_error)?;

        Ok(created)
    }

    async fn list_deals(&self, pipeline_id: Uuid) -> Result<Vec<Deal>, AppError> {
        let deals = sqlx::query_as::<_, Deal>(&format!(
            "SELECT {} FROM deals WHERE pipeline_id = $1 ORDER BY created_at ASC",
            DEAL_COLUMNS
        ))
            .bind(pipeline_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(deals)
    }

    async fn find_deal(&self, id: Uuid) -> Result<Option<Deal>, AppError> {
        let deal = sqlx::query_as::<_, Deal>(&format!("SELECT {} FROM deals WHERE id = $1", DEAL_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(deal)
    }

    async fn find_open_deal(&self, lead_id: Uuid, product_id: &str) -> Result<Option<Deal>, AppError> {
        let deal = sqlx::query_as::<_, Deal>(&format!(
            "SELECT {} FROM deals WHERE lead_id = $1 AND product_id = $2 AND won IS NULL LIMIT 1",
            DEAL_COLUMNS
        ))
            .bind(lead_id)
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(deal)
    }

    async fn insert_deal(&self, deal: &NewDeal) -> Result<Deal, AppError> {
        let created = sqlx::query_as::<_, Deal>(&format!(
            r#"
            INSERT INTO deals (
                lead_id, user_id, title, value, pipeline_id, stage_id,
                product_id, referral_code, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            DEAL_COLUMNS
        ))
            .bind(deal.lead_id)
            .bind(deal.user_id)
            .bind(&deal.title)
            .bind(deal.value)
            .bind(deal.pipeline_id)
            .bind(deal.stage_id)
            .bind(&deal.product_id)
            .bind(&deal.referral_code)
            .bind(Json(&deal.metadata))
            .fetch_one(&self.pool)
            .await
            .map_err(map_insert_error)?;

        Ok(created)
    }

    async fn refresh_open_deal(
        &self,
        id: Uuid,
        value: Decimal,
        referral_code: Option<&str>,
        metadata: &DealMetadata,
    ) -> Result<Option<Deal>, AppError> {
        let deal = sqlx::query_as::<_, Deal>(&format!(
            r#"
            UPDATE deals SET
                value = $2,
                referral_code = COALESCE(referral_code, $3),
                metadata = metadata || $4,
                updated_at = NOW()
            WHERE id = $1 AND won IS NULL
            RETURNING {}
            "#,
            DEAL_COLUMNS
        ))
            .bind(id)
            .bind(value)
            .bind(referral_code)
            .bind(Json(metadata))
            .fetch_optional(&self.pool)
            .await?;

        Ok(deal)
    }

    async fn apply_transition(&self, deal_id: Uuid, transition: &StageTransition) -> Result<Option<Deal>, AppError> {
        let deal = sqlx::query_as::<_, Deal>(&format!(
            r#"
            UPDATE deals SET
                stage_id = $2,
                won = $3,
                closed_at = $4,
                updated_at = NOW()
            WHERE id = $1 AND won IS NULL
            RETURNING {}
            "#,
            DEAL_COLUMNS
        ))
            .bind(deal_id)
            .bind(transition.stage_id)
            .bind(transition.won)
            .bind(transition.closed_at)
            .fetch_optional(&self.pool)
            .await?;

        Ok(deal)
    }

    async fn delete_deal(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM deals WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
