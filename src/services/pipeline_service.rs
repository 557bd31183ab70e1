// src/services/pipeline_service.rs

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{lead_repo::LeadStore, pipeline_repo::PipelineStore},
    models::{
        interaction::{InteractionChannel, InteractionInput, InteractionMetadata, InteractionType},
        pipeline::{
            effective_kind, plan_transition, Board, BoardColumn, Deal, DealMove, DropTarget, NewDeal, NewStage,
            OpenDealRequest, PipelineStage, PipelineWithStages, StageKind,
        },
    },
    services::{interaction_service::InteractionService, referral_service::ReferralService},
};

pub const DEFAULT_PIPELINE_NAME: &str = "Funil de Vendas";
const DEFAULT_STAGES: [(&str, &str); 4] = [
    ("Novo", "#64748B"),
    ("Em Negociação", "#F59E0B"),
    ("Ganho", "#10B981"),
    ("Perdido", "#EF4444"),
];

#[derive(Clone)]
pub struct PipelineService {
    pipelines: Arc<dyn PipelineStore>,
    leads: Arc<dyn LeadStore>,
    interactions: InteractionService,
    referrals: ReferralService,
}

impl PipelineService {
    pub fn new(
        pipelines: Arc<dyn PipelineStore>,
        leads: Arc<dyn LeadStore>,
        interactions: InteractionService,
        referrals: ReferralService,
    ) -> Self {
        Self { pipelines, leads, interactions, referrals }
    }

    // =========================================================================
    //  1. FUNIS E ETAPAS
    // =========================================================================

    /// Cria o "Funil de Vendas" padrão na primeira vez.
    pub async fn ensure_default_pipeline(&self) -> Result<PipelineWithStages, AppError> {
        if let Some(pipeline) = self.pipelines.find_default_pipeline().await? {
            let stages = self.pipelines.list_stages(pipeline.id).await?;
            return Ok(PipelineWithStages { pipeline, stages });
        }

        let stages: Vec<NewStage> = DEFAULT_STAGES
            .iter()
            .map(|(name, color)| NewStage { name: name.to_string(), color: Some(color.to_string()), kind: None })
            .collect();

        match self.pipelines.create_pipeline(DEFAULT_PIPELINE_NAME, true, &stages).await {
            Ok(created) => {
                tracing::info!(pipeline_id = %created.pipeline.id, "🌱 Funil padrão criado");
                Ok(created)
            }
            // Outro pedido criou o padrão ao mesmo tempo
            Err(AppError::UniqueConstraintViolation(_)) => {
                let pipeline = self.pipelines.find_default_pipeline().await?.ok_or(AppError::PipelineNotFound)?;
                let stages = self.pipelines.list_stages(pipeline.id).await?;
                Ok(PipelineWithStages { pipeline, stages })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn create_pipeline(
        &self,
        name: &str,
        is_default: bool,
        stages: &[NewStage],
    ) -> Result<PipelineWithStages, AppError> {
        self.pipelines.create_pipeline(name.trim(), is_default, stages).await
    }

    pub async fn add_stage(&self, pipeline_id: Uuid, stage: &NewStage) -> Result<PipelineStage, AppError> {
        self.pipelines.find_pipeline(pipeline_id).await?.ok_or(AppError::PipelineNotFound)?;
        self.pipelines.append_stage(pipeline_id, stage).await
    }

    pub async fn list_pipelines(&self) -> Result<Vec<PipelineWithStages>, AppError> {
        let pipelines = self.pipelines.list_pipelines().await?;
        let mut result = Vec::with_capacity(pipelines.len());
        for pipeline in pipelines {
            let stages = self.pipelines.list_stages(pipeline.id).await?;
            result.push(PipelineWithStages { pipeline, stages });
        }
        Ok(result)
    }

    /// Visão Kanban: cada etapa com seus negócios e o valor somado.
    pub async fn board(&self, pipeline_id: Uuid) -> Result<Board, AppError> {
        let pipeline = self.pipelines.find_pipeline(pipeline_id).await?.ok_or(AppError::PipelineNotFound)?;
        let stages = self.pipelines.list_stages(pipeline_id).await?;
        let deals = self.pipelines.list_deals(pipeline_id).await?;

        let columns = stages
            .iter()
            .map(|stage| {
                let column_deals: Vec<Deal> = deals.iter().filter(|d| d.stage_id == stage.id).cloned().collect();
                BoardColumn {
                    stage: stage.clone(),
                    kind: effective_kind(&stages, stage.id).unwrap_or(StageKind::Normal),
                    total_value: column_deals.iter().map(|d| d.value).sum::<Decimal>(),
                    deals: column_deals,
                }
            })
            .collect();

        Ok(Board { pipeline, columns })
    }

    // =========================================================================
    //  2. NEGÓCIOS
    // =========================================================================

    pub async fn get_deal(&self, id: Uuid) -> Result<Deal, AppError> {
        self.pipelines.find_deal(id).await?.ok_or(AppError::DealNotFound)
    }

    /// Remove só o negócio; o lead continua.
    pub async fn delete_deal(&self, id: Uuid) -> Result<(), AppError> {
        if !self.pipelines.delete_deal(id).await? {
            return Err(AppError::DealNotFound);
        }
        tracing::info!(deal_id = %id, "Negócio removido");
        Ok(())
    }

    /// Um negócio aberto por (lead, produto): atualiza o existente ou cria
    /// na primeira etapa do funil padrão.
    pub async fn find_or_create_open_deal(&self, request: &OpenDealRequest) -> Result<Deal, AppError> {
        let lead = self.leads.find_by_id(request.lead_id).await?.ok_or(AppError::LeadNotFound)?;

        if let Some(deal) = self.refresh_existing(request).await? {
            return Ok(deal);
        }

        let pipeline = self.ensure_default_pipeline().await?;
        let first_stage = pipeline.stages.first().ok_or(AppError::StageNotFound)?;

        let contact = lead.full_name.as_deref().or(lead.email.as_deref()).unwrap_or("Lead");
        let draft = NewDeal {
            lead_id: lead.id,
            user_id: request.user_id.or(lead.converted_user_id),
            title: request
                .title
                .clone()
                .unwrap_or_else(|| format!("{} - {}", request.product_id, contact)),
            value: request.value,
            pipeline_id: pipeline.pipeline.id,
            stage_id: first_stage.id,
            product_id: Some(request.product_id.clone()),
            referral_code: request.referral_code.clone(),
            metadata: request.metadata.clone(),
        };

        match self.pipelines.insert_deal(&draft).await {
            Ok(deal) => {
                tracing::info!(deal_id = %deal.id, lead_id = %lead.id, product = %request.product_id, "Negócio aberto");
                Ok(deal)
            }
            // Pedido duplicado abriu o mesmo negócio: usa o dele
            Err(AppError::DuplicateIdentity(_)) => {
                self.refresh_existing(request).await?.ok_or(AppError::DealNotFound)
            }
            Err(e) => Err(e),
        }
    }

    async fn refresh_existing(&self, request: &OpenDealRequest) -> Result<Option<Deal>, AppError> {
        let Some(existing) = self.pipelines.find_open_deal(request.lead_id, &request.product_id).await? else {
            return Ok(None);
        };
        self.pipelines
            .refresh_open_deal(existing.id, request.value, request.referral_code.as_deref(), &request.metadata)
            .await
    }

    /// Arrastar-e-soltar no Kanban.
    pub async fn advance(&self, deal_id: Uuid, target: DropTarget) -> Result<DealMove, AppError> {
        let deal = self.get_deal(deal_id).await?;

        let target_stage_id = match target {
            DropTarget::Column { stage_id } => stage_id,
            DropTarget::Card { deal_id: other } => self.get_deal(other).await?.stage_id,
        };

        self.move_to_stage(deal, target_stage_id).await
    }

    /// Leva o negócio para a etapa de ganho do seu funil (confirmação de
    /// pagamento). Repetir sobre um negócio já ganho não faz nada.
    pub async fn close_as_won(&self, deal_id: Uuid) -> Result<DealMove, AppError> {
        let deal = self.get_deal(deal_id).await?;
        if deal.won == Some(true) {
            return Ok(DealMove { deal, closed_now: false });
        }

        let stages = self.pipelines.list_stages(deal.pipeline_id).await?;
        let won_stage = stages
            .iter()
            .find(|s| effective_kind(&stages, s.id) == Some(StageKind::Won))
            .ok_or(AppError::StageNotFound)?;

        self.move_to_stage(deal, won_stage.id).await
    }

    async fn move_to_stage(&self, deal: Deal, target_stage_id: Uuid) -> Result<DealMove, AppError> {
        let stages = self.pipelines.list_stages(deal.pipeline_id).await?;
        let transition = plan_transition(&deal, &stages, target_stage_id, Utc::now())?;

        // None aqui = outro pedido encerrou o negócio no meio tempo
        let updated = self
            .pipelines
            .apply_transition(deal.id, &transition)
            .await?
            .ok_or(AppError::DealAlreadyClosed)?;

        let closed_now = updated.is_closed();
        if closed_now {
            tracing::info!(deal_id = %updated.id, won = ?updated.won, "Negócio encerrado");
            self.on_deal_closed(&updated).await;
        }

        Ok(DealMove { deal: updated, closed_now })
    }

    /// Efeitos de encerrar um negócio. Tudo best-effort: a movimentação já
    /// foi gravada e não volta atrás.
    async fn on_deal_closed(&self, deal: &Deal) {
        let won = deal.won == Some(true);

        let lead = match self.leads.find_by_id(deal.lead_id).await {
            Ok(lead) => lead,
            Err(e) => {
                tracing::warn!(deal_id = %deal.id, "Falha ao buscar lead do negócio: {:?}", e);
                None
            }
        };

        if let Some(lead) = &lead {
            let input = InteractionInput {
                interaction_type: if won { InteractionType::DealWon } else { InteractionType::DealLost },
                channel: InteractionChannel::Admin,
                description: Some(deal.title.clone()),
                metadata: InteractionMetadata::Deal { deal_id: deal.id, stage_id: deal.stage_id, value: deal.value },
            };
            self.interactions.record_best_effort(lead, deal.user_id, input).await;
        }

        if !won {
            return;
        }

        if lead.is_some() {
            if let Err(e) = self.leads.mark_converted(deal.lead_id, deal.user_id, Utc::now()).await {
                tracing::warn!(deal_id = %deal.id, "Falha ao converter lead do negócio ganho: {:?}", e);
            }
        }

        if let Some(code) = deal.referral_code.as_deref() {
            if let Err(e) = self.referrals.attribute_conversion(deal.id, code).await {
                tracing::warn!(deal_id = %deal.id, code, "Falha ao atribuir indicação: {:?}", e);
            }
        }
    }
}
