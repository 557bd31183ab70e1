// src/models/pipeline.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::common::error::AppError;

// --- ENUMS ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "stage_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Normal,
    Won,
    Lost,
}

impl StageKind {
    /// Convenção posicional: com mais de duas etapas, a penúltima é "ganho"
    /// e a última é "perdido".
    pub fn by_position(index: usize, stage_count: usize) -> StageKind {
        if stage_count > 2 && index + 2 == stage_count {
            StageKind::Won
        } else if stage_count > 2 && index + 1 == stage_count {
            StageKind::Lost
        } else {
            StageKind::Normal
        }
    }
}

// --- CONFIGURAÇÃO ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    pub id: Uuid,
    #[schema(example = "Funil de Vendas")]
    pub name: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStage {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    #[schema(example = "Em Negociação")]
    pub name: String,
    #[schema(example = "#FF5733")]
    pub color: Option<String>,
    // Contígua e única dentro do funil, começando em 0
    #[schema(example = 1)]
    pub position: i32,
    // Quando preenchido, vale mais que a convenção posicional
    pub kind: Option<StageKind>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewStage {
    pub name: String,
    pub color: Option<String>,
    pub kind: Option<StageKind>,
}

// --- NEGÓCIO ---

/// Metadados do negócio: campos conhecidos + `extra` para o resto.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DealMetadata {
    // Ausentes ficam fora do JSON; o merge `metadata || $4` preserva o gravado
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installments: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_interaction_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub user_id: Option<Uuid>,

    #[schema(example = "Curso de Liderança - Maria da Silva")]
    pub title: String,
    #[schema(example = "120.00")]
    pub value: Decimal,

    pub pipeline_id: Uuid,
    pub stage_id: Uuid,

    pub product_id: Option<String>,
    #[schema(example = "MARIA10")]
    pub referral_code: Option<String>,

    // None = em andamento; Some(true) ganho; Some(false) perdido
    pub won: Option<bool>,
    pub closed_at: Option<DateTime<Utc>>,

    #[sqlx(json)]
    pub metadata: DealMetadata,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deal {
    pub fn is_closed(&self) -> bool {
        self.won.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct NewDeal {
    pub lead_id: Uuid,
    pub user_id: Option<Uuid>,
    pub title: String,
    pub value: Decimal,
    pub pipeline_id: Uuid,
    pub stage_id: Uuid,
    pub product_id: Option<String>,
    pub referral_code: Option<String>,
    pub metadata: DealMetadata,
}

/// Pedido de "buscar ou criar" o negócio aberto de um lead para um produto.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpenDealRequest {
    pub lead_id: Uuid,
    pub user_id: Option<Uuid>,
    #[schema(example = "curso-lideranca")]
    pub product_id: String,
    pub title: Option<String>,
    #[schema(example = "120.00")]
    pub value: Decimal,
    pub referral_code: Option<String>,
    #[serde(default)]
    pub metadata: DealMetadata,
}

// --- KANBAN ---

/// Onde o card foi solto: direto na coluna, ou perto de outro card.
#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DropTarget {
    Column {
        #[serde(rename = "stageId")]
        stage_id: Uuid,
    },
    Card {
        #[serde(rename = "dealId")]
        deal_id: Uuid,
    },
}

/// Resultado calculado de uma movimentação (aplicado de uma vez no banco).
#[derive(Debug, Clone, PartialEq)]
pub struct StageTransition {
    pub stage_id: Uuid,
    pub won: Option<bool>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Tipo efetivo de cada etapa (explícito ou posicional). `stages` deve vir
/// ordenado por posição.
pub fn effective_kind(stages: &[PipelineStage], stage_id: Uuid) -> Option<StageKind> {
    let index = stages.iter().position(|s| s.id == stage_id)?;
    Some(stages[index].kind.unwrap_or_else(|| StageKind::by_position(index, stages.len())))
}

/// Regra do arrastar-e-soltar. Negócio encerrado não se move; etapa fora do
/// funil do negócio é NotFound. Nada é alterado quando há erro.
pub fn plan_transition(
    deal: &Deal,
    stages: &[PipelineStage],
    target_stage_id: Uuid,
    now: DateTime<Utc>,
) -> Result<StageTransition, AppError> {
    if deal.is_closed() {
        return Err(AppError::DealAlreadyClosed);
    }

    let in_pipeline: Vec<PipelineStage> = stages
        .iter()
        .filter(|s| s.pipeline_id == deal.pipeline_id)
        .cloned()
        .collect();

    let kind = effective_kind(&in_pipeline, target_stage_id).ok_or(AppError::StageNotFound)?;

    let (won, closed_at) = match kind {
        StageKind::Won => (Some(true), Some(now)),
        StageKind::Lost => (Some(false), Some(now)),
        StageKind::Normal => (None, None),
    };

    Ok(StageTransition { stage_id: target_stage_id, won, closed_at })
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineWithStages {
    #[serde(flatten)]
    pub pipeline: Pipeline,
    pub stages: Vec<PipelineStage>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BoardColumn {
    pub stage: PipelineStage,
    pub kind: StageKind,
    pub total_value: Decimal,
    pub deals: Vec<Deal>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub pipeline: Pipeline,
    pub columns: Vec<BoardColumn>,
}

/// Resultado do `advance`: o negócio atualizado e, quando ele acabou de
/// encerrar, o desfecho.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DealMove {
    pub deal: Deal,
    pub closed_now: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stages(pipeline_id: Uuid, n: usize) -> Vec<PipelineStage> {
        (0..n)
            .map(|i| PipelineStage {
                id: Uuid::new_v4(),
                pipeline_id,
                name: format!("Etapa {}", i),
                color: None,
                position: i as i32,
                kind: None,
                created_at: Utc::now(),
            })
            .collect()
    }

    fn open_deal(pipeline_id: Uuid, stage_id: Uuid) -> Deal {
        let now = Utc::now();
        Deal {
            id: Uuid::new_v4(),
            lead_id: Uuid::new_v4(),
            user_id: None,
            title: "Negócio".into(),
            value: Decimal::new(12000, 2),
            pipeline_id,
            stage_id,
            product_id: Some("produto".into()),
            referral_code: None,
            won: None,
            closed_at: None,
            metadata: DealMetadata::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn positional_convention() {
        assert_eq!(StageKind::by_position(0, 4), StageKind::Normal);
        assert_eq!(StageKind::by_position(2, 4), StageKind::Won);
        assert_eq!(StageKind::by_position(3, 4), StageKind::Lost);
        // Até duas etapas, nada é terminal
        assert_eq!(StageKind::by_position(1, 2), StageKind::Normal);
        assert_eq!(StageKind::by_position(0, 1), StageKind::Normal);
    }

    #[test]
    fn second_to_last_wins_and_last_loses() {
        let pipeline_id = Uuid::new_v4();
        let st = stages(pipeline_id, 4);
        let deal = open_deal(pipeline_id, st[0].id);
        let now = Utc::now();

        let won = plan_transition(&deal, &st, st[2].id, now).unwrap();
        assert_eq!(won.won, Some(true));
        assert_eq!(won.closed_at, Some(now));

        let lost = plan_transition(&deal, &st, st[3].id, now).unwrap();
        assert_eq!(lost.won, Some(false));
        assert!(lost.closed_at.is_some());

        let normal = plan_transition(&deal, &st, st[1].id, now).unwrap();
        assert_eq!(normal.won, None);
        assert_eq!(normal.closed_at, None);
    }

    #[test]
    fn explicit_kind_overrides_position() {
        let pipeline_id = Uuid::new_v4();
        let mut st = stages(pipeline_id, 4);
        st[1].kind = Some(StageKind::Won);
        st[2].kind = Some(StageKind::Normal);
        let deal = open_deal(pipeline_id, st[0].id);

        assert_eq!(plan_transition(&deal, &st, st[1].id, Utc::now()).unwrap().won, Some(true));
        assert_eq!(plan_transition(&deal, &st, st[2].id, Utc::now()).unwrap().won, None);
    }

    #[test]
    fn closed_deal_cannot_move() {
        let pipeline_id = Uuid::new_v4();
        let st = stages(pipeline_id, 4);
        let mut deal = open_deal(pipeline_id, st[2].id);
        deal.won = Some(true);

        let err = plan_transition(&deal, &st, st[0].id, Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::DealAlreadyClosed));
    }

    #[test]
    fn stage_from_other_pipeline_is_not_found() {
        let pipeline_id = Uuid::new_v4();
        let st = stages(pipeline_id, 4);
        let other = stages(Uuid::new_v4(), 3);
        let deal = open_deal(pipeline_id, st[0].id);

        let mut all = st.clone();
        all.extend(other.iter().cloned());
        let err = plan_transition(&deal, &all, other[0].id, Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::StageNotFound));
        let err = plan_transition(&deal, &st, Uuid::new_v4(), Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::StageNotFound));
    }

    #[test]
    fn drop_target_payloads() {
        let column: DropTarget =
            serde_json::from_str(r#"{"type":"column","stageId":"550e8400-e29b-41d4-a716-446655440000"}"#).unwrap();
        assert!(matches!(column, DropTarget::Column { .. }));
        let card: DropTarget =
            serde_json::from_str(r#"{"type":"card","dealId":"550e8400-e29b-41d4-a716-446655440001"}"#).unwrap();
        assert!(matches!(card, DropTarget::Card { .. }));
    }

    #[test]
    fn deal_metadata_omits_missing_fields() {
        let metadata = DealMetadata { installments: Some(3), ..Default::default() };
        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value, serde_json::json!({ "installments": 3 }));

        let value = serde_json::to_value(DealMetadata::default()).unwrap();
        assert_eq!(value, serde_json::json!({}));
    }
}
