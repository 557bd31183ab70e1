// src/handlers/pipeline.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::i18n::Locale,
    models::pipeline::{
        Board, Deal, DealMetadata, DealMove, DropTarget, NewStage, OpenDealRequest, PipelineStage,
        PipelineWithStages, StageKind,
    },
};

fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() {
        return Err(ValidationError::new("invalid_value"));
    }
    Ok(())
}

// =============================================================================
//  ÁREA 1: FUNIS E ETAPAS
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StagePayload {
    #[validate(length(min = 1, max = 80, message = "required"))]
    #[schema(example = "Em Negociação")]
    pub name: String,

    #[schema(example = "#F59E0B")]
    pub color: Option<String>,

    // Sem valor, vale a posição (penúltima = ganho, última = perdido)
    pub kind: Option<StageKind>,
}

impl From<&StagePayload> for NewStage {
    fn from(p: &StagePayload) -> Self {
        NewStage { name: p.name.trim().to_string(), color: p.color.clone(), kind: p.kind }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePipelinePayload {
    #[validate(length(min = 1, max = 120, message = "required"))]
    #[schema(example = "Funil de Cursos")]
    pub name: String,

    #[serde(default)]
    pub is_default: bool,

    #[validate(nested)]
    #[serde(default)]
    pub stages: Vec<StagePayload>,
}

// POST /api/crm/pipelines
#[utoipa::path(
    post,
    path = "/api/crm/pipelines",
    tag = "Funil",
    request_body = CreatePipelinePayload,
    responses(
        (status = 201, description = "Funil criado com suas etapas", body = PipelineWithStages),
        (status = 400, description = "Dados inválidos"),
        (status = 409, description = "Já existe um funil padrão")
    )
)]
pub async fn create_pipeline(
    State(app_state): State<AppState>,
    locale: Locale,
    Json(payload): Json<CreatePipelinePayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let stages: Vec<NewStage> = payload.stages.iter().map(NewStage::from).collect();
    let pipeline = app_state
        .pipeline_service
        .create_pipeline(&payload.name, payload.is_default, &stages)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(pipeline)))
}

// GET /api/crm/pipelines
#[utoipa::path(
    get,
    path = "/api/crm/pipelines",
    tag = "Funil",
    responses(
        (status = 200, description = "Funis com etapas em ordem", body = Vec<PipelineWithStages>)
    )
)]
pub async fn list_pipelines(
    State(app_state): State<AppState>,
    locale: Locale,
) -> Result<impl IntoResponse, ApiError> {
    let service = &app_state.pipeline_service;

    // Primeira visita ao Kanban já encontra o funil padrão
    service
        .ensure_default_pipeline()
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let pipelines = service
        .list_pipelines()
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(pipelines)))
}

// POST /api/crm/pipelines/{id}/stages
#[utoipa::path(
    post,
    path = "/api/crm/pipelines/{id}/stages",
    tag = "Funil",
    request_body = StagePayload,
    params(("id" = Uuid, Path, description = "ID do Funil")),
    responses(
        (status = 201, description = "Etapa adicionada ao final do funil", body = PipelineStage),
        (status = 404, description = "Funil não encontrado")
    )
)]
pub async fn add_stage(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(pipeline_id): Path<Uuid>,
    Json(payload): Json<StagePayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let stage = app_state
        .pipeline_service
        .add_stage(pipeline_id, &NewStage::from(&payload))
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(stage)))
}

// GET /api/crm/pipelines/{id}/board
#[utoipa::path(
    get,
    path = "/api/crm/pipelines/{id}/board",
    tag = "Funil",
    params(("id" = Uuid, Path, description = "ID do Funil")),
    responses(
        (status = 200, description = "Colunas do Kanban com negócios e totais", body = Board),
        (status = 404, description = "Funil não encontrado")
    )
)]
pub async fn get_board(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(pipeline_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let board = app_state
        .pipeline_service
        .board(pipeline_id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(board)))
}

// =============================================================================
//  ÁREA 2: NEGÓCIOS
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpenDealPayload {
    pub lead_id: Uuid,
    pub user_id: Option<Uuid>,

    #[validate(length(min = 1, message = "required"))]
    #[schema(example = "curso-lideranca")]
    pub product_id: String,

    #[validate(length(max = 200, message = "too_long"))]
    pub title: Option<String>,

    #[validate(custom(function = "non_negative"))]
    #[schema(example = "120.00")]
    pub value: Decimal,

    #[schema(example = "MARIA-7F3A")]
    pub referral_code: Option<String>,

    #[serde(default)]
    pub metadata: DealMetadata,
}

// POST /api/crm/deals
#[utoipa::path(
    post,
    path = "/api/crm/deals",
    tag = "Funil",
    request_body = OpenDealPayload,
    responses(
        (status = 200, description = "Negócio aberto (existente atualizado ou novo)", body = Deal),
        (status = 404, description = "Lead não encontrado")
    )
)]
pub async fn open_deal(
    State(app_state): State<AppState>,
    locale: Locale,
    Json(payload): Json<OpenDealPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let request = OpenDealRequest {
        lead_id: payload.lead_id,
        user_id: payload.user_id,
        product_id: payload.product_id,
        title: payload.title,
        value: payload.value,
        referral_code: payload.referral_code,
        metadata: payload.metadata,
    };

    let deal = app_state
        .pipeline_service
        .find_or_create_open_deal(&request)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(deal)))
}

// GET /api/crm/deals/{id}
#[utoipa::path(
    get,
    path = "/api/crm/deals/{id}",
    tag = "Funil",
    params(("id" = Uuid, Path, description = "ID do Negócio")),
    responses(
        (status = 200, description = "Negócio", body = Deal),
        (status = 404, description = "Negócio não encontrado")
    )
)]
pub async fn get_deal(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let deal = app_state
        .pipeline_service
        .get_deal(id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(deal)))
}

// DELETE /api/crm/deals/{id}
#[utoipa::path(
    delete,
    path = "/api/crm/deals/{id}",
    tag = "Funil",
    params(("id" = Uuid, Path, description = "ID do Negócio")),
    responses(
        (status = 204, description = "Negócio removido (o lead continua)"),
        (status = 404, description = "Negócio não encontrado")
    )
)]
pub async fn delete_deal(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    app_state
        .pipeline_service
        .delete_deal(id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok(StatusCode::NO_CONTENT)
}

// POST /api/crm/deals/{id}/move
#[utoipa::path(
    post,
    path = "/api/crm/deals/{id}/move",
    tag = "Funil",
    request_body = DropTarget,
    params(("id" = Uuid, Path, description = "ID do Negócio")),
    responses(
        (status = 200, description = "Negócio movido", body = DealMove),
        (status = 404, description = "Negócio ou etapa não encontrados"),
        (status = 409, description = "Negócio já encerrado")
    )
)]
pub async fn move_deal(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(id): Path<Uuid>,
    Json(target): Json<DropTarget>,
) -> Result<impl IntoResponse, ApiError> {
    let moved = app_state
        .pipeline_service
        .advance(id, target)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(moved)))
}
