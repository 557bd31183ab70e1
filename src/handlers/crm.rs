// src/handlers/crm.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::i18n::Locale,
    models::{
        interaction::{Interaction, InteractionChannel, InteractionInput, InteractionMetadata, InteractionType},
        journey::Journey,
        lead::{ConsistencyWarning, IdentityCandidate, IdentityKey, Lead, LeadStatus, Resolution},
    },
};

// =============================================================================
//  ÁREA 1: IDENTIDADE E LEADS
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResolveIdentityPayload {
    #[schema(example = "529.982.247-25")]
    pub cpf: Option<String>,

    #[validate(email(message = "invalid_email"))]
    #[schema(example = "maria@email.com")]
    pub email: Option<String>,

    #[schema(example = "(11) 99999-8888")]
    pub phone: Option<String>,

    #[validate(length(max = 200, message = "too_long"))]
    #[schema(example = "Maria da Silva")]
    pub full_name: Option<String>,

    #[schema(example = "event_registration")]
    pub source: Option<String>,
    pub first_activity_type: Option<String>,
    pub first_activity_name: Option<String>,
}

impl From<ResolveIdentityPayload> for IdentityCandidate {
    fn from(p: ResolveIdentityPayload) -> Self {
        IdentityCandidate {
            cpf: p.cpf,
            email: p.email,
            phone: p.phone,
            full_name: p.full_name,
            source: p.source,
            first_activity_type: p.first_activity_type,
            first_activity_name: p.first_activity_name,
        }
    }
}

// POST /api/crm/identity/resolve
#[utoipa::path(
    post,
    path = "/api/crm/identity/resolve",
    tag = "CRM",
    request_body = ResolveIdentityPayload,
    responses(
        (status = 200, description = "Lead existente encontrado (e completado)", body = Resolution),
        (status = 201, description = "Lead novo criado", body = Resolution),
        (status = 400, description = "CPF inválido ou nenhum dado de contato")
    )
)]
pub async fn resolve_identity(
    State(app_state): State<AppState>,
    locale: Locale,
    Json(payload): Json<ResolveIdentityPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let resolution = app_state
        .identity_service
        .resolve(&payload.into())
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let status = if resolution.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(resolution)))
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ListLeadsQuery {
    pub status: Option<LeadStatus>,
    /// Busca por nome, e-mail ou CPF
    pub search: Option<String>,
    pub limit: Option<i64>,
}

// GET /api/crm/leads
#[utoipa::path(
    get,
    path = "/api/crm/leads",
    tag = "CRM",
    params(ListLeadsQuery),
    responses(
        (status = 200, description = "Leads, mais recentes primeiro", body = Vec<Lead>)
    )
)]
pub async fn list_leads(
    State(app_state): State<AppState>,
    locale: Locale,
    Query(query): Query<ListLeadsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let leads = app_state
        .identity_service
        .list_leads(query.status, query.search.as_deref(), query.limit)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(leads)))
}

// GET /api/crm/leads/{id}
#[utoipa::path(
    get,
    path = "/api/crm/leads/{id}",
    tag = "CRM",
    params(("id" = Uuid, Path, description = "ID do Lead")),
    responses(
        (status = 200, description = "Lead", body = Lead),
        (status = 404, description = "Lead não encontrado")
    )
)]
pub async fn get_lead(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let lead = app_state
        .identity_service
        .get_lead(id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(lead)))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLeadStatusPayload {
    pub status: LeadStatus,
    // Conta da plataforma, quando a mudança é para "converted"
    pub user_id: Option<Uuid>,
}

// PATCH /api/crm/leads/{id}/status
#[utoipa::path(
    patch,
    path = "/api/crm/leads/{id}/status",
    tag = "CRM",
    request_body = UpdateLeadStatusPayload,
    params(("id" = Uuid, Path, description = "ID do Lead")),
    responses(
        (status = 200, description = "Status atualizado", body = Lead),
        (status = 404, description = "Lead não encontrado"),
        (status = 409, description = "Transição de status não permitida")
    )
)]
pub async fn update_lead_status(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLeadStatusPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let lead = app_state
        .identity_service
        .update_status(id, payload.status, payload.user_id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(lead)))
}

// =============================================================================
//  ÁREA 2: INTERAÇÕES
// =============================================================================

// GET /api/crm/leads/{id}/interactions
#[utoipa::path(
    get,
    path = "/api/crm/leads/{id}/interactions",
    tag = "CRM",
    params(("id" = Uuid, Path, description = "ID do Lead")),
    responses(
        (status = 200, description = "Histórico do lead, mais recentes primeiro", body = Vec<Interaction>),
        (status = 404, description = "Lead não encontrado")
    )
)]
pub async fn list_interactions(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let interactions = app_state
        .interaction_service
        .list_for_lead(id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(interactions)))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordInteractionPayload {
    #[schema(example = "note")]
    pub interaction_type: InteractionType,
    #[schema(example = "admin")]
    pub channel: InteractionChannel,

    #[validate(length(max = 2000, message = "too_long"))]
    #[schema(example = "Ligou pedindo informações sobre o curso")]
    pub description: Option<String>,

    pub user_id: Option<Uuid>,

    // Formato livre; o que não for reconhecido é guardado como está
    #[schema(value_type = Object)]
    pub metadata: Option<Value>,
}

// POST /api/crm/leads/{id}/interactions
#[utoipa::path(
    post,
    path = "/api/crm/leads/{id}/interactions",
    tag = "CRM",
    request_body = RecordInteractionPayload,
    params(("id" = Uuid, Path, description = "ID do Lead")),
    responses(
        (status = 201, description = "Interação registrada", body = Interaction),
        (status = 404, description = "Lead não encontrado")
    )
)]
pub async fn record_interaction(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(id): Path<Uuid>,
    Json(payload): Json<RecordInteractionPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let lead = app_state
        .identity_service
        .get_lead(id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let input = InteractionInput {
        interaction_type: payload.interaction_type,
        channel: payload.channel,
        description: payload.description,
        metadata: payload.metadata.map(InteractionMetadata::from_json).unwrap_or(InteractionMetadata::None),
    };

    let interaction = app_state
        .interaction_service
        .record(&lead, payload.user_id, input)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(interaction)))
}

// POST /api/crm/interactions/reconcile
#[utoipa::path(
    post,
    path = "/api/crm/interactions/reconcile",
    tag = "CRM",
    responses(
        (status = 200, description = "Quantidade de interações órfãs ligadas a um lead")
    )
)]
pub async fn reconcile_interactions(
    State(app_state): State<AppState>,
    locale: Locale,
) -> Result<impl IntoResponse, ApiError> {
    let attached = app_state
        .interaction_service
        .reconcile_orphans()
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(json!({ "attached": attached }))))
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ListWarningsQuery {
    /// Só os avisos ainda não resolvidos (padrão: true)
    pub open_only: Option<bool>,
}

// GET /api/crm/warnings
#[utoipa::path(
    get,
    path = "/api/crm/warnings",
    tag = "CRM",
    params(ListWarningsQuery),
    responses(
        (status = 200, description = "Avisos de consistência de identidade", body = Vec<ConsistencyWarning>)
    )
)]
pub async fn list_warnings(
    State(app_state): State<AppState>,
    locale: Locale,
    Query(query): Query<ListWarningsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let warnings = app_state
        .identity_service
        .list_warnings(query.open_only.unwrap_or(true))
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(warnings)))
}

// =============================================================================
//  ÁREA 3: JORNADA
// =============================================================================

#[derive(Debug, Deserialize, IntoParams)]
pub struct JourneyQuery {
    pub cpf: Option<String>,
    pub email: Option<String>,
}

impl JourneyQuery {
    // CPF tem precedência quando os dois vêm
    fn key(&self) -> Result<IdentityKey, AppError> {
        match (self.cpf.as_deref(), self.email.as_deref()) {
            (Some(cpf), _) if !cpf.trim().is_empty() => IdentityKey::cpf(cpf),
            (_, Some(email)) => IdentityKey::email(email),
            _ => Err(AppError::MissingIdentity),
        }
    }
}

// GET /api/crm/journey?cpf=...|email=...
#[utoipa::path(
    get,
    path = "/api/crm/journey",
    tag = "CRM",
    params(JourneyQuery),
    responses(
        (status = 200, description = "Linha do tempo e métricas de conversão", body = Journey),
        (status = 400, description = "Nem CPF nem e-mail informados")
    )
)]
pub async fn get_journey(
    State(app_state): State<AppState>,
    locale: Locale,
    Query(query): Query<JourneyQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let key = query.key().map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let journey = app_state
        .journey_service
        .build_journey(key)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(journey)))
}
