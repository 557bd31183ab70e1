// src/handlers/referrals.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::i18n::Locale,
    models::referral::{
        Ambassador, ClickAttribution, Commission, PaymentPreference, Payout, PayoutStatus, ReferralClick,
    },
};

fn valid_rate(rate: &Decimal) -> Result<(), ValidationError> {
    if rate.is_sign_negative() || *rate > Decimal::ONE_HUNDRED {
        return Err(ValidationError::new("invalid_rate"));
    }
    Ok(())
}

// =============================================================================
//  ÁREA 1: EMBAIXADORES
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateAmbassadorPayload {
    #[validate(length(min = 2, max = 120, message = "required"))]
    #[schema(example = "Maria da Silva")]
    pub name: String,

    #[validate(email(message = "invalid_email"))]
    #[schema(example = "maria@email.com")]
    pub email: Option<String>,

    #[validate(custom(function = "valid_rate"))]
    #[schema(example = "10")]
    pub commission_rate: Decimal,

    #[serde(default = "default_preference")]
    pub payment_preference: PaymentPreference,

    pub pix_key: Option<String>,

    // Sem código, um é gerado a partir do primeiro nome
    #[validate(length(min = 3, max = 32, message = "invalid_value"))]
    #[schema(example = "MARIA10")]
    pub code: Option<String>,
}

fn default_preference() -> PaymentPreference {
    PaymentPreference::Pix
}

// POST /api/referrals/ambassadors
#[utoipa::path(
    post,
    path = "/api/referrals/ambassadors",
    tag = "Indicações",
    request_body = CreateAmbassadorPayload,
    responses(
        (status = 201, description = "Embaixador criado", body = Ambassador),
        (status = 400, description = "Dados inválidos"),
        (status = 409, description = "Código já em uso")
    )
)]
pub async fn create_ambassador(
    State(app_state): State<AppState>,
    locale: Locale,
    Json(payload): Json<CreateAmbassadorPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let ambassador = app_state
        .referral_service
        .create_ambassador(
            &payload.name,
            payload.email.as_deref(),
            payload.commission_rate,
            payload.payment_preference,
            payload.pix_key.as_deref(),
            payload.code.as_deref(),
        )
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(ambassador)))
}

// GET /api/referrals/ambassadors
#[utoipa::path(
    get,
    path = "/api/referrals/ambassadors",
    tag = "Indicações",
    responses(
        (status = 200, description = "Embaixadores cadastrados", body = Vec<Ambassador>)
    )
)]
pub async fn list_ambassadors(
    State(app_state): State<AppState>,
    locale: Locale,
) -> Result<impl IntoResponse, ApiError> {
    let ambassadors = app_state
        .referral_service
        .list_ambassadors()
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(ambassadors)))
}

// GET /api/referrals/ambassadors/{id}
#[utoipa::path(
    get,
    path = "/api/referrals/ambassadors/{id}",
    tag = "Indicações",
    params(("id" = String, Path, description = "Código de indicação (sem diferenciar maiúsculas)")),
    responses(
        (status = 200, description = "Embaixador", body = Ambassador),
        (status = 404, description = "Código não encontrado")
    )
)]
pub async fn get_ambassador(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let ambassador = app_state
        .referral_service
        .get_ambassador_by_code(&code)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(ambassador)))
}

// =============================================================================
//  ÁREA 2: CLIQUES E CONVERSÕES
// =============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackClickPayload {
    #[validate(length(min = 1, message = "required"))]
    #[schema(example = "MARIA-3F2A")]
    pub code: String,

    #[serde(flatten)]
    pub attribution: ClickAttribution,
}

// POST /api/referrals/clicks
#[utoipa::path(
    post,
    path = "/api/referrals/clicks",
    tag = "Indicações",
    request_body = TrackClickPayload,
    responses(
        (status = 201, description = "Clique registrado", body = ReferralClick),
        (status = 404, description = "Código não encontrado"),
        (status = 409, description = "Embaixador inativo")
    )
)]
pub async fn track_click(
    State(app_state): State<AppState>,
    locale: Locale,
    Json(payload): Json<TrackClickPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let click = app_state
        .referral_service
        .track_click(&payload.code, &payload.attribution)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(click)))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttributeConversionPayload {
    pub deal_id: Uuid,
    #[validate(length(min = 1, message = "required"))]
    pub code: String,
}

// POST /api/referrals/conversions
#[utoipa::path(
    post,
    path = "/api/referrals/conversions",
    tag = "Indicações",
    request_body = AttributeConversionPayload,
    responses(
        (status = 200, description = "Comissão do negócio (a mesma em chamadas repetidas)", body = Commission),
        (status = 404, description = "Negócio ou código não encontrados"),
        (status = 409, description = "Negócio ainda não ganho")
    )
)]
pub async fn attribute_conversion(
    State(app_state): State<AppState>,
    locale: Locale,
    Json(payload): Json<AttributeConversionPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let commission = app_state
        .referral_service
        .attribute_conversion(payload.deal_id, &payload.code)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(commission)))
}

// =============================================================================
//  ÁREA 3: REPASSES
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComputePayoutPayload {
    #[schema(example = "2024-03-01T00:00:00Z")]
    pub period_start: DateTime<Utc>,
    // Exclusivo
    #[schema(example = "2024-04-01T00:00:00Z")]
    pub period_end: DateTime<Utc>,
}

// POST /api/referrals/ambassadors/{id}/payouts
#[utoipa::path(
    post,
    path = "/api/referrals/ambassadors/{id}/payouts",
    tag = "Indicações",
    request_body = ComputePayoutPayload,
    params(("id" = Uuid, Path, description = "ID do Embaixador")),
    responses(
        (status = 201, description = "Repasse calculado", body = Payout),
        (status = 400, description = "Período inválido"),
        (status = 404, description = "Embaixador não encontrado"),
        (status = 422, description = "Nenhuma comissão livre no período")
    )
)]
pub async fn compute_payout(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(ambassador_id): Path<Uuid>,
    Json(payload): Json<ComputePayoutPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let payout = app_state
        .referral_service
        .compute_payout(ambassador_id, payload.period_start, payload.period_end)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(payout)))
}

// GET /api/referrals/ambassadors/{id}/payouts
#[utoipa::path(
    get,
    path = "/api/referrals/ambassadors/{id}/payouts",
    tag = "Indicações",
    params(("id" = Uuid, Path, description = "ID do Embaixador")),
    responses(
        (status = 200, description = "Repasses do embaixador", body = Vec<Payout>),
        (status = 404, description = "Embaixador não encontrado")
    )
)]
pub async fn list_payouts(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(ambassador_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let payouts = app_state
        .referral_service
        .list_payouts(ambassador_id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(payouts)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PayoutStatusPayload {
    #[schema(example = "confirmed")]
    pub status: PayoutStatus,
}

// PATCH /api/referrals/payouts/{id}/status
#[utoipa::path(
    patch,
    path = "/api/referrals/payouts/{id}/status",
    tag = "Indicações",
    request_body = PayoutStatusPayload,
    params(("id" = Uuid, Path, description = "ID do Repasse")),
    responses(
        (status = 200, description = "Status alterado", body = Payout),
        (status = 404, description = "Repasse não encontrado"),
        (status = 409, description = "Transição não permitida ou repasse já pago")
    )
)]
pub async fn transition_payout(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(payout_id): Path<Uuid>,
    Json(payload): Json<PayoutStatusPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let payout = app_state
        .referral_service
        .transition_payout(payout_id, payload.status)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(payout)))
}
