// src/handlers/touchpoints.rs
//
// Entradas públicas. Quem chama aqui é o site (inscrição, checkout, doação,
// cadastro) e o gateway de pagamento.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use validator::Validate;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::i18n::Locale,
    models::touchpoint::{
        DonationTouchpoint, EventRegistrationTouchpoint, PaymentWebhook, PurchaseTouchpoint, SignupTouchpoint,
        TouchpointOutcome, WebhookAck,
    },
};

// POST /api/touchpoints/event-registrations
#[utoipa::path(
    post,
    path = "/api/touchpoints/event-registrations",
    tag = "Pontos de Contato",
    request_body = EventRegistrationTouchpoint,
    responses(
        (status = 201, description = "Inscrição registrada no CRM", body = TouchpointOutcome),
        (status = 400, description = "Dados inválidos")
    )
)]
pub async fn register_for_event(
    State(app_state): State<AppState>,
    locale: Locale,
    Json(payload): Json<EventRegistrationTouchpoint>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let outcome = app_state
        .touchpoint_service
        .register_for_event(&payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(outcome)))
}

// POST /api/touchpoints/purchases
#[utoipa::path(
    post,
    path = "/api/touchpoints/purchases",
    tag = "Pontos de Contato",
    request_body = PurchaseTouchpoint,
    responses(
        (status = 201, description = "Checkout iniciado", body = TouchpointOutcome),
        (status = 400, description = "Dados inválidos ou parcelas acima do permitido")
    )
)]
pub async fn start_purchase(
    State(app_state): State<AppState>,
    locale: Locale,
    Json(payload): Json<PurchaseTouchpoint>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let outcome = app_state
        .touchpoint_service
        .start_purchase(&payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(outcome)))
}

// POST /api/touchpoints/donations
#[utoipa::path(
    post,
    path = "/api/touchpoints/donations",
    tag = "Pontos de Contato",
    request_body = DonationTouchpoint,
    responses(
        (status = 201, description = "Doação registrada no CRM", body = TouchpointOutcome),
        (status = 400, description = "Dados inválidos")
    )
)]
pub async fn record_donation(
    State(app_state): State<AppState>,
    locale: Locale,
    Json(payload): Json<DonationTouchpoint>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let outcome = app_state
        .touchpoint_service
        .record_donation(&payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(outcome)))
}

// POST /api/touchpoints/signups
#[utoipa::path(
    post,
    path = "/api/touchpoints/signups",
    tag = "Pontos de Contato",
    request_body = SignupTouchpoint,
    responses(
        (status = 201, description = "Conta ligada aos leads", body = TouchpointOutcome),
        (status = 400, description = "Dados inválidos")
    )
)]
pub async fn signup(
    State(app_state): State<AppState>,
    locale: Locale,
    Json(payload): Json<SignupTouchpoint>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let outcome = app_state
        .touchpoint_service
        .signup(&payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(outcome)))
}

// POST /api/webhooks/payments
#[utoipa::path(
    post,
    path = "/api/webhooks/payments",
    tag = "Pontos de Contato",
    request_body = PaymentWebhook,
    responses(
        (status = 200, description = "Evento recebido", body = WebhookAck),
        (status = 500, description = "Falha interna; o gateway deve reenviar")
    )
)]
pub async fn payment_webhook(
    State(app_state): State<AppState>,
    locale: Locale,
    Json(webhook): Json<PaymentWebhook>,
) -> Result<impl IntoResponse, ApiError> {
    let ack = app_state
        .touchpoint_service
        .handle_payment_webhook(&webhook)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(ack)))
}
