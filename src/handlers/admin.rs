// src/handlers/admin.rs

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    common::error::ApiError,
    config::AppState,
    middleware::i18n::Locale,
    models::outbox::DispatchReport,
};

const DEFAULT_BATCH: i64 = 50;

#[derive(Debug, Deserialize, IntoParams)]
pub struct DispatchQuery {
    /// Máximo de mensagens nesta rodada (1..=500)
    pub limit: Option<i64>,
}

// POST /api/admin/outbox/dispatch
#[utoipa::path(
    post,
    path = "/api/admin/outbox/dispatch",
    tag = "Admin",
    params(DispatchQuery),
    responses(
        (status = 200, description = "Resultado da rodada de envio", body = DispatchReport)
    )
)]
pub async fn dispatch_outbox(
    State(app_state): State<AppState>,
    locale: Locale,
    Query(query): Query<DispatchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_BATCH).clamp(1, 500);

    let report = app_state
        .outbox_service
        .dispatch_pending(limit)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(report)))
}
