// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::common::i18n::I18nStore;
use crate::middleware::i18n::Locale;

// Erro interno do domínio. Os handlers convertem para ApiError (com idioma).
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    // Nenhum de CPF, e-mail ou telefone foi informado
    #[error("Identidade ausente: informe CPF, e-mail ou telefone")]
    MissingIdentity,

    #[error("CPF inválido: {0}")]
    InvalidCpf(String),

    #[error("Número de parcelas inválido (máximo {max})")]
    InvalidInstallments { max: u32 },

    #[error("Período inválido")]
    InvalidPeriod,

    #[error("Lead não encontrado")]
    LeadNotFound,

    #[error("Negócio não encontrado")]
    DealNotFound,

    #[error("Etapa não encontrada")]
    StageNotFound,

    #[error("Funil não encontrado")]
    PipelineNotFound,

    #[error("Embaixador não encontrado")]
    AmbassadorNotFound,

    #[error("Repasse não encontrado")]
    PayoutNotFound,

    #[error("Embaixador inativo")]
    AmbassadorInactive,

    // Negócio já ganho ou perdido: não aceita mais movimentação
    #[error("Negócio já encerrado")]
    DealAlreadyClosed,

    #[error("Negócio ainda não foi ganho")]
    DealNotWon,

    #[error("Transição de status do lead inválida: {from} -> {to}")]
    InvalidLeadTransition { from: String, to: String },

    #[error("Transição de status do repasse inválida: {from} -> {to}")]
    InvalidPayoutTransition { from: String, to: String },

    #[error("Repasse já pago não pode ser alterado")]
    PayoutImmutable,

    #[error("Nenhuma comissão elegível no período")]
    EmptyPayout,

    // Violação dos índices únicos de identidade (cpf / e-mail) ou de negócio aberto
    #[error("Identidade duplicada: {0}")]
    DuplicateIdentity(String),

    #[error("Registro duplicado: {0}")]
    UniqueConstraintViolation(String),

    // Gateway de pagamento / e-mail fora do ar
    #[error("Falha no colaborador externo: {0}")]
    CollaboratorFailure(String),

    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),
}

impl AppError {
    /// Erros causados pela entrada do usuário. Os fluxos públicos
    /// (inscrição, compra) só deixam estes subir; o resto é engolido e logado.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::ValidationError(_)
                | AppError::MissingIdentity
                | AppError::InvalidCpf(_)
                | AppError::InvalidInstallments { .. }
        )
    }

    pub fn to_api_error(&self, locale: &Locale, i18n: &I18nStore) -> ApiError {
        let lang = locale.0.as_str();

        let (status, key, details) = match self {
            AppError::ValidationError(errors) => {
                let mut details = serde_json::Map::new();
                for (field, field_errors) in errors.field_errors() {
                    let codes: Vec<Value> = field_errors
                        .iter()
                        .map(|e| {
                            let code = e.message.as_ref().map(|m| m.to_string()).unwrap_or_else(|| e.code.to_string());
                            Value::String(i18n.translate(lang, &format!("validation.{}", code)))
                        })
                        .collect();
                    details.insert(field.to_string(), Value::Array(codes));
                }
                (StatusCode::BAD_REQUEST, "errors.validation", Some(Value::Object(details)))
            }
            AppError::MissingIdentity => (StatusCode::BAD_REQUEST, "errors.identity_missing", None),
            AppError::InvalidCpf(cpf) => (
                StatusCode::BAD_REQUEST,
                "errors.invalid_cpf",
                Some(json!({ "cpf": cpf })),
            ),
            AppError::InvalidInstallments { max } => (
                StatusCode::BAD_REQUEST,
                "errors.invalid_installments",
                Some(json!({ "maxInstallments": max })),
            ),
            AppError::InvalidPeriod => (StatusCode::BAD_REQUEST, "errors.invalid_period", None),

            AppError::LeadNotFound => (StatusCode::NOT_FOUND, "errors.lead_not_found", None),
            AppError::DealNotFound => (StatusCode::NOT_FOUND, "errors.deal_not_found", None),
            AppError::StageNotFound => (StatusCode::NOT_FOUND, "errors.stage_not_found", None),
            AppError::PipelineNotFound => (StatusCode::NOT_FOUND, "errors.pipeline_not_found", None),
            AppError::AmbassadorNotFound => (StatusCode::NOT_FOUND, "errors.ambassador_not_found", None),
            AppError::PayoutNotFound => (StatusCode::NOT_FOUND, "errors.payout_not_found", None),

            AppError::AmbassadorInactive => (StatusCode::CONFLICT, "errors.ambassador_inactive", None),
            AppError::DealAlreadyClosed => (StatusCode::CONFLICT, "errors.deal_already_closed", None),
            AppError::DealNotWon => (StatusCode::CONFLICT, "errors.deal_not_won", None),
            AppError::InvalidLeadTransition { from, to } => (
                StatusCode::CONFLICT,
                "errors.invalid_lead_transition",
                Some(json!({ "from": from, "to": to })),
            ),
            AppError::InvalidPayoutTransition { from, to } => (
                StatusCode::CONFLICT,
                "errors.invalid_payout_transition",
                Some(json!({ "from": from, "to": to })),
            ),
            AppError::PayoutImmutable => (StatusCode::CONFLICT, "errors.payout_immutable", None),
            AppError::EmptyPayout => (StatusCode::UNPROCESSABLE_ENTITY, "errors.empty_payout", None),
            AppError::DuplicateIdentity(key) | AppError::UniqueConstraintViolation(key) => (
                StatusCode::CONFLICT,
                "errors.duplicate",
                Some(json!({ "key": key })),
            ),
            AppError::CollaboratorFailure(reason) => {
                tracing::warn!("Colaborador externo indisponível: {}", reason);
                (StatusCode::BAD_GATEWAY, "errors.collaborator", None)
            }

            // DatabaseError e InternalServerError viram 500 genérico
            e => {
                tracing::error!("Erro Interno do Servidor: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "errors.internal", None)
            }
        };

        ApiError {
            status,
            error: i18n.translate(lang, key),
            details,
        }
    }
}

// O erro que efetivamente sai na resposta HTTP
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub details: Option<Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.details {
            Some(details) => json!({ "error": self.error, "details": details }),
            None => json!({ "error": self.error }),
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_the_input_ones() {
        assert!(AppError::MissingIdentity.is_client_error());
        assert!(AppError::InvalidInstallments { max: 6 }.is_client_error());
        assert!(!AppError::DealNotFound.is_client_error());
        assert!(!AppError::CollaboratorFailure("timeout".into()).is_client_error());
    }

    #[test]
    fn not_found_maps_to_404_in_portuguese() {
        let i18n = I18nStore::load().unwrap();
        let api = AppError::StageNotFound.to_api_error(&Locale("pt".into()), &i18n);
        assert_eq!(api.status, StatusCode::NOT_FOUND);
        assert_eq!(api.error, "Etapa não encontrada.");
    }

    #[test]
    fn internal_errors_hide_details() {
        let i18n = I18nStore::load().unwrap();
        let err = AppError::InternalServerError(anyhow::anyhow!("pool closed"));
        let api = err.to_api_error(&Locale("en".into()), &i18n);
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(api.details.is_none());
        assert!(!api.error.contains("pool"));
    }
}
