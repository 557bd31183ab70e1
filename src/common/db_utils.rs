// src/common/db_utils.rs

use crate::common::error::AppError;

// Índices únicos parciais criados nas migrations
pub const LEADS_CPF_INDEX: &str = "idx_leads_active_cpf";
pub const LEADS_EMAIL_INDEX: &str = "idx_leads_active_email";
pub const DEALS_OPEN_INDEX: &str = "idx_deals_open_per_product";

/// Devolve o nome da constraint quando o erro é uma violação de unicidade.
pub(crate) fn unique_violation(err: &sqlx::Error) -> Option<String> {
    if let sqlx::Error::Database(db_err) = err {
        if db_err.is_unique_violation() {
            return Some(db_err.constraint().unwrap_or("unknown").to_string());
        }
    }
    None
}

/// Converte um sqlx::Error em AppError, separando as colisões de identidade
/// (que o resolvedor trata como "refazer a busca") das demais duplicidades.
pub(crate) fn map_insert_error(err: sqlx::Error) -> AppError {
    match unique_violation(&err) {
        Some(constraint) => match constraint.as_str() {
            LEADS_CPF_INDEX | LEADS_EMAIL_INDEX | DEALS_OPEN_INDEX => AppError::DuplicateIdentity(constraint),
            _ => AppError::UniqueConstraintViolation(constraint),
        },
        None => err.into(),
    }
}
