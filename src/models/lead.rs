// src/models/lead.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::common::{
    documents::{non_blank, normalize_cpf, normalize_email, normalize_phone},
    error::AppError,
};

// --- ENUMS ---

// Mapeia o CREATE TYPE lead_status do banco
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "lead_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Converted,
    Lost,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Converted => "converted",
            LeadStatus::Lost => "lost",
        }
    }

    /// "converted" é final; "new" só existe na criação.
    pub fn can_transition_to(&self, next: LeadStatus) -> bool {
        if *self == next {
            return true;
        }
        match (self, next) {
            (LeadStatus::Converted, _) => false,
            (_, LeadStatus::New) => false,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "warning_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    // CPF aponta para um lead, e-mail para outro
    MultiIdentityMismatch,
    DuplicateLeadSuspected,
}

// --- LEAD ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: Uuid,

    #[schema(example = "Maria da Silva")]
    pub full_name: Option<String>,
    #[schema(example = "maria@email.com")]
    pub email: Option<String>,
    #[schema(example = "11999998888")]
    pub phone: Option<String>,
    #[schema(example = "52998224725")]
    pub cpf: Option<String>,

    pub status: LeadStatus,

    #[schema(example = "event_registration")]
    pub source: Option<String>,
    pub first_activity_type: Option<String>,
    pub first_activity_name: Option<String>,

    pub converted_user_id: Option<Uuid>,
    pub converted_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- ENTRADA DO RESOLVEDOR ---

/// Os dados de contato que chegam de um ponto de contato (formulário,
/// compra, indicação). Tudo opcional; a normalização decide o que vale.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IdentityCandidate {
    #[schema(example = "529.982.247-25")]
    pub cpf: Option<String>,
    #[schema(example = "maria@email.com")]
    pub email: Option<String>,
    #[schema(example = "(11) 99999-8888")]
    pub phone: Option<String>,
    #[schema(example = "Maria da Silva")]
    pub full_name: Option<String>,

    pub source: Option<String>,
    pub first_activity_type: Option<String>,
    pub first_activity_name: Option<String>,
}

/// Candidato já normalizado: CPF só com dígitos e validado, e-mail em minúsculas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedCandidate {
    pub cpf: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub full_name: Option<String>,
    pub source: Option<String>,
    pub first_activity_type: Option<String>,
    pub first_activity_name: Option<String>,
}

impl IdentityCandidate {
    pub fn normalize(&self) -> Result<NormalizedCandidate, AppError> {
        let cpf = non_blank(self.cpf.as_deref()).map(normalize_cpf).transpose()?;
        let email = non_blank(self.email.as_deref()).and_then(normalize_email);
        let phone = non_blank(self.phone.as_deref()).and_then(normalize_phone);

        if cpf.is_none() && email.is_none() && phone.is_none() {
            return Err(AppError::MissingIdentity);
        }

        Ok(NormalizedCandidate {
            cpf,
            email,
            phone,
            full_name: non_blank(self.full_name.as_deref()).map(str::to_string),
            source: non_blank(self.source.as_deref()).map(str::to_string),
            first_activity_type: non_blank(self.first_activity_type.as_deref()).map(str::to_string),
            first_activity_name: non_blank(self.first_activity_name.as_deref()).map(str::to_string),
        })
    }
}

impl NormalizedCandidate {
    /// Campos que o lead ainda não tem e o candidato traz.
    /// Nunca sobrescreve um campo preenchido.
    pub fn backfill_for(&self, lead: &Lead) -> LeadPatch {
        fn missing(current: &Option<String>, incoming: &Option<String>) -> Option<String> {
            match current {
                Some(_) => None,
                None => incoming.clone(),
            }
        }

        LeadPatch {
            full_name: missing(&lead.full_name, &self.full_name),
            email: missing(&lead.email, &self.email),
            phone: missing(&lead.phone, &self.phone),
            cpf: missing(&lead.cpf, &self.cpf),
        }
    }

    pub fn to_new_lead(&self) -> NewLead {
        NewLead {
            full_name: self.full_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            cpf: self.cpf.clone(),
            source: self.source.clone(),
            first_activity_type: self.first_activity_type.clone(),
            first_activity_name: self.first_activity_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewLead {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub cpf: Option<String>,
    pub source: Option<String>,
    pub first_activity_type: Option<String>,
    pub first_activity_name: Option<String>,
}

/// Preenchimento de campos nulos (aplicado com COALESCE no banco).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadPatch {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub cpf: Option<String>,
}

impl LeadPatch {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none() && self.email.is_none() && self.phone.is_none() && self.cpf.is_none()
    }
}

// --- RESULTADO DA RESOLUÇÃO ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchKey {
    Cpf,
    Email,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub lead: Lead,
    pub created: bool,
    pub matched_by: Option<MatchKey>,
    pub backfilled: bool,
}

// --- BUSCA POR CHAVE (Jornada) ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum IdentityKey {
    Cpf(String),
    Email(String),
}

impl IdentityKey {
    pub fn cpf(raw: &str) -> Result<Self, AppError> {
        Ok(IdentityKey::Cpf(normalize_cpf(raw)?))
    }

    pub fn email(raw: &str) -> Result<Self, AppError> {
        normalize_email(raw).map(IdentityKey::Email).ok_or(AppError::MissingIdentity)
    }

    pub fn matches(&self, cpf: Option<&str>, email: Option<&str>) -> bool {
        match self {
            IdentityKey::Cpf(key) => cpf == Some(key.as_str()),
            IdentityKey::Email(key) => email.is_some_and(|e| e.eq_ignore_ascii_case(key)),
        }
    }
}

// --- AVISOS DE CONSISTÊNCIA ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyWarning {
    pub id: Uuid,
    pub kind: WarningKind,
    pub lead_id: Uuid,
    pub other_lead_id: Option<Uuid>,
    pub details: String,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewWarning {
    pub kind: WarningKind,
    pub lead_id: Uuid,
    pub other_lead_id: Option<Uuid>,
    pub details: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead_with(email: Option<&str>, phone: Option<&str>) -> Lead {
        let now = Utc::now();
        Lead {
            id: Uuid::new_v4(),
            full_name: None,
            email: email.map(str::to_string),
            phone: phone.map(str::to_string),
            cpf: Some("52998224725".into()),
            status: LeadStatus::New,
            source: None,
            first_activity_type: None,
            first_activity_name: None,
            converted_user_id: None,
            converted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn normalize_requires_some_identity() {
        let candidate = IdentityCandidate {
            full_name: Some("Sem Contato".into()),
            email: Some("   ".into()),
            ..Default::default()
        };
        assert!(matches!(candidate.normalize(), Err(AppError::MissingIdentity)));
    }

    #[test]
    fn phone_alone_is_enough_identity() {
        let candidate = IdentityCandidate { phone: Some("(11) 98888-7777".into()), ..Default::default() };
        let normalized = candidate.normalize().unwrap();
        assert_eq!(normalized.phone.as_deref(), Some("11988887777"));
        assert!(normalized.cpf.is_none());
    }

    #[test]
    fn backfill_only_fills_null_fields() {
        let lead = lead_with(Some("antigo@email.com"), None);
        let candidate = IdentityCandidate {
            cpf: Some("529.982.247-25".into()),
            email: Some("novo@email.com".into()),
            phone: Some("11 97777-6666".into()),
            full_name: Some("Maria".into()),
            ..Default::default()
        }
        .normalize()
        .unwrap();

        let patch = candidate.backfill_for(&lead);
        assert_eq!(patch.email, None);
        assert_eq!(patch.cpf, None);
        assert_eq!(patch.phone.as_deref(), Some("11977776666"));
        assert_eq!(patch.full_name.as_deref(), Some("Maria"));
    }

    #[test]
    fn converted_is_final() {
        assert!(!LeadStatus::Converted.can_transition_to(LeadStatus::Lost));
        assert!(LeadStatus::Qualified.can_transition_to(LeadStatus::Converted));
        assert!(!LeadStatus::Contacted.can_transition_to(LeadStatus::New));
        assert!(LeadStatus::Lost.can_transition_to(LeadStatus::Contacted));
    }

    #[test]
    fn identity_key_email_match_ignores_case() {
        let key = IdentityKey::email("Maria@Email.com").unwrap();
        assert!(key.matches(None, Some("MARIA@email.com")));
        assert!(!key.matches(Some("52998224725"), None));
    }
}
