// src/models/interaction.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{types::Json, FromRow};
use utoipa::ToSchema;
use uuid::Uuid;

// --- ENUMS ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "interaction_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InteractionType {
    EventRegistration,
    ProductPurchaseStarted,
    ProductPurchaseCompleted,
    Donation,
    Click,
    AccountCreated,
    DealWon,
    DealLost,
    Note,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionType::EventRegistration => "event_registration",
            InteractionType::ProductPurchaseStarted => "product_purchase_started",
            InteractionType::ProductPurchaseCompleted => "product_purchase_completed",
            InteractionType::Donation => "donation",
            InteractionType::Click => "click",
            InteractionType::AccountCreated => "account_created",
            InteractionType::DealWon => "deal_won",
            InteractionType::DealLost => "deal_lost",
            InteractionType::Note => "note",
        }
    }

    /// Marcos que contam como conversão na jornada.
    pub fn is_conversion_milestone(&self) -> bool {
        matches!(self, InteractionType::AccountCreated | InteractionType::DealWon)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "interaction_channel", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InteractionChannel {
    Website,
    Event,
    Checkout,
    Referral,
    Admin,
    Webhook,
}

// --- METADADOS TIPADOS ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Utm {
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_content: Option<String>,
}

/// Metadados por tipo de interação. Formatos desconhecidos (registros
/// antigos ou de outros sistemas) caem em `Opaque` sem perder o conteúdo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InteractionMetadata {
    EventRegistration {
        event_id: String,
        event_title: String,
        price: Decimal,
        is_free: bool,
    },
    Purchase {
        product_id: String,
        product_name: String,
        amount: Decimal,
        installments: u32,
        deal_id: Option<Uuid>,
        charge_id: Option<String>,
    },
    Donation {
        donation_id: String,
        amount: Decimal,
        campaign: Option<String>,
    },
    Click {
        referral_code: String,
        utm: Utm,
    },
    Deal {
        deal_id: Uuid,
        stage_id: Uuid,
        value: Decimal,
    },
    Opaque {
        data: Value,
    },
    None,
}

impl InteractionMetadata {
    pub fn from_json(value: Value) -> Self {
        if value.is_null() {
            return InteractionMetadata::None;
        }
        serde_json::from_value(value.clone()).unwrap_or(InteractionMetadata::Opaque { data: value })
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Valor monetário carregado pelo metadado, quando houver.
    pub fn amount(&self) -> Option<Decimal> {
        match self {
            InteractionMetadata::EventRegistration { price, .. } => Some(*price),
            InteractionMetadata::Purchase { amount, .. } => Some(*amount),
            InteractionMetadata::Donation { amount, .. } => Some(*amount),
            InteractionMetadata::Deal { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Nome legível para a linha do tempo.
    pub fn display_name(&self) -> Option<&str> {
        match self {
            InteractionMetadata::EventRegistration { event_title, .. } => Some(event_title),
            InteractionMetadata::Purchase { product_name, .. } => Some(product_name),
            InteractionMetadata::Donation { campaign, .. } => campaign.as_deref(),
            InteractionMetadata::Click { referral_code, .. } => Some(referral_code),
            _ => None,
        }
    }
}

// --- INTERAÇÃO (append-only) ---

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    pub id: Uuid,
    // Nulo quando a resolução de identidade falhou (reconciliável depois)
    pub lead_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub cpf: Option<String>,
    pub email: Option<String>,

    pub interaction_type: InteractionType,
    pub channel: InteractionChannel,
    pub description: Option<String>,
    pub metadata: InteractionMetadata,

    pub created_at: DateTime<Utc>,
}

// Linha crua do banco; o JSONB vira InteractionMetadata na conversão
#[derive(Debug, FromRow)]
pub struct InteractionRow {
    pub id: Uuid,
    pub lead_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub cpf: Option<String>,
    pub email: Option<String>,
    pub interaction_type: InteractionType,
    pub channel: InteractionChannel,
    pub description: Option<String>,
    pub metadata: Json<Value>,
    pub created_at: DateTime<Utc>,
}

impl From<InteractionRow> for Interaction {
    fn from(row: InteractionRow) -> Self {
        Self {
            id: row.id,
            lead_id: row.lead_id,
            user_id: row.user_id,
            cpf: row.cpf,
            email: row.email,
            interaction_type: row.interaction_type,
            channel: row.channel,
            description: row.description,
            metadata: InteractionMetadata::from_json(row.metadata.0),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InteractionInput {
    pub interaction_type: InteractionType,
    pub channel: InteractionChannel,
    pub description: Option<String>,
    pub metadata: InteractionMetadata,
}

/// O que de fato vai para o banco: entrada + chaves de identidade resolvidas.
#[derive(Debug, Clone)]
pub struct NewInteraction {
    pub lead_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub cpf: Option<String>,
    pub email: Option<String>,
    pub interaction_type: InteractionType,
    pub channel: InteractionChannel,
    pub description: Option<String>,
    pub metadata: InteractionMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_metadata_shape_is_kept_as_opaque() {
        let raw = json!({ "kind": "newsletter_open", "campaignId": 42 });
        match InteractionMetadata::from_json(raw.clone()) {
            InteractionMetadata::Opaque { data } => assert_eq!(data, raw),
            other => panic!("esperava Opaque, veio {:?}", other),
        }
    }

    #[test]
    fn known_shape_is_parsed() {
        let raw = json!({
            "kind": "event_registration",
            "event_id": "evt-1",
            "event_title": "Meetup de Associados",
            "price": 0,
            "is_free": true
        });
        let meta = InteractionMetadata::from_json(raw);
        assert_eq!(meta.display_name(), Some("Meetup de Associados"));
        assert_eq!(meta.amount(), Some(Decimal::ZERO));
    }

    #[test]
    fn null_metadata_is_none() {
        assert_eq!(InteractionMetadata::from_json(Value::Null), InteractionMetadata::None);
    }
}
