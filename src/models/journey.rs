// src/models/journey.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::lead::{IdentityKey, Lead};

// --- FONTES (tabelas de outros módulos, só leitura) ---

// Inscrição em evento, gravada pelo módulo de eventos
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventRegistrationRecord {
    pub id: Uuid,
    pub event_id: String,
    pub event_title: String,
    pub cpf: Option<String>,
    pub email: Option<String>,
    pub is_online: bool,
    pub is_paid: bool,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DonationRecord {
    pub id: Uuid,
    // Identificador externo (o mesmo citado no metadado da interação)
    pub donation_ref: String,
    pub cpf: Option<String>,
    pub email: Option<String>,
    pub amount: Decimal,
    pub is_paid: bool,
    pub campaign: Option<String>,
    pub created_at: DateTime<Utc>,
}

// Conta de usuário (módulo de autenticação)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub id: Uuid,
    pub cpf: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

// --- LINHA DO TEMPO ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActivitySource {
    Interaction,
    EventRegistration,
    Donation,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub source: ActivitySource,
    #[schema(example = "event_registration")]
    pub activity_type: String,
    pub name: String,
    pub date: DateTime<Utc>,
    pub paid: bool,
    pub online: bool,
    pub value: Decimal,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Journey {
    pub identity: IdentityKey,
    pub lead: Option<Lead>,
    pub user_id: Option<Uuid>,

    pub activities: Vec<Activity>,

    pub first_contact_date: Option<DateTime<Utc>>,
    pub is_converted: bool,
    pub conversion_date: Option<DateTime<Utc>>,
    pub days_to_conversion: Option<i64>,

    pub total_value_paid: Decimal,
    pub total_activities: usize,
    pub events_count: usize,
    pub donations_count: usize,
    pub purchases_count: usize,
}
