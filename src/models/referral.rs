// src/models/referral.rs

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Enums (Mapeando o Postgres) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "payment_preference", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentPreference {
    Pix,
    BankTransfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "payout_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,   // Calculado, aguardando conferência
    Confirmed, // Conferido
    Paid,      // Pago (imutável)
    Cancelled, // Cancelado, comissões voltam a ficar livres
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Confirmed => "confirmed",
            PayoutStatus::Paid => "paid",
            PayoutStatus::Cancelled => "cancelled",
        }
    }

    /// pending -> confirmed -> paid, ou pending -> cancelled. Sem pular etapas.
    pub fn can_transition_to(&self, next: PayoutStatus) -> bool {
        matches!(
            (self, next),
            (PayoutStatus::Pending, PayoutStatus::Confirmed)
                | (PayoutStatus::Pending, PayoutStatus::Cancelled)
                | (PayoutStatus::Confirmed, PayoutStatus::Paid)
        )
    }
}

/// Comissão = valor da venda * taxa / 100, arredondada em centavos
/// (meio para cima).
pub fn commission_for(sale_amount: Decimal, commission_rate: Decimal) -> Decimal {
    (sale_amount * commission_rate / Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

// --- Structs ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Ambassador {
    pub id: Uuid,

    #[schema(example = "MARIA-3F2A")]
    pub code: String,
    #[schema(example = "Maria da Silva")]
    pub name: String,
    pub email: Option<String>,

    // Percentual (10 = 10%)
    #[schema(example = "10")]
    pub commission_rate: Decimal,

    pub total_clicks: i64,
    pub total_conversions: i64,
    #[schema(example = "350.50")]
    pub total_earnings: Decimal,

    pub payment_preference: PaymentPreference,
    pub pix_key: Option<String>,
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAmbassador {
    pub code: String,
    pub name: String,
    pub email: Option<String>,
    pub commission_rate: Decimal,
    pub payment_preference: PaymentPreference,
    pub pix_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReferralClick {
    pub id: Uuid,
    pub ambassador_id: Uuid,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_content: Option<String>,
    pub landing_page: Option<String>,
    pub referrer: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClickAttribution {
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_content: Option<String>,
    pub landing_page: Option<String>,
    pub referrer: Option<String>,
}

// Uma venda indicada e a comissão correspondente (uma por negócio)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Commission {
    pub id: Uuid,
    pub ambassador_id: Uuid,
    pub deal_id: Uuid,
    #[schema(example = "250.50")]
    pub sale_amount: Decimal,
    pub commission_rate: Decimal,
    #[schema(example = "25.05")]
    pub commission_amount: Decimal,
    pub payout_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCommission {
    pub ambassador_id: Uuid,
    pub deal_id: Uuid,
    pub sale_amount: Decimal,
    pub commission_rate: Decimal,
    pub commission_amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Payout {
    pub id: Uuid,
    pub ambassador_id: Uuid,

    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,

    pub sales_count: i32,
    #[schema(example = "350.50")]
    pub gross_amount: Decimal,
    #[schema(example = "35.05")]
    pub net_amount: Decimal,

    pub status: PayoutStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub notified_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayout {
    pub ambassador_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub sales_count: i32,
    pub gross_amount: Decimal,
    pub net_amount: Decimal,
}

impl NewPayout {
    /// Soma as comissões: bruto = vendas, líquido = comissões.
    pub fn from_commissions(
        ambassador_id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        commissions: &[Commission],
    ) -> Self {
        let (gross_amount, net_amount) = commissions.iter().fold(
            (Decimal::ZERO, Decimal::ZERO),
            |(gross, net), c| (gross + c.sale_amount, net + c.commission_amount),
        );

        Self {
            ambassador_id,
            period_start,
            period_end,
            sales_count: commissions.len() as i32,
            gross_amount,
            net_amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commission_rounds_half_up_to_cents() {
        assert_eq!(commission_for(Decimal::new(10000, 2), Decimal::from(10)), Decimal::new(1000, 2));
        assert_eq!(commission_for(Decimal::new(25050, 2), Decimal::from(10)), Decimal::new(2505, 2));
        // 0.125 -> 0.13
        assert_eq!(commission_for(Decimal::new(125, 2), Decimal::from(10)), Decimal::new(13, 2));
        // 33.33 * 7.5% = 2.49975 -> 2.50
        assert_eq!(commission_for(Decimal::new(3333, 2), Decimal::new(75, 1)), Decimal::new(250, 2));
    }

    #[test]
    fn payout_status_never_skips() {
        use PayoutStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Paid));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Paid));
        assert!(!Confirmed.can_transition_to(Cancelled));
        assert!(!Paid.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
    }

    #[test]
    fn payout_totals_from_commissions() {
        let ambassador_id = Uuid::new_v4();
        let commission = |sale: Decimal| Commission {
            id: Uuid::new_v4(),
            ambassador_id,
            deal_id: Uuid::new_v4(),
            sale_amount: sale,
            commission_rate: Decimal::from(10),
            commission_amount: commission_for(sale, Decimal::from(10)),
            payout_id: None,
            created_at: Utc::now(),
        };
        let list = vec![commission(Decimal::new(10000, 2)), commission(Decimal::new(25050, 2))];

        let payout = NewPayout::from_commissions(ambassador_id, Utc::now(), Utc::now(), &list);
        assert_eq!(payout.sales_count, 2);
        assert_eq!(payout.gross_amount, Decimal::new(35050, 2));
        assert_eq!(payout.net_amount, Decimal::new(3505, 2));
    }
}
