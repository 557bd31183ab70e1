// src/models/touchpoint.rs
//
// Entradas dos fluxos públicos (inscrição, compra, doação, cadastro, webhook).

use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    lead::{IdentityCandidate, Lead},
    pipeline::Deal,
};

// Valor mínimo de cada parcela e teto de parcelas
pub const MIN_INSTALLMENT_VALUE: i64 = 20;
pub const MAX_INSTALLMENTS: u32 = 12;

/// floor(preço / 20), limitado a 12 e nunca menor que 1.
pub fn max_installments(price: Decimal) -> u32 {
    if price <= Decimal::ZERO {
        return 1;
    }
    (price / Decimal::from(MIN_INSTALLMENT_VALUE))
        .floor()
        .to_u32()
        .unwrap_or(MAX_INSTALLMENTS)
        .clamp(1, MAX_INSTALLMENTS)
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventRegistrationTouchpoint {
    #[schema(example = "Maria da Silva")]
    pub full_name: Option<String>,
    #[validate(email(message = "invalid_email"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub cpf: Option<String>,

    #[validate(length(min = 1, message = "required"))]
    #[schema(example = "evt-2024-encontro")]
    pub event_id: String,
    #[validate(length(min = 1, message = "required"))]
    #[schema(example = "Encontro Anual de Associados")]
    pub event_title: String,
    #[schema(example = "0")]
    pub price: Decimal,
    pub is_free: bool,

    // O fluxo de produto pode pedir um negócio mesmo em evento gratuito
    #[serde(default)]
    pub create_deal: bool,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseTouchpoint {
    pub full_name: Option<String>,
    #[validate(email(message = "invalid_email"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub cpf: Option<String>,

    #[validate(length(min = 1, message = "required"))]
    #[schema(example = "curso-lideranca")]
    pub product_id: String,
    #[validate(length(min = 1, message = "required"))]
    #[schema(example = "Curso de Liderança")]
    pub product_name: String,
    #[schema(example = "120.00")]
    pub price: Decimal,
    #[schema(example = 3)]
    pub installments: u32,

    pub referral_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DonationTouchpoint {
    pub full_name: Option<String>,
    #[validate(email(message = "invalid_email"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub cpf: Option<String>,

    #[validate(length(min = 1, message = "required"))]
    pub donation_id: String,
    pub amount: Decimal,
    pub campaign: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignupTouchpoint {
    pub user_id: Uuid,
    pub full_name: Option<String>,
    #[validate(email(message = "invalid_email"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub cpf: Option<String>,
}

macro_rules! identity_of {
    ($t:ty, $source:expr) => {
        impl $t {
            pub fn identity(&self, first_activity_name: &str) -> IdentityCandidate {
                IdentityCandidate {
                    cpf: self.cpf.clone(),
                    email: self.email.clone(),
                    phone: self.phone.clone(),
                    full_name: self.full_name.clone(),
                    source: Some($source.to_string()),
                    first_activity_type: Some($source.to_string()),
                    first_activity_name: Some(first_activity_name.to_string()),
                }
            }
        }
    };
}

identity_of!(EventRegistrationTouchpoint, "event_registration");
identity_of!(PurchaseTouchpoint, "product_purchase");
identity_of!(DonationTouchpoint, "donation");
identity_of!(SignupTouchpoint, "account_signup");

// Webhook do gateway de pagamento (só o que interessa ao CRM)
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentWebhook {
    #[schema(example = "PAYMENT_CONFIRMED")]
    pub event: String,
    pub payment: WebhookPayment,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayment {
    #[schema(example = "pay_080225913252")]
    pub id: String,
    // Id do negócio, enviado como externalReference na cobrança
    pub external_reference: Option<String>,
    pub value: Option<Decimal>,
}

impl PaymentWebhook {
    pub fn is_confirmation(&self) -> bool {
        matches!(self.event.as_str(), "PAYMENT_CONFIRMED" | "PAYMENT_RECEIVED")
    }
}

/// O que o fluxo público devolve. Falhas do CRM nunca viram erro aqui:
/// os campos simplesmente ficam vazios.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TouchpointOutcome {
    pub lead: Option<Lead>,
    pub interaction_id: Option<Uuid>,
    pub deal: Option<Deal>,
    pub checkout_url: Option<String>,
    pub charge_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub received: bool,
    pub deal_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installment_limits() {
        assert_eq!(max_installments(Decimal::from(120)), 6);
        assert_eq!(max_installments(Decimal::new(12999, 2)), 6);
        assert_eq!(max_installments(Decimal::from(1000)), 12);
        assert_eq!(max_installments(Decimal::from(15)), 1);
        assert_eq!(max_installments(Decimal::ZERO), 1);
    }
}
