// src/services/referral_service.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    common::{
        error::AppError,
        i18n::{I18nStore, DEFAULT_LANG},
    },
    db::{pipeline_repo::PipelineStore, referral_repo::ReferralStore},
    models::referral::{
        commission_for, Ambassador, ClickAttribution, Commission, NewAmbassador, NewCommission, NewPayout,
        PaymentPreference, Payout, PayoutStatus, ReferralClick,
    },
    services::outbox_service::OutboxService,
};

// Tentativas de gerar um código livre antes de desistir
const CODE_ATTEMPTS: usize = 3;

/// Prefixo legível do código: primeiro nome em maiúsculas, sem acentos.
pub fn code_prefix(name: &str) -> String {
    let first = name.split_whitespace().next().unwrap_or("");
    let prefix: String = first
        .chars()
        .map(strip_accent)
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .take(10)
        .collect();

    if prefix.is_empty() { "REF".to_string() } else { prefix }
}

fn strip_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
        'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' | 'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' | 'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'ú' | 'ù' | 'û' | 'ü' | 'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ç' | 'Ç' => 'C',
        other => other,
    }
}

fn generate_code(name: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..4].to_ascii_uppercase();
    format!("{}-{}", code_prefix(name), suffix)
}

#[derive(Clone)]
pub struct ReferralService {
    store: Arc<dyn ReferralStore>,
    deals: Arc<dyn PipelineStore>,
    outbox: OutboxService,
    i18n: Arc<I18nStore>,
}

impl ReferralService {
    pub fn new(
        store: Arc<dyn ReferralStore>,
        deals: Arc<dyn PipelineStore>,
        outbox: OutboxService,
        i18n: Arc<I18nStore>,
    ) -> Self {
        Self { store, deals, outbox, i18n }
    }

    // =========================================================================
    //  1. EMBAIXADORES
    // =========================================================================

    pub async fn create_ambassador(
        &self,
        name: &str,
        email: Option<&str>,
        commission_rate: Decimal,
        payment_preference: PaymentPreference,
        pix_key: Option<&str>,
        code: Option<&str>,
    ) -> Result<Ambassador, AppError> {
        let mut draft = NewAmbassador {
            code: String::new(),
            name: name.trim().to_string(),
            email: email.map(|e| e.trim().to_lowercase()),
            commission_rate,
            payment_preference,
            pix_key: pix_key.map(str::to_string),
        };

        // Código escolhido pelo admin: colisão é erro
        if let Some(code) = code {
            draft.code = code.trim().to_ascii_uppercase();
            return self.store.insert_ambassador(&draft).await;
        }

        let mut last_error = None;
        for _ in 0..CODE_ATTEMPTS {
            draft.code = generate_code(name);
            match self.store.insert_ambassador(&draft).await {
                Ok(ambassador) => {
                    tracing::info!(ambassador_id = %ambassador.id, code = %ambassador.code, "Embaixador criado");
                    return Ok(ambassador);
                }
                Err(AppError::UniqueConstraintViolation(constraint)) => {
                    last_error = Some(AppError::UniqueConstraintViolation(constraint));
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::UniqueConstraintViolation("ambassadors_code_key".into())))
    }

    pub async fn get_ambassador_by_code(&self, code: &str) -> Result<Ambassador, AppError> {
        self.store.find_ambassador_by_code(code.trim()).await?.ok_or(AppError::AmbassadorNotFound)
    }

    pub async fn list_ambassadors(&self) -> Result<Vec<Ambassador>, AppError> {
        self.store.list_ambassadors().await
    }

    async fn active_ambassador(&self, code: &str) -> Result<Ambassador, AppError> {
        let ambassador = self.get_ambassador_by_code(code).await?;
        if !ambassador.is_active {
            return Err(AppError::AmbassadorInactive);
        }
        Ok(ambassador)
    }

    // =========================================================================
    //  2. CLIQUES E CONVERSÕES
    // =========================================================================

    pub async fn track_click(&self, code: &str, attribution: &ClickAttribution) -> Result<ReferralClick, AppError> {
        let ambassador = self.active_ambassador(code).await?;
        self.store.record_click(ambassador.id, attribution).await
    }

    /// Uma comissão por negócio: repetir a chamada devolve a mesma.
    /// Só negócios ganhos geram comissão.
    pub async fn attribute_conversion(&self, deal_id: Uuid, code: &str) -> Result<Commission, AppError> {
        if let Some(existing) = self.store.find_commission_for_deal(deal_id).await? {
            return Ok(existing);
        }

        let deal = self.deals.find_deal(deal_id).await?.ok_or(AppError::DealNotFound)?;
        if deal.won != Some(true) {
            return Err(AppError::DealNotWon);
        }

        let ambassador = self.active_ambassador(code).await?;
        let commission = NewCommission {
            ambassador_id: ambassador.id,
            deal_id,
            sale_amount: deal.value,
            commission_rate: ambassador.commission_rate,
            commission_amount: commission_for(deal.value, ambassador.commission_rate),
        };

        let (commission, created) = self.store.insert_commission(&commission).await?;
        if created {
            tracing::info!(
                deal_id = %deal_id,
                ambassador_id = %ambassador.id,
                amount = %commission.commission_amount,
                "Conversão atribuída ao embaixador"
            );
        }
        Ok(commission)
    }

    // =========================================================================
    //  3. REPASSES
    // =========================================================================

    /// Junta as comissões livres de negócios ganhos em [início, fim).
    pub async fn compute_payout(
        &self,
        ambassador_id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Payout, AppError> {
        if period_start >= period_end {
            return Err(AppError::InvalidPeriod);
        }
        self.store.find_ambassador(ambassador_id).await?.ok_or(AppError::AmbassadorNotFound)?;

        let commissions = self.store.payable_commissions(ambassador_id, period_start, period_end).await?;
        if commissions.is_empty() {
            return Err(AppError::EmptyPayout);
        }

        let draft = NewPayout::from_commissions(ambassador_id, period_start, period_end, &commissions);
        let ids: Vec<Uuid> = commissions.iter().map(|c| c.id).collect();
        let payout = self.store.create_payout(&draft, &ids).await?;

        tracing::info!(payout_id = %payout.id, sales = payout.sales_count, net = %payout.net_amount, "Repasse calculado");
        Ok(payout)
    }

    pub async fn list_payouts(&self, ambassador_id: Uuid) -> Result<Vec<Payout>, AppError> {
        self.store.find_ambassador(ambassador_id).await?.ok_or(AppError::AmbassadorNotFound)?;
        self.store.list_payouts(ambassador_id).await
    }

    pub async fn transition_payout(&self, payout_id: Uuid, next: PayoutStatus) -> Result<Payout, AppError> {
        let payout = self.store.find_payout(payout_id).await?.ok_or(AppError::PayoutNotFound)?;

        if payout.status == PayoutStatus::Paid {
            return Err(AppError::PayoutImmutable);
        }
        if !payout.status.can_transition_to(next) {
            return Err(AppError::InvalidPayoutTransition {
                from: payout.status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }

        let Some(updated) = self.store.transition_payout(payout_id, payout.status, next, Utc::now()).await? else {
            // Outro pedido mudou o status primeiro
            return Err(AppError::InvalidPayoutTransition {
                from: payout.status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        };

        tracing::info!(payout_id = %payout_id, status = next.as_str(), "Status do repasse alterado");

        if next == PayoutStatus::Paid {
            return Ok(self.notify_paid(updated).await);
        }
        Ok(updated)
    }

    /// Enfileira o e-mail de confirmação e marca `notified_at`. Falha aqui
    /// não desfaz o pagamento.
    async fn notify_paid(&self, payout: Payout) -> Payout {
        let ambassador = match self.store.find_ambassador(payout.ambassador_id).await {
            Ok(Some(ambassador)) => ambassador,
            Ok(None) => return payout,
            Err(e) => {
                tracing::warn!(payout_id = %payout.id, "Falha ao buscar embaixador para notificação: {:?}", e);
                return payout;
            }
        };
        let Some(email) = ambassador.email.as_deref() else {
            tracing::info!(payout_id = %payout.id, "Embaixador sem e-mail, repasse não notificado");
            return payout;
        };

        let subject = self.i18n.translate(DEFAULT_LANG, "mail.payout_paid.subject");
        let body = self
            .i18n
            .translate(DEFAULT_LANG, "mail.payout_paid.body")
            .replace("{name}", &ambassador.name)
            .replace("{amount}", &format!("{:.2}", payout.net_amount))
            .replace("{sales}", &payout.sales_count.to_string());
        let html = format!("<p>{}</p>", body);

        if let Err(e) = self.outbox.enqueue("payout_paid", email, &subject, &html).await {
            tracing::warn!(payout_id = %payout.id, "Falha ao enfileirar e-mail do repasse: {:?}", e);
            return payout;
        }

        match self.store.mark_payout_notified(payout.id, Utc::now()).await {
            Ok(notified) => notified,
            Err(e) => {
                tracing::warn!(payout_id = %payout.id, "Falha ao marcar repasse como notificado: {:?}", e);
                payout
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_prefix_strips_accents_and_uses_first_name() {
        assert_eq!(code_prefix("Joana D'Arc"), "JOANA");
        assert_eq!(code_prefix("  Ângela Conceição "), "ANGELA");
        assert_eq!(code_prefix("Çá"), "CA");
        assert_eq!(code_prefix(""), "REF");
    }

    #[test]
    fn generated_code_has_random_suffix() {
        let code = generate_code("Maria Souza");
        assert!(code.starts_with("MARIA-"));
        assert_eq!(code.len(), "MARIA-".len() + 4);
    }
}
