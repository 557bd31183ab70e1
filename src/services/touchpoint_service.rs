// src/services/touchpoint_service.rs
//
// Fluxos públicos (inscrição, compra, doação, cadastro, webhook de pagamento).
// O CRM aqui é acessório: só erro de entrada do usuário chega ao cliente.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        interaction::{InteractionChannel, InteractionInput, InteractionMetadata, InteractionType},
        lead::{IdentityCandidate, Lead},
        pipeline::{Deal, DealMetadata, OpenDealRequest},
        touchpoint::{
            max_installments, DonationTouchpoint, EventRegistrationTouchpoint, PaymentWebhook, PurchaseTouchpoint,
            SignupTouchpoint, TouchpointOutcome, WebhookAck,
        },
    },
    services::{
        collaborators::{ChargeRequest, CustomerProfile, PaymentProvider},
        identity_service::IdentityService,
        interaction_service::InteractionService,
        pipeline_service::PipelineService,
    },
};

// Vencimento da cobrança a partir de hoje
const CHARGE_DUE_DAYS: i64 = 3;

#[derive(Clone)]
pub struct TouchpointService {
    identity: IdentityService,
    interactions: InteractionService,
    pipelines: PipelineService,
    payments: Option<Arc<dyn PaymentProvider>>,
}

impl TouchpointService {
    pub fn new(
        identity: IdentityService,
        interactions: InteractionService,
        pipelines: PipelineService,
        payments: Option<Arc<dyn PaymentProvider>>,
    ) -> Self {
        Self { identity, interactions, pipelines, payments }
    }

    /// Resolve o lead. Erro de entrada (CPF inválido, nenhum contato) sobe;
    /// qualquer outro vira log e o fluxo segue sem lead.
    async fn resolve_lead(&self, candidate: &IdentityCandidate) -> Result<Option<Lead>, AppError> {
        match self.identity.resolve(candidate).await {
            Ok(resolution) => Ok(Some(resolution.lead)),
            Err(e) if e.is_client_error() => Err(e),
            Err(e) => {
                tracing::warn!("Falha ao resolver identidade no ponto de contato: {:?}", e);
                Ok(None)
            }
        }
    }

    /// Grava a interação no lead ou, sem lead, como órfã reconciliável.
    async fn record(&self, lead: Option<&Lead>, candidate: &IdentityCandidate, input: InteractionInput) -> Option<Uuid> {
        match lead {
            Some(lead) => self.interactions.record_best_effort(lead, None, input).await,
            None => {
                let keys = candidate.normalize().ok();
                let cpf = keys.as_ref().and_then(|k| k.cpf.clone());
                let email = keys.as_ref().and_then(|k| k.email.clone());
                self.interactions.record_orphan_best_effort(cpf, email, input).await
            }
        }
    }

    async fn open_deal_best_effort(&self, request: OpenDealRequest) -> Option<Deal> {
        match self.pipelines.find_or_create_open_deal(&request).await {
            Ok(deal) => Some(deal),
            Err(e) => {
                tracing::warn!(lead_id = %request.lead_id, product = %request.product_id, "Falha ao abrir negócio: {:?}", e);
                None
            }
        }
    }

    // =========================================================================
    //  INSCRIÇÃO EM EVENTO
    // =========================================================================

    pub async fn register_for_event(&self, payload: &EventRegistrationTouchpoint) -> Result<TouchpointOutcome, AppError> {
        let candidate = payload.identity(&payload.event_title);
        let lead = self.resolve_lead(&candidate).await?;

        let input = InteractionInput {
            interaction_type: InteractionType::EventRegistration,
            channel: InteractionChannel::Event,
            description: Some(format!("Inscrição em {}", payload.event_title)),
            metadata: InteractionMetadata::EventRegistration {
                event_id: payload.event_id.clone(),
                event_title: payload.event_title.clone(),
                price: payload.price,
                is_free: payload.is_free,
            },
        };
        let interaction_id = self.record(lead.as_ref(), &candidate, input).await;

        // Evento gratuito só vira negócio quando pedido explicitamente
        let wants_deal = !payload.is_free || payload.create_deal;
        let deal = match (&lead, wants_deal) {
            (Some(lead), true) => {
                self.open_deal_best_effort(OpenDealRequest {
                    lead_id: lead.id,
                    user_id: None,
                    product_id: format!("event:{}", payload.event_id),
                    title: Some(payload.event_title.clone()),
                    value: payload.price,
                    referral_code: None,
                    metadata: DealMetadata {
                        event_id: Some(payload.event_id.clone()),
                        source_interaction_id: interaction_id,
                        ..Default::default()
                    },
                })
                .await
            }
            _ => None,
        };

        Ok(TouchpointOutcome { lead, interaction_id, deal, ..Default::default() })
    }

    // =========================================================================
    //  COMPRA DE PRODUTO
    // =========================================================================

    pub async fn start_purchase(&self, payload: &PurchaseTouchpoint) -> Result<TouchpointOutcome, AppError> {
        let max = max_installments(payload.price);
        if payload.installments < 1 || payload.installments > max {
            return Err(AppError::InvalidInstallments { max });
        }

        let candidate = payload.identity(&payload.product_name);
        let lead = self.resolve_lead(&candidate).await?;

        let input = InteractionInput {
            interaction_type: InteractionType::ProductPurchaseStarted,
            channel: InteractionChannel::Checkout,
            description: Some(format!("Checkout de {}", payload.product_name)),
            metadata: InteractionMetadata::Purchase {
                product_id: payload.product_id.clone(),
                product_name: payload.product_name.clone(),
                amount: payload.price,
                installments: payload.installments,
                deal_id: None,
                charge_id: None,
            },
        };
        let interaction_id = self.record(lead.as_ref(), &candidate, input).await;

        let Some(lead) = lead else {
            return Ok(TouchpointOutcome { interaction_id, ..Default::default() });
        };

        let deal = self
            .open_deal_best_effort(OpenDealRequest {
                lead_id: lead.id,
                user_id: None,
                product_id: payload.product_id.clone(),
                title: Some(format!("{} - {}", payload.product_name, display_name(&lead))),
                value: payload.price,
                referral_code: payload.referral_code.clone(),
                metadata: DealMetadata {
                    installments: Some(payload.installments),
                    source_interaction_id: interaction_id,
                    ..Default::default()
                },
            })
            .await;

        let (charge_id, checkout_url) = match &deal {
            Some(deal) => self.charge_best_effort(&lead, deal, payload).await,
            None => (None, None),
        };

        Ok(TouchpointOutcome { lead: Some(lead), interaction_id, deal, checkout_url, charge_id })
    }

    /// Cliente + cobrança no gateway. Falha não desfaz nada no CRM.
    async fn charge_best_effort(
        &self,
        lead: &Lead,
        deal: &Deal,
        payload: &PurchaseTouchpoint,
    ) -> (Option<String>, Option<String>) {
        let Some(payments) = &self.payments else {
            return (None, None);
        };

        let profile = CustomerProfile {
            name: display_name(lead).to_string(),
            email: lead.email.clone(),
            cpf: lead.cpf.clone(),
            phone: lead.phone.clone(),
        };

        let charge = async {
            let customer_id = payments.create_customer(&profile).await?;
            payments
                .create_charge(&ChargeRequest {
                    customer_id,
                    amount: payload.price,
                    due_date: (Utc::now() + Duration::days(CHARGE_DUE_DAYS)).date_naive(),
                    external_reference: deal.id.to_string(),
                    installments: payload.installments,
                    description: payload.product_name.clone(),
                })
                .await
        };

        match charge.await {
            Ok(charge) => {
                tracing::info!(deal_id = %deal.id, charge_id = %charge.id, "💳 Cobrança criada");
                (Some(charge.id), charge.checkout_url)
            }
            Err(e) => {
                tracing::warn!(deal_id = %deal.id, "Falha ao criar cobrança no gateway: {:?}", e);
                (None, None)
            }
        }
    }

    // =========================================================================
    //  DOAÇÃO E CADASTRO
    // =========================================================================

    pub async fn record_donation(&self, payload: &DonationTouchpoint) -> Result<TouchpointOutcome, AppError> {
        let name = payload.campaign.clone().unwrap_or_else(|| "Doação".to_string());
        let candidate = payload.identity(&name);
        let lead = self.resolve_lead(&candidate).await?;

        let input = InteractionInput {
            interaction_type: InteractionType::Donation,
            channel: InteractionChannel::Website,
            description: Some(name),
            metadata: InteractionMetadata::Donation {
                donation_id: payload.donation_id.clone(),
                amount: payload.amount,
                campaign: payload.campaign.clone(),
            },
        };
        let interaction_id = self.record(lead.as_ref(), &candidate, input).await;

        Ok(TouchpointOutcome { lead, interaction_id, ..Default::default() })
    }

    /// Conta criada: converte os leads do mesmo CPF/e-mail.
    pub async fn signup(&self, payload: &SignupTouchpoint) -> Result<TouchpointOutcome, AppError> {
        let candidate = payload.identity("Cadastro na plataforma");
        let lead = self.resolve_lead(&candidate).await?;

        let converted = match self
            .identity
            .link_user_account(payload.user_id, payload.cpf.as_deref(), payload.email.as_deref())
            .await
        {
            Ok(leads) => leads,
            Err(e) if e.is_client_error() => Vec::new(),
            Err(e) => {
                tracing::warn!(user_id = %payload.user_id, "Falha ao ligar conta aos leads: {:?}", e);
                Vec::new()
            }
        };

        // Prefere a versão já convertida do lead resolvido
        let lead = match lead {
            Some(lead) => Some(converted.iter().find(|l| l.id == lead.id).cloned().unwrap_or(lead)),
            None => converted.into_iter().next(),
        };

        let input = InteractionInput {
            interaction_type: InteractionType::AccountCreated,
            channel: InteractionChannel::Website,
            description: Some("Conta criada".to_string()),
            metadata: InteractionMetadata::None,
        };
        let interaction_id = match &lead {
            Some(lead) => self.interactions.record_best_effort(lead, Some(payload.user_id), input).await,
            None => self.record(None, &candidate, input).await,
        };

        Ok(TouchpointOutcome { lead, interaction_id, ..Default::default() })
    }

    // =========================================================================
    //  WEBHOOK DE PAGAMENTO
    // =========================================================================

    /// Confirmação de pagamento: leva o negócio para "ganho". Reentregas do
    /// mesmo evento não duplicam nada. Referência desconhecida é só logada
    /// (o gateway não deve ficar reenviando).
    pub async fn handle_payment_webhook(&self, webhook: &PaymentWebhook) -> Result<WebhookAck, AppError> {
        if !webhook.is_confirmation() {
            return Ok(WebhookAck { received: true, deal_id: None });
        }

        let Some(deal_id) = webhook.payment.external_reference.as_deref().and_then(|r| Uuid::parse_str(r).ok()) else {
            tracing::warn!(payment_id = %webhook.payment.id, "Webhook sem referência de negócio válida");
            return Ok(WebhookAck { received: true, deal_id: None });
        };

        let moved = match self.pipelines.close_as_won(deal_id).await {
            Ok(moved) => moved,
            Err(e @ (AppError::DealNotFound | AppError::DealAlreadyClosed | AppError::StageNotFound)) => {
                tracing::warn!(deal_id = %deal_id, payment_id = %webhook.payment.id, "Pagamento confirmado sem efeito: {:?}", e);
                return Ok(WebhookAck { received: true, deal_id: Some(deal_id) });
            }
            Err(e) => return Err(e),
        };

        if moved.closed_now {
            let deal = &moved.deal;
            match self.identity.get_lead(deal.lead_id).await {
                Ok(lead) => {
                    let input = InteractionInput {
                        interaction_type: InteractionType::ProductPurchaseCompleted,
                        channel: InteractionChannel::Webhook,
                        description: Some(deal.title.clone()),
                        metadata: InteractionMetadata::Purchase {
                            product_id: deal.product_id.clone().unwrap_or_default(),
                            product_name: deal.title.clone(),
                            amount: webhook.payment.value.unwrap_or(deal.value),
                            installments: deal.metadata.installments.unwrap_or(1),
                            deal_id: Some(deal.id),
                            charge_id: Some(webhook.payment.id.clone()),
                        },
                    };
                    self.interactions.record_best_effort(&lead, deal.user_id, input).await;
                }
                Err(e) => tracing::warn!(deal_id = %deal.id, "Lead do negócio pago não encontrado: {:?}", e),
            }
        }

        Ok(WebhookAck { received: true, deal_id: Some(deal_id) })
    }
}

fn display_name(lead: &Lead) -> &str {
    lead.full_name.as_deref().or(lead.email.as_deref()).unwrap_or("Cliente")
}
