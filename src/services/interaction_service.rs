// src/services/interaction_service.rs

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{interaction_repo::InteractionStore, lead_repo::LeadStore},
    models::{
        interaction::{Interaction, InteractionInput, NewInteraction},
        lead::Lead,
    },
};

// Quantas órfãs cada reconciliação examina
const RECONCILE_BATCH: i64 = 500;

#[derive(Clone)]
pub struct InteractionService {
    interactions: Arc<dyn InteractionStore>,
    leads: Arc<dyn LeadStore>,
}

impl InteractionService {
    pub fn new(interactions: Arc<dyn InteractionStore>, leads: Arc<dyn LeadStore>) -> Self {
        Self { interactions, leads }
    }

    /// Só acrescenta. CPF e e-mail do lead vão junto para a jornada.
    pub async fn record(&self, lead: &Lead, user_id: Option<Uuid>, input: InteractionInput) -> Result<Interaction, AppError> {
        let interaction = NewInteraction {
            lead_id: Some(lead.id),
            user_id: user_id.or(lead.converted_user_id),
            cpf: lead.cpf.clone(),
            email: lead.email.clone(),
            interaction_type: input.interaction_type,
            channel: input.channel,
            description: input.description,
            metadata: input.metadata,
        };
        self.interactions.insert_interaction(&interaction).await
    }

    /// Sem lead (a resolução falhou): guarda as chaves para reconciliar depois.
    pub async fn record_orphan(
        &self,
        cpf: Option<String>,
        email: Option<String>,
        input: InteractionInput,
    ) -> Result<Interaction, AppError> {
        let interaction = NewInteraction {
            lead_id: None,
            user_id: None,
            cpf,
            email,
            interaction_type: input.interaction_type,
            channel: input.channel,
            description: input.description,
            metadata: input.metadata,
        };
        self.interactions.insert_interaction(&interaction).await
    }

    /// Nunca falha: erro vira log e a ação de negócio segue.
    pub async fn record_best_effort(&self, lead: &Lead, user_id: Option<Uuid>, input: InteractionInput) -> Option<Uuid> {
        let interaction_type = input.interaction_type;
        match self.record(lead, user_id, input).await {
            Ok(interaction) => Some(interaction.id),
            Err(e) => {
                tracing::warn!(lead_id = %lead.id, kind = interaction_type.as_str(), "Falha ao registrar interação: {:?}", e);
                None
            }
        }
    }

    pub async fn record_orphan_best_effort(
        &self,
        cpf: Option<String>,
        email: Option<String>,
        input: InteractionInput,
    ) -> Option<Uuid> {
        let interaction_type = input.interaction_type;
        match self.record_orphan(cpf, email, input).await {
            Ok(interaction) => Some(interaction.id),
            Err(e) => {
                tracing::warn!(kind = interaction_type.as_str(), "Falha ao registrar interação órfã: {:?}", e);
                None
            }
        }
    }

    pub async fn list_for_lead(&self, lead_id: Uuid) -> Result<Vec<Interaction>, AppError> {
        self.leads.find_by_id(lead_id).await?.ok_or(AppError::LeadNotFound)?;
        self.interactions.list_for_lead(lead_id).await
    }

    /// Liga interações órfãs ao lead ativo com o mesmo CPF (ou e-mail).
    /// Devolve quantas foram ligadas.
    pub async fn reconcile_orphans(&self) -> Result<usize, AppError> {
        let orphans = self.interactions.list_orphans(RECONCILE_BATCH).await?;
        let mut reconciled = 0;

        for orphan in orphans {
            let lead = match (&orphan.cpf, &orphan.email) {
                (Some(cpf), _) => match self.leads.find_active_by_cpf(cpf).await? {
                    Some(lead) => Some(lead),
                    None => match &orphan.email {
                        Some(email) => self.leads.find_active_by_email(email).await?,
                        None => None,
                    },
                },
                (None, Some(email)) => self.leads.find_active_by_email(email).await?,
                (None, None) => None,
            };

            if let Some(lead) = lead {
                if self.interactions.attach_to_lead(orphan.id, lead.id).await? {
                    reconciled += 1;
                }
            }
        }

        if reconciled > 0 {
            tracing::info!(reconciled, "Interações órfãs reconciliadas");
        }
        Ok(reconciled)
    }
}
