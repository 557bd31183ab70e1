// src/services/identity_service.rs

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    common::{documents::non_blank, error::AppError},
    db::lead_repo::{LeadFilter, LeadStore},
    models::lead::{
        ConsistencyWarning, IdentityCandidate, Lead, LeadStatus, MatchKey, NewWarning, NormalizedCandidate,
        Resolution, WarningKind,
    },
};

const DEFAULT_LIST_LIMIT: i64 = 100;

#[derive(Clone)]
pub struct IdentityService {
    leads: Arc<dyn LeadStore>,
}

impl IdentityService {
    pub fn new(leads: Arc<dyn LeadStore>) -> Self {
        Self { leads }
    }

    // =========================================================================
    //  RESOLUÇÃO
    // =========================================================================

    /// CPF primeiro, depois e-mail, senão cria. Nunca funde leads: quando CPF
    /// e e-mail apontam para leads diferentes, vale o do CPF e fica um aviso.
    pub async fn resolve(&self, candidate: &IdentityCandidate) -> Result<Resolution, AppError> {
        let normalized = candidate.normalize()?;

        match self.try_resolve(&normalized).await {
            // Outro pedido criou o mesmo lead entre a busca e o INSERT:
            // refaz a busca uma vez
            Err(AppError::DuplicateIdentity(index)) => {
                tracing::info!(index = %index, "Lead criado em paralelo, refazendo a busca");
                self.try_resolve(&normalized).await
            }
            other => other,
        }
    }

    async fn try_resolve(&self, candidate: &NormalizedCandidate) -> Result<Resolution, AppError> {
        let by_cpf = match &candidate.cpf {
            Some(cpf) => self.leads.find_active_by_cpf(cpf).await?,
            None => None,
        };
        let by_email = match &candidate.email {
            Some(email) => self.leads.find_active_by_email(email).await?,
            None => None,
        };

        match (by_cpf, by_email) {
            (Some(lead), by_email) => {
                let mut candidate = candidate.clone();
                if let Some(other) = by_email.filter(|other| other.id != lead.id) {
                    self.warn_mismatch(&lead, &other).await;
                    // O e-mail pertence a outro lead; não copia
                    candidate.email = None;
                }
                let (lead, backfilled) = self.backfill(lead, &candidate).await?;
                Ok(Resolution { lead, created: false, matched_by: Some(MatchKey::Cpf), backfilled })
            }
            // Mesmo e-mail, CPFs diferentes: são duas pessoas. Cria o novo
            // lead e deixa o aviso para um humano decidir
            (None, Some(other)) if other.cpf.is_some() && candidate.cpf.is_some() && other.cpf != candidate.cpf => {
                let lead = self.create(candidate).await?;
                self.warn_suspected_duplicate(&lead, &other).await;
                Ok(Resolution { lead, created: true, matched_by: None, backfilled: false })
            }
            (None, Some(lead)) => {
                let (lead, backfilled) = self.backfill(lead, candidate).await?;
                Ok(Resolution { lead, created: false, matched_by: Some(MatchKey::Email), backfilled })
            }
            (None, None) => {
                let lead = self.create(candidate).await?;
                Ok(Resolution { lead, created: true, matched_by: None, backfilled: false })
            }
        }
    }

    async fn create(&self, candidate: &NormalizedCandidate) -> Result<Lead, AppError> {
        let lead = self.leads.insert_lead(&candidate.to_new_lead()).await?;
        tracing::info!(lead_id = %lead.id, source = ?lead.source, "Novo lead criado");
        Ok(lead)
    }

    async fn backfill(&self, lead: Lead, candidate: &NormalizedCandidate) -> Result<(Lead, bool), AppError> {
        let patch = candidate.backfill_for(&lead);
        if patch.is_empty() {
            return Ok((lead, false));
        }
        let updated = self.leads.backfill_lead(lead.id, &patch).await?;
        Ok((updated, true))
    }

    async fn warn_suspected_duplicate(&self, lead: &Lead, email_lead: &Lead) {
        let warning = NewWarning {
            kind: WarningKind::DuplicateLeadSuspected,
            lead_id: lead.id,
            other_lead_id: Some(email_lead.id),
            details: format!(
                "E-mail compartilhado com o lead {}, que tem outro CPF",
                email_lead.id
            ),
        };

        tracing::warn!(lead_id = %lead.id, other_lead_id = %email_lead.id, "E-mail já usado por lead com outro CPF");
        if let Err(e) = self.leads.record_warning(&warning).await {
            tracing::warn!("Falha ao gravar aviso de consistência: {:?}", e);
        }
    }

    async fn warn_mismatch(&self, cpf_lead: &Lead, email_lead: &Lead) {
        let warning = NewWarning {
            kind: WarningKind::MultiIdentityMismatch,
            lead_id: cpf_lead.id,
            other_lead_id: Some(email_lead.id),
            details: format!(
                "CPF aponta para o lead {} e o e-mail para o lead {}",
                cpf_lead.id, email_lead.id
            ),
        };

        tracing::warn!(lead_id = %cpf_lead.id, other_lead_id = %email_lead.id, "Identidade divergente entre CPF e e-mail");
        if let Err(e) = self.leads.record_warning(&warning).await {
            tracing::warn!("Falha ao gravar aviso de consistência: {:?}", e);
        }
    }

    // =========================================================================
    //  OPERAÇÕES DE LEAD
    // =========================================================================

    pub async fn get_lead(&self, id: Uuid) -> Result<Lead, AppError> {
        self.leads.find_by_id(id).await?.ok_or(AppError::LeadNotFound)
    }

    pub async fn list_leads(
        &self,
        status: Option<LeadStatus>,
        search: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<Lead>, AppError> {
        let filter = LeadFilter {
            status,
            search: non_blank(search).map(str::to_string),
            limit: limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 500),
        };
        self.leads.list_leads(&filter).await
    }

    /// `user_id` só é usado quando a mudança é para "converted".
    pub async fn update_status(&self, id: Uuid, status: LeadStatus, user_id: Option<Uuid>) -> Result<Lead, AppError> {
        let lead = self.get_lead(id).await?;

        if !lead.status.can_transition_to(status) {
            return Err(AppError::InvalidLeadTransition {
                from: lead.status.as_str().to_string(),
                to: status.as_str().to_string(),
            });
        }
        if status == LeadStatus::Converted {
            return self.mark_converted(id, user_id).await;
        }
        if lead.status == status {
            return Ok(lead);
        }

        self.leads.update_status(id, status).await
    }

    /// Idempotente: um lead já convertido mantém a data e o usuário originais.
    pub async fn mark_converted(&self, id: Uuid, user_id: Option<Uuid>) -> Result<Lead, AppError> {
        let lead = self.leads.mark_converted(id, user_id, Utc::now()).await?;
        tracing::info!(lead_id = %lead.id, user_id = ?user_id, "Lead convertido");
        Ok(lead)
    }

    /// Gancho do cadastro de conta: converte todo lead ativo com o mesmo CPF
    /// ou e-mail.
    pub async fn link_user_account(
        &self,
        user_id: Uuid,
        cpf: Option<&str>,
        email: Option<&str>,
    ) -> Result<Vec<Lead>, AppError> {
        let candidate = IdentityCandidate {
            cpf: cpf.map(str::to_string),
            email: email.map(str::to_string),
            ..Default::default()
        }
        .normalize()?;

        let mut matches: Vec<Lead> = Vec::new();
        if let Some(cpf) = &candidate.cpf {
            matches.extend(self.leads.find_active_by_cpf(cpf).await?);
        }
        if let Some(email) = &candidate.email {
            if let Some(lead) = self.leads.find_active_by_email(email).await? {
                if !matches.iter().any(|l| l.id == lead.id) {
                    matches.push(lead);
                }
            }
        }

        let mut converted = Vec::with_capacity(matches.len());
        for lead in matches {
            converted.push(self.mark_converted(lead.id, Some(user_id)).await?);
        }
        Ok(converted)
    }

    pub async fn list_warnings(&self, open_only: bool) -> Result<Vec<ConsistencyWarning>, AppError> {
        self.leads.list_warnings(open_only).await
    }
}
