// src/db/memory.rs
//
// Armazenamento em memória com as mesmas regras de unicidade dos índices
// parciais do Postgres. Usado nos testes e com CRM_STORAGE=memory.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    common::{
        db_utils::{DEALS_OPEN_INDEX, LEADS_CPF_INDEX, LEADS_EMAIL_INDEX},
        error::AppError,
    },
    db::{
        interaction_repo::InteractionStore,
        journey_repo::JourneySourceStore,
        lead_repo::{LeadFilter, LeadStore},
        outbox_repo::OutboxStore,
        pipeline_repo::PipelineStore,
        referral_repo::ReferralStore,
    },
    models::{
        interaction::{Interaction, NewInteraction},
        journey::{DonationRecord, EventRegistrationRecord, UserAccount},
        lead::{ConsistencyWarning, IdentityKey, Lead, LeadPatch, LeadStatus, NewLead, NewWarning},
        outbox::{NewOutboxMessage, OutboxMessage, OutboxStatus},
        pipeline::{Deal, DealMetadata, NewDeal, NewStage, Pipeline, PipelineStage, PipelineWithStages, StageTransition},
        referral::{
            Ambassador, ClickAttribution, Commission, NewAmbassador, NewCommission, NewPayout, Payout, PayoutStatus,
            ReferralClick,
        },
    },
};

#[derive(Default)]
struct MemoryState {
    leads: Vec<Lead>,
    warnings: Vec<ConsistencyWarning>,
    interactions: Vec<Interaction>,
    pipelines: Vec<Pipeline>,
    stages: Vec<PipelineStage>,
    deals: Vec<Deal>,
    ambassadors: Vec<Ambassador>,
    clicks: Vec<ReferralClick>,
    commissions: Vec<Commission>,
    payouts: Vec<Payout>,
    outbox: Vec<OutboxMessage>,
    registrations: Vec<EventRegistrationRecord>,
    donations: Vec<DonationRecord>,
    accounts: Vec<UserAccount>,
}

impl MemoryState {
    /// Verifica os índices únicos de leads ativos, ignorando o próprio lead.
    /// O de e-mail só vale entre leads sem CPF.
    fn check_lead_uniqueness(&self, id: Option<Uuid>, cpf: Option<&str>, email: Option<&str>) -> Result<(), AppError> {
        let others = self.leads.iter().filter(|l| Some(l.id) != id && l.status != LeadStatus::Lost);
        for other in others {
            if cpf.is_some() && other.cpf.as_deref() == cpf {
                return Err(AppError::DuplicateIdentity(LEADS_CPF_INDEX.into()));
            }
            if cpf.is_none() && other.cpf.is_none() {
                if let (Some(a), Some(b)) = (email, other.email.as_deref()) {
                    if a.eq_ignore_ascii_case(b) {
                        return Err(AppError::DuplicateIdentity(LEADS_EMAIL_INDEX.into()));
                    }
                }
            }
        }
        Ok(())
    }

    fn lead_mut(&mut self, id: Uuid) -> Result<&mut Lead, AppError> {
        self.leads.iter_mut().find(|l| l.id == id).ok_or(AppError::LeadNotFound)
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // --- Carga das fontes externas (somente leitura para o CRM) ---

    pub fn add_registration(&self, record: EventRegistrationRecord) {
        self.state().registrations.push(record);
    }

    pub fn add_donation(&self, record: DonationRecord) {
        self.state().donations.push(record);
    }

    pub fn add_user_account(&self, account: UserAccount) {
        self.state().accounts.push(account);
    }

    pub fn outbox_snapshot(&self) -> Vec<OutboxMessage> {
        self.state().outbox.clone()
    }
}

fn key_matches(key: &IdentityKey, cpf: Option<&str>, email: Option<&str>) -> bool {
    key.matches(cpf, email)
}

// ===== LEADS =====

#[async_trait]
impl LeadStore for InMemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Lead>, AppError> {
        Ok(self.state().leads.iter().find(|l| l.id == id).cloned())
    }

    async fn find_active_by_cpf(&self, cpf: &str) -> Result<Option<Lead>, AppError> {
        let state = self.state();
        Ok(state
            .leads
            .iter()
            .find(|l| l.status != LeadStatus::Lost && l.cpf.as_deref() == Some(cpf))
            .cloned())
    }

    async fn find_active_by_email(&self, email: &str) -> Result<Option<Lead>, AppError> {
        let state = self.state();
        Ok(state
            .leads
            .iter()
            .filter(|l| l.status != LeadStatus::Lost)
            .filter(|l| l.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(email)))
            .min_by_key(|l| l.created_at)
            .cloned())
    }

    async fn find_by_key(&self, key: &IdentityKey) -> Result<Option<Lead>, AppError> {
        let state = self.state();
        Ok(state
            .leads
            .iter()
            .filter(|l| key_matches(key, l.cpf.as_deref(), l.email.as_deref()))
            .min_by_key(|l| (l.status == LeadStatus::Lost, l.created_at))
            .cloned())
    }

    async fn insert_lead(&self, lead: &NewLead) -> Result<Lead, AppError> {
        let mut state = self.state();
        state.check_lead_uniqueness(None, lead.cpf.as_deref(), lead.email.as_deref())?;

        let now = Utc::now();
        let created = Lead {
            id: Uuid::new_v4(),
            full_name: lead.full_name.clone(),
            email: lead.email.clone(),
            phone: lead.phone.clone(),
            cpf: lead.cpf.clone(),
            status: LeadStatus::New,
            source: lead.source.clone(),
            first_activity_type: lead.first_activity_type.clone(),
            first_activity_name: lead.first_activity_name.clone(),
            converted_user_id: None,
            converted_at: None,
            created_at: now,
            updated_at: now,
        };
        state.leads.push(created.clone());
        Ok(created)
    }

    async fn backfill_lead(&self, id: Uuid, patch: &LeadPatch) -> Result<Lead, AppError> {
        let mut state = self.state();
        let current = state.leads.iter().find(|l| l.id == id).cloned().ok_or(AppError::LeadNotFound)?;

        let cpf = current.cpf.clone().or_else(|| patch.cpf.clone());
        let email = current.email.clone().or_else(|| patch.email.clone());
        if current.status != LeadStatus::Lost {
            state.check_lead_uniqueness(Some(id), cpf.as_deref(), email.as_deref())?;
        }

        let lead = state.lead_mut(id)?;
        lead.full_name = lead.full_name.take().or_else(|| patch.full_name.clone());
        lead.phone = lead.phone.take().or_else(|| patch.phone.clone());
        lead.cpf = cpf;
        lead.email = email;
        lead.updated_at = Utc::now();
        Ok(lead.clone())
    }

    async fn update_status(&self, id: Uuid, status: LeadStatus) -> Result<Lead, AppError> {
        let mut state = self.state();
        let current = state.leads.iter().find(|l| l.id == id).cloned().ok_or(AppError::LeadNotFound)?;

        // Sair de "lost" volta a ocupar o índice parcial
        if status != LeadStatus::Lost && current.status == LeadStatus::Lost {
            state.check_lead_uniqueness(Some(id), current.cpf.as_deref(), current.email.as_deref())?;
        }

        let lead = state.lead_mut(id)?;
        lead.status = status;
        lead.updated_at = Utc::now();
        Ok(lead.clone())
    }

    async fn mark_converted(&self, id: Uuid, user_id: Option<Uuid>, at: DateTime<Utc>) -> Result<Lead, AppError> {
        let mut state = self.state();
        let current = state.leads.iter().find(|l| l.id == id).cloned().ok_or(AppError::LeadNotFound)?;

        if current.status == LeadStatus::Lost {
            state.check_lead_uniqueness(Some(id), current.cpf.as_deref(), current.email.as_deref())?;
        }

        let lead = state.lead_mut(id)?;
        lead.status = LeadStatus::Converted;
        lead.converted_user_id = lead.converted_user_id.or(user_id);
        lead.converted_at = lead.converted_at.or(Some(at));
        lead.updated_at = Utc::now();
        Ok(lead.clone())
    }

    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>, AppError> {
        let state = self.state();
        let search = filter.search.as_ref().map(|q| q.to_lowercase());
        let contains = |field: &Option<String>, q: &str| field.as_ref().is_some_and(|v| v.to_lowercase().contains(q));

        Ok(state
            .leads
            .iter()
            .rev()
            .filter(|l| filter.status.is_none_or(|s| l.status == s))
            .filter(|l| match &search {
                Some(q) => contains(&l.full_name, q) || contains(&l.email, q) || contains(&l.cpf, q),
                None => true,
            })
            .take(filter.limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn record_warning(&self, warning: &NewWarning) -> Result<ConsistencyWarning, AppError> {
        let recorded = ConsistencyWarning {
            id: Uuid::new_v4(),
            kind: warning.kind,
            lead_id: warning.lead_id,
            other_lead_id: warning.other_lead_id,
            details: warning.details.clone(),
            created_at: Utc::now(),
            resolved_at: None,
        };
        self.state().warnings.push(recorded.clone());
        Ok(recorded)
    }

    async fn list_warnings(&self, open_only: bool) -> Result<Vec<ConsistencyWarning>, AppError> {
        let state = self.state();
        Ok(state
            .warnings
            .iter()
            .rev()
            .filter(|w| !open_only || w.resolved_at.is_none())
            .cloned()
            .collect())
    }
}

// ===== INTERAÇÕES =====

#[async_trait]
impl InteractionStore for InMemoryStore {
    async fn insert_interaction(&self, interaction: &NewInteraction) -> Result<Interaction, AppError> {
        let created = Interaction {
            id: Uuid::new_v4(),
            lead_id: interaction.lead_id,
            user_id: interaction.user_id,
            cpf: interaction.cpf.clone(),
            email: interaction.email.clone(),
            interaction_type: interaction.interaction_type,
            channel: interaction.channel,
            description: interaction.description.clone(),
            metadata: interaction.metadata.clone(),
            created_at: Utc::now(),
        };
        self.state().interactions.push(created.clone());
        Ok(created)
    }

    async fn list_for_lead(&self, lead_id: Uuid) -> Result<Vec<Interaction>, AppError> {
        let state = self.state();
        Ok(state.interactions.iter().rev().filter(|i| i.lead_id == Some(lead_id)).cloned().collect())
    }

    async fn list_for_identity(&self, key: &IdentityKey, lead_id: Option<Uuid>) -> Result<Vec<Interaction>, AppError> {
        let state = self.state();
        Ok(state
            .interactions
            .iter()
            .filter(|i| {
                (lead_id.is_some() && i.lead_id == lead_id) || key_matches(key, i.cpf.as_deref(), i.email.as_deref())
            })
            .cloned()
            .collect())
    }

    async fn list_orphans(&self, limit: i64) -> Result<Vec<Interaction>, AppError> {
        let state = self.state();
        Ok(state
            .interactions
            .iter()
            .filter(|i| i.lead_id.is_none() && (i.cpf.is_some() || i.email.is_some()))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn attach_to_lead(&self, interaction_id: Uuid, lead_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state();
        match state.interactions.iter_mut().find(|i| i.id == interaction_id && i.lead_id.is_none()) {
            Some(interaction) => {
                interaction.lead_id = Some(lead_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ===== FUNIS E NEGÓCIOS =====

#[async_trait]
impl PipelineStore for InMemoryStore {
    async fn list_pipelines(&self) -> Result<Vec<Pipeline>, AppError> {
        let mut pipelines = self.state().pipelines.clone();
        pipelines.sort_by_key(|p| (!p.is_default, p.created_at));
        Ok(pipelines)
    }

    async fn find_pipeline(&self, id: Uuid) -> Result<Option<Pipeline>, AppError> {
        Ok(self.state().pipelines.iter().find(|p| p.id == id).cloned())
    }

    async fn find_default_pipeline(&self) -> Result<Option<Pipeline>, AppError> {
        Ok(self.state().pipelines.iter().find(|p| p.is_default).cloned())
    }

    async fn create_pipeline(&self, name: &str, is_default: bool, stages: &[NewStage]) -> Result<PipelineWithStages, AppError> {
        let mut state = self.state();
        if is_default && state.pipelines.iter().any(|p| p.is_default) {
            return Err(AppError::UniqueConstraintViolation("idx_pipelines_single_default".into()));
        }
        let now = Utc::now();

        let pipeline = Pipeline {
            id: Uuid::new_v4(),
            name: name.to_string(),
            is_default,
            created_at: now,
            updated_at: now,
        };

        let created: Vec<PipelineStage> = stages
            .iter()
            .enumerate()
            .map(|(position, stage)| PipelineStage {
                id: Uuid::new_v4(),
                pipeline_id: pipeline.id,
                name: stage.name.clone(),
                color: stage.color.clone(),
                position: position as i32,
                kind: stage.kind,
                created_at: now,
            })
            .collect();

        state.pipelines.push(pipeline.clone());
        state.stages.extend(created.iter().cloned());

        Ok(PipelineWithStages { pipeline, stages: created })
    }

    async fn list_stages(&self, pipeline_id: Uuid) -> Result<Vec<PipelineStage>, AppError> {
        let mut stages: Vec<PipelineStage> =
            self.state().stages.iter().filter(|s| s.pipeline_id == pipeline_id).cloned().collect();
        stages.sort_by_key(|s| s.position);
        Ok(stages)
    }

    async fn find_stage(&self, id: Uuid) -> Result<Option<PipelineStage>, AppError> {
        Ok(self.state().stages.iter().find(|s| s.id == id).cloned())
    }

    async fn append_stage(&self, pipeline_id: Uuid, stage: &NewStage) -> Result<PipelineStage, AppError> {
        let mut state = self.state();
        let position = state
            .stages
            .iter()
            .filter(|s| s.pipeline_id == pipeline_id)
            .map(|s| s.position + 1)
            .max()
            .unwrap_or(0);

        let created = PipelineStage {
            id: Uuid::new_v4(),
            pipeline_id,
            name: stage.name.clone(),
            color: stage.color.clone(),
            position,
            kind: stage.kind,
            created_at: Utc::now(),
        };
        state.stages.push(created.clone());
        Ok(created)
    }

    async fn list_deals(&self, pipeline_id: Uuid) -> Result<Vec<Deal>, AppError> {
        Ok(self.state().deals.iter().filter(|d| d.pipeline_id == pipeline_id).cloned().collect())
    }

    async fn find_deal(&self, id: Uuid) -> Result<Option<Deal>, AppError> {
        Ok(self.state().deals.iter().find(|d| d.id == id).cloned())
    }

    async fn find_open_deal(&self, lead_id: Uuid, product_id: &str) -> Result<Option<Deal>, AppError> {
        let state = self.state();
        Ok(state
            .deals
            .iter()
            .find(|d| d.lead_id == lead_id && d.product_id.as_deref() == Some(product_id) && !d.is_closed())
            .cloned())
    }

    async fn insert_deal(&self, deal: &NewDeal) -> Result<Deal, AppError> {
        let mut state = self.state();

        if let Some(product_id) = deal.product_id.as_deref() {
            let taken = state
                .deals
                .iter()
                .any(|d| d.lead_id == deal.lead_id && d.product_id.as_deref() == Some(product_id) && !d.is_closed());
            if taken {
                return Err(AppError::DuplicateIdentity(DEALS_OPEN_INDEX.into()));
            }
        }

        let now = Utc::now();
        let created = Deal {
            id: Uuid::new_v4(),
            lead_id: deal.lead_id,
            user_id: deal.user_id,
            title: deal.title.clone(),
            value: deal.value,
            pipeline_id: deal.pipeline_id,
            stage_id: deal.stage_id,
            product_id: deal.product_id.clone(),
            referral_code: deal.referral_code.clone(),
            won: None,
            closed_at: None,
            metadata: deal.metadata.clone(),
            created_at: now,
            updated_at: now,
        };
        state.deals.push(created.clone());
        Ok(created)
    }

    async fn refresh_open_deal(
        &self,
        id: Uuid,
        value: Decimal,
        referral_code: Option<&str>,
        metadata: &DealMetadata,
    ) -> Result<Option<Deal>, AppError> {
        let mut state = self.state();
        let Some(deal) = state.deals.iter_mut().find(|d| d.id == id && !d.is_closed()) else {
            return Ok(None);
        };

        deal.value = value;
        if deal.referral_code.is_none() {
            deal.referral_code = referral_code.map(str::to_string);
        }
        // Mesma semântica do `metadata || $4` do Postgres
        if metadata.installments.is_some() {
            deal.metadata.installments = metadata.installments;
        }
        if metadata.source_interaction_id.is_some() {
            deal.metadata.source_interaction_id = metadata.source_interaction_id;
        }
        if metadata.event_id.is_some() {
            deal.metadata.event_id = metadata.event_id.clone();
        }
        deal.metadata.extra.extend(metadata.extra.clone());
        deal.updated_at = Utc::now();

        Ok(Some(deal.clone()))
    }

    async fn apply_transition(&self, deal_id: Uuid, transition: &StageTransition) -> Result<Option<Deal>, AppError> {
        let mut state = self.state();
        let Some(deal) = state.deals.iter_mut().find(|d| d.id == deal_id && !d.is_closed()) else {
            return Ok(None);
        };

        deal.stage_id = transition.stage_id;
        deal.won = transition.won;
        deal.closed_at = transition.closed_at;
        deal.updated_at = Utc::now();
        Ok(Some(deal.clone()))
    }

    async fn delete_deal(&self, id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state();
        let before = state.deals.len();
        state.deals.retain(|d| d.id != id);
        Ok(state.deals.len() != before)
    }
}

// ===== FONTES DA JORNADA =====

#[async_trait]
impl JourneySourceStore for InMemoryStore {
    async fn registrations_for(&self, key: &IdentityKey) -> Result<Vec<EventRegistrationRecord>, AppError> {
        let state = self.state();
        Ok(state
            .registrations
            .iter()
            .filter(|r| key_matches(key, r.cpf.as_deref(), r.email.as_deref()))
            .cloned()
            .collect())
    }

    async fn donations_for(&self, key: &IdentityKey) -> Result<Vec<DonationRecord>, AppError> {
        let state = self.state();
        Ok(state
            .donations
            .iter()
            .filter(|d| key_matches(key, d.cpf.as_deref(), d.email.as_deref()))
            .cloned()
            .collect())
    }

    async fn user_account_for(&self, key: &IdentityKey) -> Result<Option<UserAccount>, AppError> {
        let state = self.state();
        Ok(state
            .accounts
            .iter()
            .filter(|a| key_matches(key, a.cpf.as_deref(), a.email.as_deref()))
            .min_by_key(|a| a.created_at)
            .cloned())
    }
}

// ===== INDICAÇÕES =====

#[async_trait]
impl ReferralStore for InMemoryStore {
    async fn insert_ambassador(&self, ambassador: &NewAmbassador) -> Result<Ambassador, AppError> {
        let mut state = self.state();
        if state.ambassadors.iter().any(|a| a.code.eq_ignore_ascii_case(&ambassador.code)) {
            return Err(AppError::UniqueConstraintViolation("ambassadors_code_key".into()));
        }

        let now = Utc::now();
        let created = Ambassador {
            id: Uuid::new_v4(),
            code: ambassador.code.clone(),
            name: ambassador.name.clone(),
            email: ambassador.email.clone(),
            commission_rate: ambassador.commission_rate,
            total_clicks: 0,
            total_conversions: 0,
            total_earnings: Decimal::ZERO,
            payment_preference: ambassador.payment_preference,
            pix_key: ambassador.pix_key.clone(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        state.ambassadors.push(created.clone());
        Ok(created)
    }

    async fn find_ambassador(&self, id: Uuid) -> Result<Option<Ambassador>, AppError> {
        Ok(self.state().ambassadors.iter().find(|a| a.id == id).cloned())
    }

    async fn find_ambassador_by_code(&self, code: &str) -> Result<Option<Ambassador>, AppError> {
        Ok(self.state().ambassadors.iter().find(|a| a.code.eq_ignore_ascii_case(code)).cloned())
    }

    async fn list_ambassadors(&self) -> Result<Vec<Ambassador>, AppError> {
        let mut ambassadors = self.state().ambassadors.clone();
        ambassadors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(ambassadors)
    }

    async fn record_click(&self, ambassador_id: Uuid, attribution: &ClickAttribution) -> Result<ReferralClick, AppError> {
        let mut state = self.state();
        let ambassador = state
            .ambassadors
            .iter_mut()
            .find(|a| a.id == ambassador_id)
            .ok_or(AppError::AmbassadorNotFound)?;
        ambassador.total_clicks += 1;
        ambassador.updated_at = Utc::now();

        let click = ReferralClick {
            id: Uuid::new_v4(),
            ambassador_id,
            utm_source: attribution.utm_source.clone(),
            utm_medium: attribution.utm_medium.clone(),
            utm_campaign: attribution.utm_campaign.clone(),
            utm_content: attribution.utm_content.clone(),
            landing_page: attribution.landing_page.clone(),
            referrer: attribution.referrer.clone(),
            created_at: Utc::now(),
        };
        state.clicks.push(click.clone());
        Ok(click)
    }

    async fn find_commission_for_deal(&self, deal_id: Uuid) -> Result<Option<Commission>, AppError> {
        Ok(self.state().commissions.iter().find(|c| c.deal_id == deal_id).cloned())
    }

    async fn insert_commission(&self, commission: &NewCommission) -> Result<(Commission, bool), AppError> {
        let mut state = self.state();
        if let Some(existing) = state.commissions.iter().find(|c| c.deal_id == commission.deal_id) {
            return Ok((existing.clone(), false));
        }

        let created = Commission {
            id: Uuid::new_v4(),
            ambassador_id: commission.ambassador_id,
            deal_id: commission.deal_id,
            sale_amount: commission.sale_amount,
            commission_rate: commission.commission_rate,
            commission_amount: commission.commission_amount,
            payout_id: None,
            created_at: Utc::now(),
        };
        state.commissions.push(created.clone());

        if let Some(ambassador) = state.ambassadors.iter_mut().find(|a| a.id == commission.ambassador_id) {
            ambassador.total_conversions += 1;
            ambassador.updated_at = Utc::now();
        }

        Ok((created, true))
    }

    async fn payable_commissions(
        &self,
        ambassador_id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Vec<Commission>, AppError> {
        let state = self.state();
        let deal_won = |deal_id: Uuid| state.deals.iter().any(|d| d.id == deal_id && d.won == Some(true));

        Ok(state
            .commissions
            .iter()
            .filter(|c| c.ambassador_id == ambassador_id && c.payout_id.is_none())
            .filter(|c| c.created_at >= period_start && c.created_at < period_end)
            .filter(|c| deal_won(c.deal_id))
            .cloned()
            .collect())
    }

    async fn create_payout(&self, payout: &NewPayout, commission_ids: &[Uuid]) -> Result<Payout, AppError> {
        let mut state = self.state();

        let all_free = commission_ids
            .iter()
            .all(|id| state.commissions.iter().any(|c| c.id == *id && c.payout_id.is_none()));
        if !all_free {
            return Err(AppError::UniqueConstraintViolation("referral_commissions.payout_id".into()));
        }

        let now = Utc::now();
        let created = Payout {
            id: Uuid::new_v4(),
            ambassador_id: payout.ambassador_id,
            period_start: payout.period_start,
            period_end: payout.period_end,
            sales_count: payout.sales_count,
            gross_amount: payout.gross_amount,
            net_amount: payout.net_amount,
            status: PayoutStatus::Pending,
            paid_at: None,
            notified_at: None,
            created_at: now,
            updated_at: now,
        };

        for commission in state.commissions.iter_mut().filter(|c| commission_ids.contains(&c.id)) {
            commission.payout_id = Some(created.id);
        }
        state.payouts.push(created.clone());

        Ok(created)
    }

    async fn find_payout(&self, id: Uuid) -> Result<Option<Payout>, AppError> {
        Ok(self.state().payouts.iter().find(|p| p.id == id).cloned())
    }

    async fn list_payouts(&self, ambassador_id: Uuid) -> Result<Vec<Payout>, AppError> {
        let mut payouts: Vec<Payout> =
            self.state().payouts.iter().filter(|p| p.ambassador_id == ambassador_id).cloned().collect();
        payouts.sort_by(|a, b| b.period_start.cmp(&a.period_start));
        Ok(payouts)
    }

    async fn transition_payout(
        &self,
        id: Uuid,
        from: PayoutStatus,
        to: PayoutStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Payout>, AppError> {
        let mut state = self.state();
        let Some(payout) = state.payouts.iter_mut().find(|p| p.id == id && p.status == from) else {
            return Ok(None);
        };

        payout.status = to;
        if to == PayoutStatus::Paid {
            payout.paid_at = Some(at);
        }
        payout.updated_at = Utc::now();
        let updated = payout.clone();

        match to {
            PayoutStatus::Cancelled => {
                for commission in state.commissions.iter_mut().filter(|c| c.payout_id == Some(id)) {
                    commission.payout_id = None;
                }
            }
            PayoutStatus::Paid => {
                if let Some(ambassador) = state.ambassadors.iter_mut().find(|a| a.id == updated.ambassador_id) {
                    ambassador.total_earnings += updated.net_amount;
                    ambassador.updated_at = Utc::now();
                }
            }
            _ => {}
        }

        Ok(Some(updated))
    }

    async fn mark_payout_notified(&self, id: Uuid, at: DateTime<Utc>) -> Result<Payout, AppError> {
        let mut state = self.state();
        let payout = state.payouts.iter_mut().find(|p| p.id == id).ok_or(AppError::PayoutNotFound)?;
        payout.notified_at = Some(at);
        payout.updated_at = Utc::now();
        Ok(payout.clone())
    }
}

// ===== OUTBOX =====

#[async_trait]
impl OutboxStore for InMemoryStore {
    async fn enqueue(&self, message: &NewOutboxMessage) -> Result<OutboxMessage, AppError> {
        let now = Utc::now();
        let created = OutboxMessage {
            id: Uuid::new_v4(),
            kind: message.kind.clone(),
            recipient: message.recipient.clone(),
            subject: message.subject.clone(),
            html_body: message.html_body.clone(),
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            next_attempt_at: now,
            created_at: now,
            sent_at: None,
        };
        self.state().outbox.push(created.clone());
        Ok(created)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<OutboxMessage>, AppError> {
        let mut state = self.state();
        let mut claimed = Vec::new();
        for message in state
            .outbox
            .iter_mut()
            .filter(|m| m.status == OutboxStatus::Pending && m.next_attempt_at <= now)
            .take(limit.max(0) as usize)
        {
            message.next_attempt_at = lease_until;
            claimed.push(message.clone());
        }
        Ok(claimed)
    }

    async fn mark_sent(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(message) = self.state().outbox.iter_mut().find(|m| m.id == id) {
            message.status = OutboxStatus::Sent;
            message.attempts += 1;
            message.sent_at = Some(at);
            message.last_error = None;
        }
        Ok(())
    }

    async fn mark_retry(&self, id: Uuid, error: &str, next_attempt_at: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(message) = self.state().outbox.iter_mut().find(|m| m.id == id) {
            message.attempts += 1;
            message.last_error = Some(error.to_string());
            message.next_attempt_at = next_attempt_at;
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), AppError> {
        if let Some(message) = self.state().outbox.iter_mut().find(|m| m.id == id) {
            message.status = OutboxStatus::Failed;
            message.attempts += 1;
            message.last_error = Some(error.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_lead(cpf: Option<&str>, email: Option<&str>) -> NewLead {
        NewLead {
            cpf: cpf.map(str::to_string),
            email: email.map(str::to_string),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn active_cpf_is_unique_but_lost_leads_free_it() {
        let store = InMemoryStore::new();
        let first = store.insert_lead(&new_lead(Some("52998224725"), None)).await.unwrap();

        let err = store.insert_lead(&new_lead(Some("52998224725"), None)).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateIdentity(ref idx) if idx == LEADS_CPF_INDEX));

        store.update_status(first.id, LeadStatus::Lost).await.unwrap();
        assert!(store.insert_lead(&new_lead(Some("52998224725"), None)).await.is_ok());

        // Reativar o perdido agora colide com o novo
        let err = store.update_status(first.id, LeadStatus::Contacted).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateIdentity(_)));
    }

    #[tokio::test]
    async fn converting_a_lost_lead_respects_active_identities() {
        let store = InMemoryStore::new();
        let lost = store.insert_lead(&new_lead(Some("52998224725"), None)).await.unwrap();
        store.update_status(lost.id, LeadStatus::Lost).await.unwrap();
        store.insert_lead(&new_lead(Some("52998224725"), None)).await.unwrap();

        let err = store.mark_converted(lost.id, None, Utc::now()).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateIdentity(ref idx) if idx == LEADS_CPF_INDEX));
        assert_eq!(store.find_by_id(lost.id).await.unwrap().unwrap().status, LeadStatus::Lost);
    }

    #[tokio::test]
    async fn claimed_messages_are_hidden_until_the_lease_ends() {
        let store = InMemoryStore::new();
        let message = NewOutboxMessage {
            kind: "payout_paid".into(),
            recipient: "lucia@email.com".into(),
            subject: "Repasse pago".into(),
            html_body: "<p>ok</p>".into(),
        };
        store.enqueue(&message).await.unwrap();

        let now = Utc::now();
        let lease = now + chrono::Duration::minutes(5);
        assert_eq!(store.claim_due(now, lease, 10).await.unwrap().len(), 1);
        assert!(store.claim_due(now, lease, 10).await.unwrap().is_empty());

        // Lease vencida: volta a ser entregue
        assert_eq!(store.claim_due(lease, lease + chrono::Duration::minutes(5), 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn backfill_never_overwrites() {
        let store = InMemoryStore::new();
        let lead = store.insert_lead(&new_lead(None, Some("a@b.com"))).await.unwrap();

        let patch = LeadPatch {
            email: Some("outro@b.com".into()),
            phone: Some("11999998888".into()),
            ..Default::default()
        };
        let updated = store.backfill_lead(lead.id, &patch).await.unwrap();
        assert_eq!(updated.email.as_deref(), Some("a@b.com"));
        assert_eq!(updated.phone.as_deref(), Some("11999998888"));
    }

    #[tokio::test]
    async fn stage_positions_are_contiguous() {
        let store = InMemoryStore::new();
        let stage = |name: &str| NewStage { name: name.into(), color: None, kind: None };
        let created = store.create_pipeline("Funil", false, &[stage("A"), stage("B")]).await.unwrap();
        let appended = store.append_stage(created.pipeline.id, &stage("C")).await.unwrap();
        assert_eq!(appended.position, 2);

        let positions: Vec<i32> =
            store.list_stages(created.pipeline.id).await.unwrap().iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }
}
