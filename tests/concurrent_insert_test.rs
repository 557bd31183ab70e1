// Outro pedido grava o mesmo lead/negócio entre a busca e o INSERT.
// Os wrappers abaixo reproduzem isso: o primeiro INSERT grava pelo store
// interno e mesmo assim devolve a violação do índice único.
mod common;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{FakeMailer, FakePayments, CPF_A};
use crm_backend::{
    common::{
        db_utils::{DEALS_OPEN_INDEX, LEADS_CPF_INDEX},
        error::AppError,
        i18n::I18nStore,
    },
    config::{AppState, Stores},
    db::{lead_repo::LeadFilter, InMemoryStore, LeadStore, PipelineStore},
    models::{
        lead::{ConsistencyWarning, IdentityCandidate, IdentityKey, Lead, LeadPatch, LeadStatus, MatchKey, NewLead, NewWarning},
        pipeline::{
            Deal, DealMetadata, NewDeal, NewStage, OpenDealRequest, Pipeline, PipelineStage, PipelineWithStages,
            StageTransition,
        },
    },
    services::{collaborators::PaymentProvider, outbox_service::RetryPolicy},
};
use rust_decimal::Decimal;
use uuid::Uuid;

struct RacingLeads {
    inner: Arc<InMemoryStore>,
    raced: AtomicBool,
}

#[async_trait]
impl LeadStore for RacingLeads {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Lead>, AppError> {
        self.inner.find_by_id(id).await
    }
    async fn find_active_by_cpf(&self, cpf: &str) -> Result<Option<Lead>, AppError> {
        self.inner.find_active_by_cpf(cpf).await
    }
    async fn find_active_by_email(&self, email: &str) -> Result<Option<Lead>, AppError> {
        self.inner.find_active_by_email(email).await
    }
    async fn find_by_key(&self, key: &IdentityKey) -> Result<Option<Lead>, AppError> {
        self.inner.find_by_key(key).await
    }
    async fn insert_lead(&self, lead: &NewLead) -> Result<Lead, AppError> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            self.inner.insert_lead(lead).await?;
            return Err(AppError::DuplicateIdentity(LEADS_CPF_INDEX.into()));
        }
        self.inner.insert_lead(lead).await
    }
    async fn backfill_lead(&self, id: Uuid, patch: &LeadPatch) -> Result<Lead, AppError> {
        self.inner.backfill_lead(id, patch).await
    }
    async fn update_status(&self, id: Uuid, status: LeadStatus) -> Result<Lead, AppError> {
        self.inner.update_status(id, status).await
    }
    async fn mark_converted(&self, id: Uuid, user_id: Option<Uuid>, at: DateTime<Utc>) -> Result<Lead, AppError> {
        self.inner.mark_converted(id, user_id, at).await
    }
    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>, AppError> {
        self.inner.list_leads(filter).await
    }
    async fn record_warning(&self, warning: &NewWarning) -> Result<ConsistencyWarning, AppError> {
        self.inner.record_warning(warning).await
    }
    async fn list_warnings(&self, open_only: bool) -> Result<Vec<ConsistencyWarning>, AppError> {
        self.inner.list_warnings(open_only).await
    }
}

struct RacingDeals {
    inner: Arc<InMemoryStore>,
    raced: AtomicBool,
}

#[async_trait]
impl PipelineStore for RacingDeals {
    async fn list_pipelines(&self) -> Result<Vec<Pipeline>, AppError> {
        self.inner.list_pipelines().await
    }
    async fn find_pipeline(&self, id: Uuid) -> Result<Option<Pipeline>, AppError> {
        self.inner.find_pipeline(id).await
    }
    async fn find_default_pipeline(&self) -> Result<Option<Pipeline>, AppError> {
        self.inner.find_default_pipeline().await
    }
    async fn create_pipeline(&self, name: &str, is_default: bool, stages: &[NewStage]) -> Result<PipelineWithStages, AppError> {
        self.inner.create_pipeline(name, is_default, stages).await
    }
    async fn list_stages(&self, pipeline_id: Uuid) -> Result<Vec<PipelineStage>, AppError> {
        self.inner.list_stages(pipeline_id).await
    }
    async fn find_stage(&self, id: Uuid) -> Result<Option<PipelineStage>, AppError> {
        self.inner.find_stage(id).await
    }
    async fn append_stage(&self, pipeline_id: Uuid, stage: &NewStage) -> Result<PipelineStage, AppError> {
        self.inner.append_stage(pipeline_id, stage).await
    }
    async fn list_deals(&self, pipeline_id: Uuid) -> Result<Vec<Deal>, AppError> {
        self.inner.list_deals(pipeline_id).await
    }
    async fn find_deal(&self, id: Uuid) -> Result<Option<Deal>, AppError> {
        self.inner.find_deal(id).await
    }
    async fn find_open_deal(&self, lead_id: Uuid, product_id: &str) -> Result<Option<Deal>, AppError> {
        self.inner.find_open_deal(lead_id, product_id).await
    }
    async fn insert_deal(&self, deal: &NewDeal) -> Result<Deal, AppError> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            self.inner.insert_deal(deal).await?;
            return Err(AppError::DuplicateIdentity(DEALS_OPEN_INDEX.into()));
        }
        self.inner.insert_deal(deal).await
    }
    async fn refresh_open_deal(
        &self,
        id: Uuid,
        value: Decimal,
        referral_code: Option<&str>,
        metadata: &DealMetadata,
    ) -> Result<Option<Deal>, AppError> {
        self.inner.refresh_open_deal(id, value, referral_code, metadata).await
    }
    async fn apply_transition(&self, deal_id: Uuid, transition: &StageTransition) -> Result<Option<Deal>, AppError> {
        self.inner.apply_transition(deal_id, transition).await
    }
    async fn delete_deal(&self, id: Uuid) -> Result<bool, AppError> {
        self.inner.delete_deal(id).await
    }
}

fn racing_app(store: Arc<InMemoryStore>) -> AppState {
    let mut stores = Stores::in_memory(store.clone());
    stores.leads = Arc::new(RacingLeads { inner: store.clone(), raced: AtomicBool::new(false) });
    stores.pipelines = Arc::new(RacingDeals { inner: store, raced: AtomicBool::new(false) });

    AppState::build(
        None,
        stores,
        Some(Arc::new(FakePayments::default()) as Arc<dyn PaymentProvider>),
        Arc::new(FakeMailer::default()),
        RetryPolicy::default(),
        Arc::new(I18nStore::load().unwrap()),
    )
}

#[tokio::test]
async fn lost_insert_race_falls_back_to_lookup() {
    let store = Arc::new(InMemoryStore::new());
    let state = racing_app(store.clone());

    let candidate = IdentityCandidate { cpf: Some(CPF_A.into()), full_name: Some("Rita".into()), ..Default::default() };
    let resolution = state.identity_service.resolve(&candidate).await.unwrap();

    assert!(!resolution.created);
    assert_eq!(resolution.matched_by, Some(MatchKey::Cpf));
    assert_eq!(resolution.lead.cpf.as_deref(), Some(CPF_A));

    let all = store.list_leads(&LeadFilter { limit: 100, ..Default::default() }).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, resolution.lead.id);
}

#[tokio::test]
async fn lost_deal_insert_race_reuses_the_open_deal() {
    let store = Arc::new(InMemoryStore::new());
    let state = racing_app(store.clone());

    let candidate = IdentityCandidate { cpf: Some(CPF_A.into()), ..Default::default() };
    let lead = state.identity_service.resolve(&candidate).await.unwrap().lead;

    let deal = state
        .pipeline_service
        .find_or_create_open_deal(&OpenDealRequest {
            lead_id: lead.id,
            user_id: None,
            product_id: "curso-lideranca".into(),
            title: None,
            value: Decimal::from(120),
            referral_code: None,
            metadata: DealMetadata::default(),
        })
        .await
        .unwrap();

    let stored = store.find_open_deal(lead.id, "curso-lideranca").await.unwrap().unwrap();
    assert_eq!(deal.id, stored.id);
    assert_eq!(store.list_deals(deal.pipeline_id).await.unwrap().len(), 1);
}
