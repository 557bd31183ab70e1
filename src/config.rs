// src/config.rs

use std::{env, sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    common::i18n::I18nStore,
    db::{
        InMemoryStore, InteractionRepository, InteractionStore, JourneyRepository, JourneySourceStore,
        LeadRepository, LeadStore, OutboxRepository, OutboxStore, PipelineRepository, PipelineStore,
        ReferralRepository, ReferralStore,
    },
    services::{
        collaborators::{HttpMailer, HttpPaymentProvider, LogMailer, Mailer, PaymentProvider},
        identity_service::IdentityService,
        interaction_service::InteractionService,
        journey_service::JourneyService,
        outbox_service::{OutboxService, RetryPolicy},
        pipeline_service::PipelineService,
        referral_service::ReferralService,
        touchpoint_service::TouchpointService,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Postgres,
    Memory,
}

/// Tudo que vem do ambiente (.env), lido uma vez na subida.
#[derive(Debug, Clone)]
pub struct Settings {
    pub storage: StorageKind,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub bind_addr: String,
    pub payment_api_url: Option<String>,
    pub payment_api_key: Option<String>,
    pub mailer_webhook_url: Option<String>,
    // 0 = despachante desligado
    pub outbox_dispatch_secs: u64,
    pub outbox_max_attempts: i32,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let storage = match optional("CRM_STORAGE").as_deref() {
            None | Some("postgres") => StorageKind::Postgres,
            Some("memory") => StorageKind::Memory,
            Some(other) => anyhow::bail!("CRM_STORAGE inválido: '{}' (use 'postgres' ou 'memory')", other),
        };

        let database_url = optional("DATABASE_URL");
        if storage == StorageKind::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL deve ser definida");
        }

        Ok(Self {
            storage,
            database_url,
            db_max_connections: parsed("DB_MAX_CONNECTIONS", 5)?,
            bind_addr: optional("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            payment_api_url: optional("PAYMENT_API_URL"),
            payment_api_key: optional("PAYMENT_API_KEY"),
            mailer_webhook_url: optional("MAILER_WEBHOOK_URL"),
            outbox_dispatch_secs: parsed("OUTBOX_DISPATCH_SECS", 0)?,
            outbox_max_attempts: parsed("OUTBOX_MAX_ATTEMPTS", 5)?,
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(key) {
        Some(raw) => raw.parse().with_context(|| format!("{} inválida: '{}'", key, raw)),
        None => Ok(default),
    }
}

/// As implementações de armazenamento usadas pelos serviços.
#[derive(Clone)]
pub struct Stores {
    pub leads: Arc<dyn LeadStore>,
    pub interactions: Arc<dyn InteractionStore>,
    pub pipelines: Arc<dyn PipelineStore>,
    pub sources: Arc<dyn JourneySourceStore>,
    pub referrals: Arc<dyn ReferralStore>,
    pub outbox: Arc<dyn OutboxStore>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            leads: Arc::new(LeadRepository::new(pool.clone())),
            interactions: Arc::new(InteractionRepository::new(pool.clone())),
            pipelines: Arc::new(PipelineRepository::new(pool.clone())),
            sources: Arc::new(JourneyRepository::new(pool.clone())),
            referrals: Arc::new(ReferralRepository::new(pool.clone())),
            outbox: Arc::new(OutboxRepository::new(pool)),
        }
    }

    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            leads: store.clone(),
            interactions: store.clone(),
            pipelines: store.clone(),
            sources: store.clone(),
            referrals: store.clone(),
            outbox: store,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    // None quando rodando em memória
    pub db_pool: Option<PgPool>,
    pub i18n_store: Arc<I18nStore>,

    pub identity_service: IdentityService,
    pub interaction_service: InteractionService,
    pub pipeline_service: PipelineService,
    pub journey_service: JourneyService,
    pub referral_service: ReferralService,
    pub touchpoint_service: TouchpointService,
    pub outbox_service: OutboxService,
}

impl AppState {
    pub async fn new(settings: &Settings) -> anyhow::Result<Self> {
        let i18n_store = Arc::new(I18nStore::load()?);

        let (db_pool, stores) = match settings.storage {
            StorageKind::Postgres => {
                let database_url = settings.database_url.as_deref().context("DATABASE_URL deve ser definida")?;
                let pool = PgPoolOptions::new()
                    .max_connections(settings.db_max_connections)
                    .acquire_timeout(Duration::from_secs(3))
                    .connect(database_url)
                    .await?;

                tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");
                (Some(pool.clone()), Stores::postgres(pool))
            }
            StorageKind::Memory => {
                tracing::warn!("⚠️ Rodando com armazenamento em memória: nada será persistido");
                (None, Stores::in_memory(Arc::new(InMemoryStore::new())))
            }
        };

        let payments: Option<Arc<dyn PaymentProvider>> =
            match (&settings.payment_api_url, &settings.payment_api_key) {
                (Some(url), Some(key)) => Some(Arc::new(HttpPaymentProvider::new(url.clone(), key.clone()))),
                _ => {
                    tracing::info!("Gateway de pagamento não configurado: compras seguem sem cobrança");
                    None
                }
            };

        let mailer: Arc<dyn Mailer> = match &settings.mailer_webhook_url {
            Some(url) => Arc::new(HttpMailer::new(url.clone())),
            None => Arc::new(LogMailer),
        };

        let policy = RetryPolicy { max_attempts: settings.outbox_max_attempts, ..RetryPolicy::default() };

        Ok(Self::build(db_pool, stores, payments, mailer, policy, i18n_store))
    }

    /// Monta o gráfico de dependências a partir dos stores e colaboradores.
    pub fn build(
        db_pool: Option<PgPool>,
        stores: Stores,
        payments: Option<Arc<dyn PaymentProvider>>,
        mailer: Arc<dyn Mailer>,
        policy: RetryPolicy,
        i18n_store: Arc<I18nStore>,
    ) -> Self {
        let outbox_service = OutboxService::new(stores.outbox.clone(), mailer, policy);
        let identity_service = IdentityService::new(stores.leads.clone());
        let interaction_service = InteractionService::new(stores.interactions.clone(), stores.leads.clone());
        let referral_service = ReferralService::new(
            stores.referrals.clone(),
            stores.pipelines.clone(),
            outbox_service.clone(),
            i18n_store.clone(),
        );
        let pipeline_service = PipelineService::new(
            stores.pipelines.clone(),
            stores.leads.clone(),
            interaction_service.clone(),
            referral_service.clone(),
        );
        let journey_service =
            JourneyService::new(stores.leads.clone(), stores.interactions.clone(), stores.sources.clone());
        let touchpoint_service = TouchpointService::new(
            identity_service.clone(),
            interaction_service.clone(),
            pipeline_service.clone(),
            payments,
        );

        Self {
            db_pool,
            i18n_store,
            identity_service,
            interaction_service,
            pipeline_service,
            journey_service,
            referral_service,
            touchpoint_service,
            outbox_service,
        }
    }

    /// Estado em memória, sem gateway e com e-mails só no log.
    pub fn in_memory(store: Arc<InMemoryStore>) -> anyhow::Result<Self> {
        Ok(Self::build(
            None,
            Stores::in_memory(store),
            None,
            Arc::new(LogMailer),
            RetryPolicy::default(),
            Arc::new(I18nStore::load()?),
        ))
    }
}
