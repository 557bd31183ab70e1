// Utilitários compartilhados pelos testes de integração.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use crm_backend::{
    common::{error::AppError, i18n::I18nStore},
    config::{AppState, Stores},
    db::InMemoryStore,
    services::{
        collaborators::{Charge, ChargeRequest, CustomerProfile, Mailer, PaymentProvider},
        outbox_service::RetryPolicy,
    },
};

pub const CPF_A: &str = "52998224725";
pub const CPF_B: &str = "11144477735";
pub const CPF_C: &str = "39053344705";

/// Gateway falso: guarda as cobranças pedidas e devolve um link fixo.
#[derive(Default)]
pub struct FakePayments {
    pub charges: Mutex<Vec<ChargeRequest>>,
    pub fail: bool,
}

#[async_trait]
impl PaymentProvider for FakePayments {
    async fn create_customer(&self, profile: &CustomerProfile) -> Result<String, AppError> {
        if self.fail {
            return Err(AppError::CollaboratorFailure("gateway fora do ar".into()));
        }
        Ok(format!("cus_{}", profile.name.len()))
    }

    async fn create_charge(&self, request: &ChargeRequest) -> Result<Charge, AppError> {
        let mut charges = self.charges.lock().unwrap();
        charges.push(request.clone());
        Ok(Charge {
            id: format!("pay_{}", charges.len()),
            checkout_url: Some(format!("https://pagamento.test/c/{}", request.external_reference)),
        })
    }
}

/// Mailer falso: registra os envios; pode falhar de propósito.
#[derive(Default)]
pub struct FakeMailer {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, to: &str, subject: &str, _html: &str) -> Result<(), AppError> {
        if self.fail {
            return Err(AppError::CollaboratorFailure("smtp recusou".into()));
        }
        self.sent.lock().unwrap().push((to.to_string(), subject.to_string()));
        Ok(())
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub payments: Arc<FakePayments>,
    pub mailer: Arc<FakeMailer>,
}

pub fn test_app() -> TestApp {
    build(FakePayments::default(), FakeMailer::default())
}

pub fn build(payments: FakePayments, mailer: FakeMailer) -> TestApp {
    let store = Arc::new(InMemoryStore::new());
    let payments = Arc::new(payments);
    let mailer = Arc::new(mailer);

    let state = AppState::build(
        None,
        Stores::in_memory(store.clone()),
        Some(payments.clone() as Arc<dyn PaymentProvider>),
        mailer.clone(),
        RetryPolicy::default(),
        Arc::new(I18nStore::load().unwrap()),
    );

    TestApp { state, store, payments, mailer }
}
