// src/services/outbox_service.rs

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::{
    common::error::AppError,
    db::outbox_repo::OutboxStore,
    models::outbox::{DispatchReport, NewOutboxMessage, OutboxMessage},
    services::collaborators::Mailer,
};

// Tempo que uma mensagem reservada fica invisível para outro despachante
const CLAIM_LEASE_SECS: i64 = 300;

fn claim_lease() -> chrono::Duration {
    chrono::Duration::seconds(CLAIM_LEASE_SECS)
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    // Espera antes da tentativa n = n * base_delay
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 5, base_delay: Duration::from_secs(60) }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempts: i32) -> chrono::Duration {
        let base = chrono::Duration::from_std(self.base_delay).unwrap_or_else(|_| chrono::Duration::seconds(60));
        base * attempts.max(1)
    }
}

#[derive(Clone)]
pub struct OutboxService {
    store: Arc<dyn OutboxStore>,
    mailer: Arc<dyn Mailer>,
    policy: RetryPolicy,
}

impl OutboxService {
    pub fn new(store: Arc<dyn OutboxStore>, mailer: Arc<dyn Mailer>, policy: RetryPolicy) -> Self {
        Self { store, mailer, policy }
    }

    pub async fn enqueue(&self, kind: &str, to: &str, subject: &str, html: &str) -> Result<OutboxMessage, AppError> {
        let message = NewOutboxMessage {
            kind: kind.to_string(),
            recipient: to.to_string(),
            subject: subject.to_string(),
            html_body: html.to_string(),
        };
        self.store.enqueue(&message).await
    }

    /// Envia o que está vencido. Falha reagenda (espera linear) até o limite
    /// de tentativas; depois disso a mensagem fica como `failed`.
    pub async fn dispatch_pending(&self, limit: i64) -> Result<DispatchReport, AppError> {
        let now = Utc::now();
        let due = self.store.claim_due(now, now + claim_lease(), limit).await?;
        let mut report = DispatchReport::default();

        for message in due {
            match self.mailer.send(&message.recipient, &message.subject, &message.html_body).await {
                Ok(()) => {
                    self.store.mark_sent(message.id, Utc::now()).await?;
                    report.sent += 1;
                }
                Err(e) => {
                    let attempts = message.attempts + 1;
                    let error = e.to_string();
                    if attempts >= self.policy.max_attempts {
                        tracing::error!(message_id = %message.id, attempts, "E-mail descartado após várias tentativas: {}", error);
                        self.store.mark_failed(message.id, &error).await?;
                        report.failed += 1;
                    } else {
                        let next_attempt_at = Utc::now() + self.policy.backoff(attempts);
                        tracing::warn!(message_id = %message.id, attempts, %next_attempt_at, "Falha no envio, reagendado: {}", error);
                        self.store.mark_retry(message.id, &error, next_attempt_at).await?;
                        report.retried += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    /// Despachante periódico em segundo plano.
    pub fn spawn_dispatcher(self, every: Duration, batch: i64) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                match self.dispatch_pending(batch).await {
                    Ok(report) if report != DispatchReport::default() => {
                        tracing::info!(sent = report.sent, retried = report.retried, failed = report.failed, "📬 Outbox despachada");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!("🔥 Falha ao despachar a outbox: {:?}", e),
                }
            }
        })
    }
}
