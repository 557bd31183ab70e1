// src/services/collaborators.rs
//
// Serviços externos: gateway de pagamento e envio de e-mail.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::common::error::AppError;

// ===== PAGAMENTOS =====

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerProfile {
    pub name: String,
    pub email: Option<String>,
    #[serde(rename = "cpfCnpj")]
    pub cpf: Option<String>,
    #[serde(rename = "mobilePhone")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub customer_id: String,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    // Id do negócio; volta no webhook como externalReference
    pub external_reference: String,
    pub installments: u32,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Charge {
    pub id: String,
    pub checkout_url: Option<String>,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_customer(&self, profile: &CustomerProfile) -> Result<String, AppError>;

    async fn create_charge(&self, request: &ChargeRequest) -> Result<Charge, AppError>;
}

#[derive(Deserialize)]
struct CreatedCustomer {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedCharge {
    id: String,
    invoice_url: Option<String>,
}

/// Cliente REST do gateway (autenticação pelo header `access_token`).
#[derive(Clone)]
pub struct HttpPaymentProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpPaymentProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn headers(&self) -> Result<HeaderMap, AppError> {
        let mut headers = HeaderMap::new();
        let token = HeaderValue::from_str(&self.api_key)
            .map_err(|e| AppError::CollaboratorFailure(format!("chave do gateway inválida: {e}")))?;
        headers.insert("access_token", token);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn post<T: for<'de> Deserialize<'de>>(&self, path: &str, body: serde_json::Value) -> Result<T, AppError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::CollaboratorFailure(format!("POST {url}: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::CollaboratorFailure(format!("POST {url} status={status} body={text}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| AppError::CollaboratorFailure(format!("resposta inválida de {url}: {e}")))
    }
}

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
    async fn create_customer(&self, profile: &CustomerProfile) -> Result<String, AppError> {
        let body = serde_json::to_value(profile).map_err(|e| AppError::CollaboratorFailure(e.to_string()))?;
        let created: CreatedCustomer = self.post("/customers", body).await?;
        Ok(created.id)
    }

    async fn create_charge(&self, request: &ChargeRequest) -> Result<Charge, AppError> {
        let mut body = json!({
            "customer": request.customer_id,
            "billingType": "UNDEFINED",
            "value": request.amount,
            "dueDate": request.due_date.format("%Y-%m-%d").to_string(),
            "externalReference": request.external_reference,
            "description": request.description,
        });
        if request.installments > 1 {
            body["installmentCount"] = json!(request.installments);
            body["totalValue"] = json!(request.amount);
        }

        let created: CreatedCharge = self.post("/payments", body).await?;
        Ok(Charge { id: created.id, checkout_url: created.invoice_url })
    }
}

// ===== E-MAIL =====

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), AppError>;
}

/// Só registra no log. Padrão quando não há MAILER_WEBHOOK_URL.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), AppError> {
        tracing::info!(to, subject, bytes = html.len(), "📧 E-mail (modo log)");
        Ok(())
    }
}

/// Entrega o e-mail a um webhook HTTP que faz o envio de fato.
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    url: String,
}

impl HttpMailer {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, url: url.into() }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), AppError> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "to": to, "subject": subject, "html": html }))
            .send()
            .await
            .map_err(|e| AppError::CollaboratorFailure(format!("mailer: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::CollaboratorFailure(format!("mailer status={}", response.status())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn customer_profile_uses_gateway_field_names() {
        let profile = CustomerProfile {
            name: "Maria".into(),
            email: Some("maria@email.com".into()),
            cpf: Some("52998224725".into()),
            phone: None,
        };
        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value["cpfCnpj"], "52998224725");
        assert!(value.get("mobilePhone").is_some());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let provider = HttpPaymentProvider::new("https://sandbox.gateway.test/api/v3/", "chave");
        assert_eq!(provider.base_url, "https://sandbox.gateway.test/api/v3");
    }
}
