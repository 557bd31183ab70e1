// src/db/referral_repo.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::{db_utils::map_insert_error, error::AppError},
    models::referral::{
        Ambassador, ClickAttribution, Commission, NewAmbassador, NewCommission, NewPayout, Payout, PayoutStatus,
        ReferralClick,
    },
};

#[async_trait]
pub trait ReferralStore: Send + Sync {
    // ===== EMBAIXADORES =====
    async fn insert_ambassador(&self, ambassador: &NewAmbassador) -> Result<Ambassador, AppError>;

    async fn find_ambassador(&self, id: Uuid) -> Result<Option<Ambassador>, AppError>;

    /// Código comparado sem diferenciar maiúsculas.
    async fn find_ambassador_by_code(&self, code: &str) -> Result<Option<Ambassador>, AppError>;

    async fn list_ambassadors(&self) -> Result<Vec<Ambassador>, AppError>;

    // ===== CLIQUES E COMISSÕES =====
    /// Grava o clique e soma 1 em total_clicks (mesma transação).
    async fn record_click(&self, ambassador_id: Uuid, attribution: &ClickAttribution) -> Result<ReferralClick, AppError>;

    async fn find_commission_for_deal(&self, deal_id: Uuid) -> Result<Option<Commission>, AppError>;

    /// Uma comissão por negócio. Devolve (comissão, criada_agora); só na
    /// criação soma 1 em total_conversions.
    async fn insert_commission(&self, commission: &NewCommission) -> Result<(Commission, bool), AppError>;

    /// Comissões livres de negócios ganhos com created_at em [início, fim).
    async fn payable_commissions(
        &self,
        ambassador_id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Vec<Commission>, AppError>;

    // ===== REPASSES =====
    /// Cria o repasse e prende as comissões nele, tudo ou nada.
    async fn create_payout(&self, payout: &NewPayout, commission_ids: &[Uuid]) -> Result<Payout, AppError>;

    async fn find_payout(&self, id: Uuid) -> Result<Option<Payout>, AppError>;

    async fn list_payouts(&self, ambassador_id: Uuid) -> Result<Vec<Payout>, AppError>;

    /// Troca o status se ainda estiver em `from`. Cancelar solta as comissões;
    /// pagar soma o líquido em total_earnings. None = status mudou no meio tempo.
    async fn transition_payout(
        &self,
        id: Uuid,
        from: PayoutStatus,
        to: PayoutStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Payout>, AppError>;

    async fn mark_payout_notified(&self, id: Uuid, at: DateTime<Utc>) -> Result<Payout, AppError>;
}

const AMBASSADOR_COLUMNS: &str = r#"
    id, code, name, email, commission_rate, total_clicks, total_conversions,
    total_earnings, payment_preference, pix_key, is_active, created_at, updated_at
"#;

const COMMISSION_COLUMNS: &str = r#"
    id, ambassador_id, deal_id, sale_amount, commission_rate, commission_amount, payout_id, created_at
"#;

const PAYOUT_COLUMNS: &str = r#"
    id, ambassador_id, period_start, period_end, sales_count, gross_amount, net_amount,
    status, paid_at, notified_at, created_at, updated_at
"#;

#[derive(Clone)]
pub struct ReferralRepository {
    pool: PgPool,
}

impl ReferralRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReferralStore for ReferralRepository {
    async fn insert_ambassador(&self, ambassador: &NewAmbassador) -> Result<Ambassador, AppError> {
        let created = sqlx::query_as::<_, Ambassador>(&format!(
            r#"
            INSERT INTO ambassadors (code, name, email, commission_rate, payment_preference, pix_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            AMBASSADOR_COLUMNS
        ))
            .bind(&ambassador.code)
            .bind(&ambassador.name)
            .bind(&ambassador.email)
            .bind(ambassador.commission_rate)
            .bind(ambassador.payment_preference)
            .bind(&ambassador.pix_key)
            .fetch_one(&self.pool)
            .await
            .map_err(map_insert_error)?;

        Ok(created)
    }

    async fn find_ambassador(&self, id: Uuid) -> Result<Option<Ambassador>, AppError> {
        let ambassador = sqlx::query_as::<_, Ambassador>(&format!(
            "SELECT {} FROM ambassadors WHERE id = $1",
            AMBASSADOR_COLUMNS
        ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(ambassador)
    }

    async fn find_ambassador_by_code(&self, code: &str) -> Result<Option<Ambassador>, AppError> {
        let ambassador = sqlx::query_as::<_, Ambassador>(&format!(
            "SELECT {} FROM ambassadors WHERE upper(code) = upper($1)",
            AMBASSADOR_COLUMNS
        ))
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        Ok(ambassador)
    }

    async fn list_ambassadors(&self) -> Result<Vec<Ambassador>, AppError> {
        let ambassadors = sqlx::query_as::<_, Ambassador>(&format!(
            "SELECT {} FROM ambassadors ORDER BY name ASC",
            AMBASSADOR_COLUMNS
        ))
            .fetch_all(&self.pool)
            .await?;

        Ok(ambassadors)
    }

    async fn record_click(&self, ambassador_id: Uuid, attribution: &ClickAttribution) -> Result<ReferralClick, AppError> {
        let mut tx = self.pool.begin().await?;

        let click = sqlx::query_as::<_, ReferralClick>(
            r#"
            INSERT INTO referral_clicks (
                ambassador_id, utm_source, utm_medium, utm_campaign, utm_content, landing_page, referrer
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, ambassador_id, utm_source, utm_medium, utm_campaign, utm_content,
                      landing_page, referrer, created_at
            "#,
        )
            .bind(ambassador_id)
            .bind(&attribution.utm_source)
            .bind(&attribution.utm_medium)
            .bind(&attribution.utm_campaign)
            .bind(&attribution.utm_content)
            .bind(&attribution.landing_page)
            .bind(&attribution.referrer)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("UPDATE ambassadors SET total_clicks = total_clicks + 1, updated_at = NOW() WHERE id = $1")
            .bind(ambassador_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(click)
    }

    async fn find_commission_for_deal(&self, deal_id: Uuid) -> Result<Option<Commission>, AppError> {
        let commission = sqlx::query_as::<_, Commission>(&format!(
            "SELECT {} FROM referral_commissions WHERE deal_id = $1",
            COMMISSION_COLUMNS
        ))
            .bind(deal_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(commission)
    }

    async fn insert_commission(&self, commission: &NewCommission) -> Result<(Commission, bool), AppError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, Commission>(&format!(
            r#"
            INSERT INTO referral_commissions (
                ambassador_id, deal_id, sale_amount, commission_rate, commission_amount
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (deal_id) DO NOTHING
            RETURNING {}
            "#,
            COMMISSION_COLUMNS
        ))
            .bind(commission.ambassador_id)
            .bind(commission.deal_id)
            .bind(commission.sale_amount)
            .bind(commission.commission_rate)
            .bind(commission.commission_amount)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(created) = inserted else {
            // Outro pedido atribuiu primeiro: devolve o que já existe
            tx.rollback().await?;
            let existing = self
                .find_commission_for_deal(commission.deal_id)
                .await?
                .ok_or_else(|| AppError::UniqueConstraintViolation("referral_commissions_deal_id_key".into()))?;
            return Ok((existing, false));
        };

        sqlx::query(
            "UPDATE ambassadors SET total_conversions = total_conversions + 1, updated_at = NOW() WHERE id = $1",
        )
            .bind(commission.ambassador_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok((created, true))
    }

    async fn payable_commissions(
        &self,
        ambassador_id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Vec<Commission>, AppError> {
        let commissions = sqlx::query_as::<_, Commission>(
            r#"
            SELECT c.id, c.ambassador_id, c.deal_id, c.sale_amount, c.commission_rate,
                   c.commission_amount, c.payout_id, c.created_at
            FROM referral_commissions c
            INNER JOIN deals d ON d.id = c.deal_id
            WHERE c.ambassador_id = $1
            AND c.payout_id IS NULL
            AND d.won = TRUE
            AND c.created_at >= $2
            AND c.created_at < $3
            ORDER BY c.created_at ASC
            "#,
        )
            .bind(ambassador_id)
            .bind(period_start)
            .bind(period_end)
            .fetch_all(&self.pool)
            .await?;

        Ok(commissions)
    }

    async fn create_payout(&self, payout: &NewPayout, commission_ids: &[Uuid]) -> Result<Payout, AppError> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, Payout>(&format!(
            r#"
            INSERT INTO ambassador_payouts (
                ambassador_id, period_start, period_end, sales_count, gross_amount, net_amount, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'pending')
            RETURNING {}
            "#,
            PAYOUT_COLUMNS
        ))
            .bind(payout.ambassador_id)
            .bind(payout.period_start)
            .bind(payout.period_end)
            .bind(payout.sales_count)
            .bind(payout.gross_amount)
            .bind(payout.net_amount)
            .fetch_one(&mut *tx)
            .await?;

        let claimed = sqlx::query(
            "UPDATE referral_commissions SET payout_id = $1 WHERE id = ANY($2) AND payout_id IS NULL",
        )
            .bind(created.id)
            .bind(commission_ids)
            .execute(&mut *tx)
            .await?;

        // Alguma comissão foi para outro repasse no meio tempo
        if claimed.rows_affected() != commission_ids.len() as u64 {
            tx.rollback().await?;
            return Err(AppError::UniqueConstraintViolation("referral_commissions.payout_id".into()));
        }

        tx.commit().await?;

        Ok(created)
    }

    async fn find_payout(&self, id: Uuid) -> Result<Option<Payout>, AppError> {
        let payout = sqlx::query_as::<_, Payout>(&format!("SELECT {} FROM ambassador_payouts WHERE id = $1", PAYOUT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(payout)
    }

    async fn list_payouts(&self, ambassador_id: Uuid) -> Result<Vec<Payout>, AppError> {
        let payouts = sqlx::query_as::<_, Payout>(&format!(
            "SELECT {} FROM ambassador_payouts WHERE ambassador_id = $1 ORDER BY period_start DESC",
            PAYOUT_COLUMNS
        ))
            .bind(ambassador_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(payouts)
    }

    async fn transition_payout(
        &self,
        id: Uuid,
        from: PayoutStatus,
        to: PayoutStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Payout>, AppError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, Payout>(&format!(
            r#"
            UPDATE ambassador_payouts SET
                status = $3,
                paid_at = CASE WHEN $3 = 'paid'::payout_status THEN $4 ELSE paid_at END,
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            PAYOUT_COLUMNS
        ))
            .bind(id)
            .bind(from)
            .bind(to)
            .bind(at)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(payout) = updated else {
            tx.rollback().await?;
            return Ok(None);
        };

        match to {
            PayoutStatus::Cancelled => {
                sqlx::query("UPDATE referral_commissions SET payout_id = NULL WHERE payout_id = $1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            }
            PayoutStatus::Paid => {
                sqlx::query(
                    "UPDATE ambassadors SET total_earnings = total_earnings + $2, updated_at = NOW() WHERE id = $1",
                )
                    .bind(payout.ambassador_id)
                    .bind(payout.net_amount)
                    .execute(&mut *tx)
                    .await?;
            }
            _ => {}
        }

        tx.commit().await?;

        Ok(Some(payout))
    }

    async fn mark_payout_notified(&self, id: Uuid, at: DateTime<Utc>) -> Result<Payout, AppError> {
        let payout = sqlx::query_as::<_, Payout>(&format!(
            "UPDATE ambassador_payouts SET notified_at = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            PAYOUT_COLUMNS
        ))
            .bind(id)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::PayoutNotFound)?;

        Ok(payout)
    }
}
