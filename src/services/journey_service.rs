// src/services/journey_service.rs

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{
    common::error::AppError,
    db::{interaction_repo::InteractionStore, journey_repo::JourneySourceStore, lead_repo::LeadStore},
    models::{
        interaction::{Interaction, InteractionChannel, InteractionMetadata, InteractionType},
        journey::{Activity, ActivitySource, DonationRecord, EventRegistrationRecord, Journey, UserAccount},
        lead::{IdentityKey, Lead, LeadStatus},
    },
};

#[derive(Clone)]
pub struct JourneyService {
    leads: Arc<dyn LeadStore>,
    interactions: Arc<dyn InteractionStore>,
    sources: Arc<dyn JourneySourceStore>,
}

impl JourneyService {
    pub fn new(
        leads: Arc<dyn LeadStore>,
        interactions: Arc<dyn InteractionStore>,
        sources: Arc<dyn JourneySourceStore>,
    ) -> Self {
        Self { leads, interactions, sources }
    }

    /// Monta a linha do tempo a cada pedido (nada fica em cache).
    pub async fn build_journey(&self, key: IdentityKey) -> Result<Journey, AppError> {
        let lead = self.leads.find_by_key(&key).await?;
        let lead_id = lead.as_ref().map(|l| l.id);

        let (interactions, registrations, donations, account) = tokio::try_join!(
            self.interactions.list_for_identity(&key, lead_id),
            self.sources.registrations_for(&key),
            self.sources.donations_for(&key),
            self.sources.user_account_for(&key),
        )?;

        Ok(assemble(key, lead, account, interactions, registrations, donations))
    }
}

fn registration_activity(record: &EventRegistrationRecord) -> Activity {
    Activity {
        source: ActivitySource::EventRegistration,
        activity_type: InteractionType::EventRegistration.as_str().to_string(),
        name: record.event_title.clone(),
        date: record.created_at,
        paid: record.is_paid,
        online: record.is_online,
        value: record.amount,
    }
}

fn donation_activity(record: &DonationRecord) -> Activity {
    Activity {
        source: ActivitySource::Donation,
        activity_type: InteractionType::Donation.as_str().to_string(),
        name: record.campaign.clone().unwrap_or_else(|| "Doação".to_string()),
        date: record.created_at,
        paid: record.is_paid,
        online: true,
        value: record.amount,
    }
}

fn interaction_activity(interaction: &Interaction) -> Activity {
    let kind = interaction.interaction_type;
    let name = interaction
        .metadata
        .display_name()
        .map(str::to_string)
        .or_else(|| interaction.description.clone())
        .unwrap_or_else(|| kind.as_str().to_string());

    Activity {
        source: ActivitySource::Interaction,
        activity_type: kind.as_str().to_string(),
        name,
        date: interaction.created_at,
        // deal_won/deal_lost são marcos; o valor pago vem da compra ou da inscrição
        paid: kind == InteractionType::ProductPurchaseCompleted,
        online: interaction.channel != InteractionChannel::Event,
        value: interaction.metadata.amount().unwrap_or(Decimal::ZERO),
    }
}

/// Monta a jornada a partir das três fontes. Função pura.
pub fn assemble(
    identity: IdentityKey,
    lead: Option<Lead>,
    account: Option<UserAccount>,
    interactions: Vec<Interaction>,
    registrations: Vec<EventRegistrationRecord>,
    donations: Vec<DonationRecord>,
) -> Journey {
    let event_ids: HashSet<&str> = registrations.iter().map(|r| r.event_id.as_str()).collect();
    let donation_refs: HashSet<&str> = donations.iter().map(|d| d.donation_ref.as_str()).collect();

    // Interações que só espelham uma inscrição/doação já presente na fonte
    // própria não aparecem duas vezes
    let mirrors_source = |interaction: &Interaction| match &interaction.metadata {
        InteractionMetadata::EventRegistration { event_id, .. } => event_ids.contains(event_id.as_str()),
        InteractionMetadata::Donation { donation_id, .. } => donation_refs.contains(donation_id.as_str()),
        _ => false,
    };

    let mut activities: Vec<Activity> = interactions
        .iter()
        .filter(|i| !mirrors_source(i))
        .map(interaction_activity)
        .chain(registrations.iter().map(registration_activity))
        .chain(donations.iter().map(donation_activity))
        .collect();

    // sort_by_key é estável: empates mantêm a ordem de chegada
    activities.sort_by_key(|a| a.date);

    let first_contact_date = activities
        .first()
        .map(|a| a.date)
        .or_else(|| earliest([lead.as_ref().map(|l| l.created_at), account.as_ref().map(|a| a.created_at)]));

    let conversion_date = earliest(
        [
            account.as_ref().map(|a| a.created_at),
            lead.as_ref().and_then(|l| l.converted_at),
        ]
        .into_iter()
        .chain(
            interactions
                .iter()
                .filter(|i| i.interaction_type.is_conversion_milestone())
                .map(|i| Some(i.created_at)),
        ),
    );

    let is_converted = account.is_some() || lead.as_ref().is_some_and(|l| l.status == LeadStatus::Converted);

    let days_to_conversion = match (first_contact_date, conversion_date) {
        (Some(first), Some(converted)) if is_converted => Some((converted - first).num_days().max(0)),
        _ => None,
    };

    let mut total_value_paid = Decimal::ZERO;
    let (mut events_count, mut donations_count, mut purchases_count) = (0, 0, 0);
    for activity in &activities {
        if activity.paid {
            total_value_paid += activity.value;
        }
        match activity.activity_type.as_str() {
            "event_registration" => events_count += 1,
            "donation" => donations_count += 1,
            "product_purchase_completed" => purchases_count += 1,
            _ => {}
        }
    }

    let user_id = account.as_ref().map(|a| a.id).or_else(|| lead.as_ref().and_then(|l| l.converted_user_id));

    Journey {
        identity,
        lead,
        user_id,
        total_activities: activities.len(),
        activities,
        first_contact_date,
        is_converted,
        conversion_date: if is_converted { conversion_date } else { None },
        days_to_conversion,
        total_value_paid,
        events_count,
        donations_count,
        purchases_count,
    }
}

fn earliest(dates: impl IntoIterator<Item = Option<DateTime<Utc>>>) -> Option<DateTime<Utc>> {
    dates.into_iter().flatten().min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn day(n: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z").unwrap().with_timezone(&Utc) + Duration::days(n)
    }

    fn registration(event_id: &str, at: DateTime<Utc>, paid: bool, amount: i64) -> EventRegistrationRecord {
        EventRegistrationRecord {
            id: Uuid::new_v4(),
            event_id: event_id.into(),
            event_title: format!("Evento {}", event_id),
            cpf: Some("52998224725".into()),
            email: None,
            is_online: false,
            is_paid: paid,
            amount: Decimal::from(amount),
            created_at: at,
        }
    }

    fn interaction(kind: InteractionType, metadata: InteractionMetadata, at: DateTime<Utc>) -> Interaction {
        Interaction {
            id: Uuid::new_v4(),
            lead_id: None,
            user_id: None,
            cpf: Some("52998224725".into()),
            email: None,
            interaction_type: kind,
            channel: InteractionChannel::Website,
            description: None,
            metadata,
            created_at: at,
        }
    }

    #[test]
    fn mirrored_registration_is_listed_once() {
        let reg = registration("evt-1", day(0), true, 50);
        let mirror = interaction(
            InteractionType::EventRegistration,
            InteractionMetadata::EventRegistration {
                event_id: "evt-1".into(),
                event_title: "Evento evt-1".into(),
                price: Decimal::from(50),
                is_free: false,
            },
            day(0),
        );

        let journey = assemble(IdentityKey::Cpf("52998224725".into()), None, None, vec![mirror], vec![reg], vec![]);
        assert_eq!(journey.total_activities, 1);
        assert_eq!(journey.events_count, 1);
        assert_eq!(journey.total_value_paid, Decimal::from(50));
    }

    #[test]
    fn conversion_counts_days_from_first_contact() {
        let account = UserAccount { id: Uuid::new_v4(), cpf: Some("52998224725".into()), email: None, created_at: day(10) };
        let journey = assemble(
            IdentityKey::Cpf("52998224725".into()),
            None,
            Some(account.clone()),
            vec![],
            vec![registration("evt-1", day(3), false, 0), registration("evt-2", day(0), true, 80)],
            vec![],
        );

        assert!(journey.is_converted);
        assert_eq!(journey.user_id, Some(account.id));
        assert_eq!(journey.first_contact_date, Some(day(0)));
        assert_eq!(journey.days_to_conversion, Some(10));
        assert_eq!(journey.activities[0].name, "Evento evt-2");
        assert_eq!(journey.total_value_paid, Decimal::from(80));
    }

    #[test]
    fn deal_won_interaction_is_a_conversion_milestone() {
        let now = Utc::now();
        let lead = Lead {
            id: Uuid::new_v4(),
            full_name: None,
            email: None,
            phone: None,
            cpf: Some("52998224725".into()),
            status: LeadStatus::Converted,
            source: None,
            first_activity_type: None,
            first_activity_name: None,
            converted_user_id: None,
            converted_at: None,
            created_at: now,
            updated_at: now,
        };
        let won = interaction(
            InteractionType::DealWon,
            InteractionMetadata::Deal { deal_id: Uuid::new_v4(), stage_id: Uuid::new_v4(), value: Decimal::from(120) },
            day(5),
        );

        let journey = assemble(
            IdentityKey::Cpf("52998224725".into()),
            Some(lead),
            None,
            vec![won],
            vec![registration("evt-1", day(1), false, 0)],
            vec![],
        );
        assert_eq!(journey.conversion_date, Some(day(5)));
        assert_eq!(journey.days_to_conversion, Some(4));
        // Marco, não pagamento
        assert_eq!(journey.total_value_paid, Decimal::ZERO);
    }

    #[test]
    fn empty_identity_has_no_dates() {
        let journey = assemble(IdentityKey::Email("x@y.com".into()), None, None, vec![], vec![], vec![]);
        assert!(journey.activities.is_empty());
        assert!(!journey.is_converted);
        assert_eq!(journey.first_contact_date, None);
        assert_eq!(journey.days_to_conversion, None);
    }
}
