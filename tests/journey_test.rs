mod common;

use chrono::{DateTime, Duration, Utc};
use common::{test_app, CPF_A};
use crm_backend::{
    models::{
        journey::{ActivitySource, DonationRecord, EventRegistrationRecord, UserAccount},
        lead::IdentityKey,
        touchpoint::{EventRegistrationTouchpoint, PaymentWebhook, PurchaseTouchpoint, WebhookPayment},
    },
    services::journey_service::assemble,
};
use proptest::prelude::*;
use proptest::test_runner::Config;
use rust_decimal::Decimal;
use uuid::Uuid;

fn registration(event_id: &str, at: DateTime<Utc>) -> EventRegistrationRecord {
    EventRegistrationRecord {
        id: Uuid::new_v4(),
        event_id: event_id.into(),
        event_title: "Encontro de Associados".into(),
        cpf: Some(CPF_A.into()),
        email: None,
        is_online: false,
        is_paid: false,
        amount: Decimal::ZERO,
        created_at: at,
    }
}

#[tokio::test]
async fn journey_merges_sources_and_detects_conversion() {
    let app = test_app();
    let base = Utc::now() - Duration::days(30);

    // A inscrição passa pelo CRM e também existe na tabela de eventos
    app.state
        .touchpoint_service
        .register_for_event(&EventRegistrationTouchpoint {
            full_name: Some("Rita Gomes".into()),
            email: None,
            phone: None,
            cpf: Some("529.982.247-25".into()),
            event_id: "evt-encontro".into(),
            event_title: "Encontro de Associados".into(),
            price: Decimal::ZERO,
            is_free: true,
            create_deal: false,
        })
        .await
        .unwrap();
    app.store.add_registration(registration("evt-encontro", base));

    app.store.add_donation(DonationRecord {
        id: Uuid::new_v4(),
        donation_ref: "don-1".into(),
        cpf: Some(CPF_A.into()),
        email: None,
        amount: Decimal::from(50),
        is_paid: true,
        campaign: Some("Natal Solidário".into()),
        created_at: base + Duration::days(1),
    });

    let account = UserAccount {
        id: Uuid::new_v4(),
        cpf: Some(CPF_A.into()),
        email: Some("rita@email.com".into()),
        created_at: base + Duration::days(5),
    };
    app.store.add_user_account(account.clone());

    let journey = app.state.journey_service.build_journey(IdentityKey::cpf(CPF_A).unwrap()).await.unwrap();

    assert!(journey.lead.is_some());
    assert_eq!(journey.total_activities, 2);
    assert_eq!(journey.events_count, 1);
    assert_eq!(journey.donations_count, 1);
    assert_eq!(journey.purchases_count, 0);
    assert_eq!(journey.total_value_paid, Decimal::from(50));
    assert_eq!(journey.activities[0].source, ActivitySource::EventRegistration);
    assert_eq!(journey.activities[1].source, ActivitySource::Donation);

    assert!(journey.is_converted);
    assert_eq!(journey.user_id, Some(account.id));
    assert_eq!(journey.first_contact_date, Some(base));
    assert_eq!(journey.conversion_date, Some(account.created_at));
    assert_eq!(journey.days_to_conversion, Some(5));
}

#[tokio::test]
async fn unknown_identity_gives_an_empty_journey() {
    let app = test_app();
    let journey = app
        .state
        .journey_service
        .build_journey(IdentityKey::email("ninguem@email.com").unwrap())
        .await
        .unwrap();

    assert!(journey.lead.is_none());
    assert!(journey.activities.is_empty());
    assert!(!journey.is_converted);
    assert_eq!(journey.days_to_conversion, None);
}

proptest! {
    #![proptest_config(Config::with_cases(64))]
    #[test]
    fn activities_come_out_in_date_order(offsets in prop::collection::vec(-1_000_i64..1_000_i64, 0..40)) {
        let base = Utc::now();
        let registrations: Vec<EventRegistrationRecord> = offsets
            .iter()
            .enumerate()
            .map(|(i, minutes)| registration(&format!("evt-{i}"), base + Duration::minutes(*minutes)))
            .collect();

        let journey = assemble(IdentityKey::Cpf(CPF_A.into()), None, None, vec![], registrations, vec![]);

        prop_assert_eq!(journey.total_activities, offsets.len());
        prop_assert!(journey.activities.windows(2).all(|w| w[0].date <= w[1].date));
        let earliest = offsets.iter().min().map(|m| base + Duration::minutes(*m));
        prop_assert_eq!(journey.first_contact_date, earliest);
    }
}

#[tokio::test]
async fn confirmed_purchase_is_counted_once() {
    let app = test_app();
    let touchpoints = &app.state.touchpoint_service;

    let outcome = touchpoints
        .start_purchase(&PurchaseTouchpoint {
            full_name: Some("Rita Gomes".into()),
            email: None,
            phone: None,
            cpf: Some(CPF_A.into()),
            product_id: "curso-lideranca".into(),
            product_name: "Curso de Liderança".into(),
            price: Decimal::from(120),
            installments: 3,
            referral_code: None,
        })
        .await
        .unwrap();
    let deal_id = outcome.deal.unwrap().id;

    touchpoints
        .handle_payment_webhook(&PaymentWebhook {
            event: "PAYMENT_CONFIRMED".into(),
            payment: WebhookPayment { id: "pay_1".into(), external_reference: Some(deal_id.to_string()), value: None },
        })
        .await
        .unwrap();

    let journey = app.state.journey_service.build_journey(IdentityKey::cpf(CPF_A).unwrap()).await.unwrap();

    // product_purchase_started, deal_won, product_purchase_completed
    assert_eq!(journey.total_activities, 3);
    assert_eq!(journey.purchases_count, 1);
    assert_eq!(journey.total_value_paid, Decimal::from(120));
    assert!(journey.is_converted);
}
