mod common;

use common::{build, test_app, FakeMailer, FakePayments, CPF_A, CPF_B};
use crm_backend::{
    common::error::AppError,
    models::{
        interaction::InteractionType,
        lead::LeadStatus,
        referral::PaymentPreference,
        touchpoint::{
            DonationTouchpoint, EventRegistrationTouchpoint, PaymentWebhook, PurchaseTouchpoint, SignupTouchpoint,
            WebhookPayment,
        },
    },
};
use rust_decimal::Decimal;
use uuid::Uuid;

fn free_event(cpf: &str) -> EventRegistrationTouchpoint {
    EventRegistrationTouchpoint {
        full_name: Some("Rita Gomes".into()),
        email: None,
        phone: None,
        cpf: Some(cpf.into()),
        event_id: "evt-encontro".into(),
        event_title: "Encontro de Associados".into(),
        price: Decimal::ZERO,
        is_free: true,
        create_deal: false,
    }
}

fn purchase(email: &str, price: Decimal, installments: u32) -> PurchaseTouchpoint {
    PurchaseTouchpoint {
        full_name: Some("Davi Souza".into()),
        email: Some(email.into()),
        phone: None,
        cpf: None,
        product_id: "curso-lideranca".into(),
        product_name: "Curso de Liderança".into(),
        price,
        installments,
        referral_code: None,
    }
}

fn confirmation(deal_id: Uuid) -> PaymentWebhook {
    PaymentWebhook {
        event: "PAYMENT_CONFIRMED".into(),
        payment: WebhookPayment {
            id: "pay_1".into(),
            external_reference: Some(deal_id.to_string()),
            value: None,
        },
    }
}

#[tokio::test]
async fn free_event_creates_lead_and_interaction_without_deal() {
    let app = test_app();
    let outcome = app.state.touchpoint_service.register_for_event(&free_event(CPF_A)).await.unwrap();

    let lead = outcome.lead.expect("lead criado");
    assert!(outcome.deal.is_none());
    assert_eq!(lead.source.as_deref(), Some("event_registration"));
    assert_eq!(lead.first_activity_name.as_deref(), Some("Encontro de Associados"));

    let leads = app.state.identity_service.list_leads(None, None, None).await.unwrap();
    assert_eq!(leads.len(), 1);

    let history = app.state.interaction_service.list_for_lead(lead.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].interaction_type, InteractionType::EventRegistration);
    assert_eq!(outcome.interaction_id, Some(history[0].id));
}

#[tokio::test]
async fn paid_event_opens_a_deal() {
    let app = test_app();
    let mut payload = free_event(CPF_B);
    payload.is_free = false;
    payload.price = Decimal::from(60);

    let outcome = app.state.touchpoint_service.register_for_event(&payload).await.unwrap();
    let deal = outcome.deal.expect("negócio aberto");
    assert_eq!(deal.product_id.as_deref(), Some("event:evt-encontro"));
    assert_eq!(deal.metadata.event_id.as_deref(), Some("evt-encontro"));
    assert_eq!(deal.value, Decimal::from(60));
}

#[tokio::test]
async fn purchase_in_installments_opens_deal_and_charge() {
    let app = test_app();
    let outcome = app
        .state
        .touchpoint_service
        .start_purchase(&purchase("davi@email.com", Decimal::from(120), 3))
        .await
        .unwrap();

    let lead = outcome.lead.expect("lead criado");
    assert_eq!(lead.email.as_deref(), Some("davi@email.com"));

    let history = app.state.interaction_service.list_for_lead(lead.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].interaction_type, InteractionType::ProductPurchaseStarted);

    let deal = outcome.deal.expect("negócio aberto");
    assert_eq!(deal.value, Decimal::from(120));
    assert_eq!(deal.won, None);
    assert_eq!(deal.metadata.installments, Some(3));
    assert_eq!(deal.metadata.source_interaction_id, Some(history[0].id));

    let charges = app.payments.charges.lock().unwrap();
    assert_eq!(charges.len(), 1);
    assert_eq!(charges[0].installments, 3);
    assert_eq!(charges[0].external_reference, deal.id.to_string());
    assert!(outcome.checkout_url.is_some());
    assert_eq!(outcome.charge_id.as_deref(), Some("pay_1"));
}

#[tokio::test]
async fn too_many_installments_is_rejected_before_anything_is_written() {
    let app = test_app();
    let err = app
        .state
        .touchpoint_service
        .start_purchase(&purchase("davi@email.com", Decimal::from(120), 7))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidInstallments { max: 6 }));
    assert!(app.state.identity_service.list_leads(None, None, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn gateway_failure_does_not_undo_the_crm() {
    let app = build(FakePayments { fail: true, ..Default::default() }, FakeMailer::default());
    let outcome = app
        .state
        .touchpoint_service
        .start_purchase(&purchase("davi@email.com", Decimal::from(120), 1))
        .await
        .unwrap();

    assert!(outcome.lead.is_some());
    assert!(outcome.deal.is_some());
    assert!(outcome.checkout_url.is_none());
}

#[tokio::test]
async fn invalid_cpf_surfaces_to_the_caller() {
    let app = test_app();
    let err = app
        .state
        .touchpoint_service
        .register_for_event(&free_event("111.111.111-11"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidCpf(_)));
}

#[tokio::test]
async fn payment_confirmation_wins_the_deal_once() {
    let app = test_app();
    let touchpoints = &app.state.touchpoint_service;
    let outcome = touchpoints.start_purchase(&purchase("davi@email.com", Decimal::from(120), 2)).await.unwrap();
    let deal = outcome.deal.unwrap();
    let lead = outcome.lead.unwrap();

    let ack = touchpoints.handle_payment_webhook(&confirmation(deal.id)).await.unwrap();
    assert!(ack.received);
    assert_eq!(ack.deal_id, Some(deal.id));

    // Reentrega do mesmo evento
    touchpoints.handle_payment_webhook(&confirmation(deal.id)).await.unwrap();

    let won = app.state.pipeline_service.get_deal(deal.id).await.unwrap();
    assert_eq!(won.won, Some(true));

    let history = app.state.interaction_service.list_for_lead(lead.id).await.unwrap();
    let count = |kind| history.iter().filter(|i| i.interaction_type == kind).count();
    assert_eq!(count(InteractionType::ProductPurchaseStarted), 1);
    assert_eq!(count(InteractionType::DealWon), 1);
    assert_eq!(count(InteractionType::ProductPurchaseCompleted), 1);

    let lead = app.state.identity_service.get_lead(lead.id).await.unwrap();
    assert_eq!(lead.status, LeadStatus::Converted);
}

#[tokio::test]
async fn referred_purchase_pays_commission_on_confirmation() {
    let app = test_app();
    let ambassador = app
        .state
        .referral_service
        .create_ambassador("Beto", Some("beto@email.com"), Decimal::from(15), PaymentPreference::Pix, None, Some("BETO15"))
        .await
        .unwrap();

    let mut payload = purchase("cliente@email.com", Decimal::from(200), 1);
    payload.referral_code = Some("beto15".into());
    let deal = app.state.touchpoint_service.start_purchase(&payload).await.unwrap().deal.unwrap();

    app.state.touchpoint_service.handle_payment_webhook(&confirmation(deal.id)).await.unwrap();

    let commission = app.state.referral_service.attribute_conversion(deal.id, "BETO15").await.unwrap();
    assert_eq!(commission.ambassador_id, ambassador.id);
    assert_eq!(commission.commission_amount, Decimal::from(30));
}

#[tokio::test]
async fn unknown_or_irrelevant_webhooks_are_acknowledged() {
    let app = test_app();
    let touchpoints = &app.state.touchpoint_service;

    let ack = touchpoints.handle_payment_webhook(&confirmation(Uuid::new_v4())).await.unwrap();
    assert!(ack.received);

    let mut overdue = confirmation(Uuid::new_v4());
    overdue.event = "PAYMENT_OVERDUE".into();
    let ack = touchpoints.handle_payment_webhook(&overdue).await.unwrap();
    assert_eq!(ack.deal_id, None);
}

#[tokio::test]
async fn donation_and_signup_are_recorded() {
    let app = test_app();
    let touchpoints = &app.state.touchpoint_service;

    let donation = touchpoints
        .record_donation(&DonationTouchpoint {
            full_name: None,
            email: Some("gil@email.com".into()),
            phone: None,
            cpf: None,
            donation_id: "don-77".into(),
            amount: Decimal::from(50),
            campaign: Some("Natal Solidário".into()),
        })
        .await
        .unwrap();
    let lead = donation.lead.unwrap();

    let user_id = Uuid::new_v4();
    let signup = touchpoints
        .signup(&SignupTouchpoint {
            user_id,
            full_name: Some("Gil".into()),
            email: Some("gil@email.com".into()),
            phone: None,
            cpf: None,
        })
        .await
        .unwrap();

    let converted = signup.lead.unwrap();
    assert_eq!(converted.id, lead.id);
    assert_eq!(converted.status, LeadStatus::Converted);
    assert_eq!(converted.converted_user_id, Some(user_id));
    assert_eq!(converted.full_name.as_deref(), Some("Gil"));

    let history = app.state.interaction_service.list_for_lead(lead.id).await.unwrap();
    let kinds: Vec<InteractionType> = history.iter().map(|i| i.interaction_type).collect();
    assert!(kinds.contains(&InteractionType::Donation));
    assert!(kinds.contains(&InteractionType::AccountCreated));
}
