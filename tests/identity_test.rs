mod common;

use common::{test_app, CPF_A, CPF_B};
use crm_backend::{
    common::error::AppError,
    models::lead::{IdentityCandidate, LeadStatus, MatchKey, WarningKind},
};
use uuid::Uuid;

fn candidate(cpf: Option<&str>, email: Option<&str>, name: Option<&str>) -> IdentityCandidate {
    IdentityCandidate {
        cpf: cpf.map(str::to_string),
        email: email.map(str::to_string),
        full_name: name.map(str::to_string),
        source: Some("event_registration".into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn same_cpf_resolves_to_the_same_lead() {
    let app = test_app();
    let identity = &app.state.identity_service;

    let first = identity.resolve(&candidate(Some("529.982.247-25"), None, Some("Maria"))).await.unwrap();
    let second = identity.resolve(&candidate(Some(CPF_A), None, None)).await.unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(second.matched_by, Some(MatchKey::Cpf));
    assert_eq!(first.lead.id, second.lead.id);
    assert_eq!(first.lead.cpf.as_deref(), Some(CPF_A));

    let all = identity.list_leads(None, None, None).await.unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn backfill_only_fills_missing_fields() {
    let app = test_app();
    let identity = &app.state.identity_service;

    identity.resolve(&candidate(Some(CPF_A), None, Some("Maria da Silva"))).await.unwrap();
    let again = identity
        .resolve(&candidate(Some(CPF_A), Some("Maria@Email.com"), Some("Outro Nome")))
        .await
        .unwrap();

    assert!(again.backfilled);
    assert_eq!(again.lead.full_name.as_deref(), Some("Maria da Silva"));
    assert_eq!(again.lead.email.as_deref(), Some("maria@email.com"));
}

#[tokio::test]
async fn email_matches_when_cpf_is_unknown() {
    let app = test_app();
    let identity = &app.state.identity_service;

    let by_email = identity.resolve(&candidate(None, Some("joao@email.com"), None)).await.unwrap();
    let later = identity.resolve(&candidate(Some(CPF_B), Some("JOAO@email.com"), None)).await.unwrap();

    assert_eq!(later.matched_by, Some(MatchKey::Email));
    assert_eq!(later.lead.id, by_email.lead.id);
    assert_eq!(later.lead.cpf.as_deref(), Some(CPF_B));
}

#[tokio::test]
async fn conflicting_cpf_and_email_keep_cpf_lead_and_warn() {
    let app = test_app();
    let identity = &app.state.identity_service;

    let cpf_lead = identity.resolve(&candidate(Some(CPF_A), None, None)).await.unwrap().lead;
    let email_lead = identity.resolve(&candidate(None, Some("ana@email.com"), None)).await.unwrap().lead;

    let resolved = identity.resolve(&candidate(Some(CPF_A), Some("ana@email.com"), None)).await.unwrap();

    assert_eq!(resolved.lead.id, cpf_lead.id);
    // O e-mail é de outro lead; não é copiado
    assert_eq!(resolved.lead.email, None);

    let warnings = identity.list_warnings(true).await.unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind, WarningKind::MultiIdentityMismatch);
    assert_eq!(warnings[0].lead_id, cpf_lead.id);
    assert_eq!(warnings[0].other_lead_id, Some(email_lead.id));
}

#[tokio::test]
async fn invalid_or_empty_identity_is_rejected() {
    let app = test_app();
    let identity = &app.state.identity_service;

    let err = identity.resolve(&candidate(Some("123.456.789-00"), None, None)).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidCpf(_)));

    let err = identity.resolve(&candidate(None, None, Some("Só o nome"))).await.unwrap_err();
    assert!(matches!(err, AppError::MissingIdentity));

    assert!(identity.list_leads(None, None, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn lost_lead_frees_the_cpf_for_a_new_one() {
    let app = test_app();
    let identity = &app.state.identity_service;

    let first = identity.resolve(&candidate(Some(CPF_A), None, None)).await.unwrap().lead;
    identity.update_status(first.id, LeadStatus::Lost, None).await.unwrap();

    let second = identity.resolve(&candidate(Some(CPF_A), None, None)).await.unwrap();
    assert!(second.created);
    assert_ne!(second.lead.id, first.id);
}

#[tokio::test]
async fn converted_is_final() {
    let app = test_app();
    let identity = &app.state.identity_service;
    let user_id = Uuid::new_v4();

    let lead = identity.resolve(&candidate(Some(CPF_A), None, None)).await.unwrap().lead;
    let converted = identity.update_status(lead.id, LeadStatus::Converted, Some(user_id)).await.unwrap();
    assert_eq!(converted.status, LeadStatus::Converted);
    assert_eq!(converted.converted_user_id, Some(user_id));
    assert!(converted.converted_at.is_some());

    let err = identity.update_status(lead.id, LeadStatus::Contacted, None).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidLeadTransition { .. }));
}

#[tokio::test]
async fn signup_links_every_lead_with_the_same_keys() {
    let app = test_app();
    let identity = &app.state.identity_service;
    let user_id = Uuid::new_v4();

    let by_cpf = identity.resolve(&candidate(Some(CPF_A), None, None)).await.unwrap().lead;
    let by_email = identity.resolve(&candidate(None, Some("bia@email.com"), None)).await.unwrap().lead;

    let linked = identity.link_user_account(user_id, Some(CPF_A), Some("bia@email.com")).await.unwrap();
    assert_eq!(linked.len(), 2);
    assert!(linked.iter().all(|l| l.status == LeadStatus::Converted && l.converted_user_id == Some(user_id)));
    assert!(linked.iter().any(|l| l.id == by_cpf.id));
    assert!(linked.iter().any(|l| l.id == by_email.id));
}

#[tokio::test]
async fn shared_email_with_another_cpf_creates_a_new_lead() {
    let app = test_app();
    let identity = &app.state.identity_service;

    let first = identity.resolve(&candidate(Some(CPF_A), Some("familia@email.com"), None)).await.unwrap().lead;
    let second = identity.resolve(&candidate(Some(CPF_B), Some("familia@email.com"), None)).await.unwrap();

    assert!(second.created);
    assert_ne!(second.lead.id, first.id);
    assert_eq!(second.lead.cpf.as_deref(), Some(CPF_B));

    let unchanged = identity.get_lead(first.id).await.unwrap();
    assert_eq!(unchanged.cpf.as_deref(), Some(CPF_A));

    let warnings = identity.list_warnings(true).await.unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind, WarningKind::DuplicateLeadSuspected);
    assert_eq!(warnings[0].lead_id, second.lead.id);
    assert_eq!(warnings[0].other_lead_id, Some(first.id));
}

#[tokio::test]
async fn converting_a_lost_lead_whose_cpf_was_reused_is_a_conflict() {
    let app = test_app();
    let identity = &app.state.identity_service;

    let lost = identity.resolve(&candidate(Some(CPF_A), None, None)).await.unwrap().lead;
    identity.update_status(lost.id, LeadStatus::Lost, None).await.unwrap();
    identity.resolve(&candidate(Some(CPF_A), None, None)).await.unwrap();

    let err = identity.update_status(lost.id, LeadStatus::Converted, None).await.unwrap_err();
    assert!(matches!(err, AppError::DuplicateIdentity(_)));
    assert_eq!(identity.get_lead(lost.id).await.unwrap().status, LeadStatus::Lost);
}
