// src/docs.rs

use utoipa::OpenApi;

use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    info(title = "CRM Backend", description = "Leads, funil de vendas, jornada e indicações"),
    paths(
        // --- CRM ---
        handlers::crm::resolve_identity,
        handlers::crm::list_leads,
        handlers::crm::get_lead,
        handlers::crm::update_lead_status,
        handlers::crm::list_interactions,
        handlers::crm::record_interaction,
        handlers::crm::reconcile_interactions,
        handlers::crm::list_warnings,
        handlers::crm::get_journey,

        // --- Funil ---
        handlers::pipeline::create_pipeline,
        handlers::pipeline::list_pipelines,
        handlers::pipeline::add_stage,
        handlers::pipeline::get_board,
        handlers::pipeline::open_deal,
        handlers::pipeline::get_deal,
        handlers::pipeline::delete_deal,
        handlers::pipeline::move_deal,

        // --- Pontos de contato ---
        handlers::touchpoints::register_for_event,
        handlers::touchpoints::start_purchase,
        handlers::touchpoints::record_donation,
        handlers::touchpoints::signup,
        handlers::touchpoints::payment_webhook,

        // --- Indicações ---
        handlers::referrals::create_ambassador,
        handlers::referrals::list_ambassadors,
        handlers::referrals::get_ambassador,
        handlers::referrals::track_click,
        handlers::referrals::attribute_conversion,
        handlers::referrals::compute_payout,
        handlers::referrals::list_payouts,
        handlers::referrals::transition_payout,

        // --- Admin ---
        handlers::admin::dispatch_outbox,
    ),
    components(
        schemas(
            // --- Leads ---
            models::lead::LeadStatus,
            models::lead::WarningKind,
            models::lead::Lead,
            models::lead::IdentityCandidate,
            models::lead::MatchKey,
            models::lead::Resolution,
            models::lead::IdentityKey,
            models::lead::ConsistencyWarning,

            // --- Interações ---
            models::interaction::InteractionType,
            models::interaction::InteractionChannel,
            models::interaction::Utm,
            models::interaction::InteractionMetadata,
            models::interaction::Interaction,

            // --- Funil ---
            models::pipeline::StageKind,
            models::pipeline::Pipeline,
            models::pipeline::PipelineStage,
            models::pipeline::DealMetadata,
            models::pipeline::Deal,
            models::pipeline::DropTarget,
            models::pipeline::PipelineWithStages,
            models::pipeline::BoardColumn,
            models::pipeline::Board,
            models::pipeline::DealMove,

            // --- Jornada ---
            models::journey::ActivitySource,
            models::journey::Activity,
            models::journey::Journey,

            // --- Indicações ---
            models::referral::PaymentPreference,
            models::referral::PayoutStatus,
            models::referral::Ambassador,
            models::referral::ReferralClick,
            models::referral::ClickAttribution,
            models::referral::Commission,
            models::referral::Payout,

            // --- Pontos de contato ---
            models::touchpoint::EventRegistrationTouchpoint,
            models::touchpoint::PurchaseTouchpoint,
            models::touchpoint::DonationTouchpoint,
            models::touchpoint::SignupTouchpoint,
            models::touchpoint::PaymentWebhook,
            models::touchpoint::WebhookPayment,
            models::touchpoint::TouchpointOutcome,
            models::touchpoint::WebhookAck,

            // --- Outbox ---
            models::outbox::OutboxStatus,
            models::outbox::DispatchReport,

            // --- Payloads ---
            handlers::crm::ResolveIdentityPayload,
            handlers::crm::UpdateLeadStatusPayload,
            handlers::crm::RecordInteractionPayload,
            handlers::pipeline::StagePayload,
            handlers::pipeline::CreatePipelinePayload,
            handlers::pipeline::OpenDealPayload,
            handlers::referrals::CreateAmbassadorPayload,
            handlers::referrals::TrackClickPayload,
            handlers::referrals::AttributeConversionPayload,
            handlers::referrals::ComputePayoutPayload,
            handlers::referrals::PayoutStatusPayload,
        )
    ),
    tags(
        (name = "CRM", description = "Leads, interações e jornada"),
        (name = "Funil", description = "Funis, etapas e negócios (Kanban)"),
        (name = "Pontos de Contato", description = "Inscrições, compras, doações, cadastros e webhooks"),
        (name = "Indicações", description = "Embaixadores, comissões e repasses"),
        (name = "Admin", description = "Rotinas administrativas")
    )
)]
pub struct ApiDoc;
