// src/routes.rs

use axum::{
    routing::{get, patch, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{config::AppState, docs::ApiDoc, handlers};

/// Monta o roteador completo. Usado pelo main e pelos testes HTTP.
pub fn app(app_state: AppState) -> Router {
    let crm_routes = Router::new()
        .route("/identity/resolve", post(handlers::crm::resolve_identity))
        // Leads
        .route("/leads", get(handlers::crm::list_leads))
        .route("/leads/{id}", get(handlers::crm::get_lead))
        .route("/leads/{id}/status", patch(handlers::crm::update_lead_status))
        .route(
            "/leads/{id}/interactions",
            get(handlers::crm::list_interactions).post(handlers::crm::record_interaction),
        )
        .route("/interactions/reconcile", post(handlers::crm::reconcile_interactions))
        .route("/warnings", get(handlers::crm::list_warnings))
        .route("/journey", get(handlers::crm::get_journey))
        // Funil
        .route(
            "/pipelines",
            post(handlers::pipeline::create_pipeline).get(handlers::pipeline::list_pipelines),
        )
        .route("/pipelines/{id}/stages", post(handlers::pipeline::add_stage))
        .route("/pipelines/{id}/board", get(handlers::pipeline::get_board))
        .route("/deals", post(handlers::pipeline::open_deal))
        .route(
            "/deals/{id}",
            get(handlers::pipeline::get_deal).delete(handlers::pipeline::delete_deal),
        )
        .route("/deals/{id}/move", post(handlers::pipeline::move_deal));

    let touchpoint_routes = Router::new()
        .route("/event-registrations", post(handlers::touchpoints::register_for_event))
        .route("/purchases", post(handlers::touchpoints::start_purchase))
        .route("/donations", post(handlers::touchpoints::record_donation))
        .route("/signups", post(handlers::touchpoints::signup));

    let referral_routes = Router::new()
        .route(
            "/ambassadors",
            post(handlers::referrals::create_ambassador).get(handlers::referrals::list_ambassadors),
        )
        // {id} é o código aqui e o UUID nos repasses (o roteador exige o mesmo nome)
        .route("/ambassadors/{id}", get(handlers::referrals::get_ambassador))
        .route(
            "/ambassadors/{id}/payouts",
            post(handlers::referrals::compute_payout).get(handlers::referrals::list_payouts),
        )
        .route("/clicks", post(handlers::referrals::track_click))
        .route("/conversions", post(handlers::referrals::attribute_conversion))
        .route("/payouts/{id}/status", patch(handlers::referrals::transition_payout));

    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .nest("/api/crm", crm_routes)
        .nest("/api/touchpoints", touchpoint_routes)
        .route("/api/webhooks/payments", post(handlers::touchpoints::payment_webhook))
        .nest("/api/referrals", referral_routes)
        .route("/api/admin/outbox/dispatch", post(handlers::admin::dispatch_outbox))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(app_state)
}
