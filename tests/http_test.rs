mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::{test_app, CPF_A};
use crm_backend::routes;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

fn router() -> Router {
    routes::app(test_app().state)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, body)
}

fn post_json(uri: &str, payload: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&payload).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn resolving_twice_creates_then_matches() {
    let app = router();
    let payload = json!({ "cpf": "529.982.247-25", "fullName": "Maria da Silva" });

    let (status, body) = send(app.clone(), post_json("/api/crm/identity/resolve", payload.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["created"], json!(true));
    assert_eq!(body["lead"]["cpf"], json!(CPF_A));

    let (status, body) = send(app, post_json("/api/crm/identity/resolve", payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["created"], json!(false));
    assert_eq!(body["matchedBy"], json!("cpf"));
}

#[tokio::test]
async fn invalid_cpf_is_translated() {
    let app = router();
    let payload = json!({ "cpf": "123.456.789-00" });

    let (status, body) = send(app.clone(), post_json("/api/crm/identity/resolve", payload.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("CPF inválido."));

    let mut request = post_json("/api/crm/identity/resolve", payload);
    request.headers_mut().insert("accept-language", "en-US,en;q=0.9".parse().unwrap());
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Invalid CPF."));
}

#[tokio::test]
async fn unknown_deal_is_not_found() {
    let request = Request::builder()
        .uri(format!("/api/crm/deals/{}", Uuid::new_v4()))
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(router(), request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("Negócio não encontrado."));
}

#[tokio::test]
async fn journey_requires_cpf_or_email() {
    let request = Request::builder().uri("/api/crm/journey").body(Body::empty()).unwrap();
    let (status, _) = send(router(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn purchase_then_webhook_over_http() {
    let app = router();
    let purchase = json!({
        "email": "davi@email.com",
        "productId": "curso-lideranca",
        "productName": "Curso de Liderança",
        "price": 120,
        "installments": 3
    });

    let (status, body) = send(app.clone(), post_json("/api/touchpoints/purchases", purchase)).await;
    assert_eq!(status, StatusCode::CREATED);
    let deal_id = body["deal"]["id"].as_str().unwrap().to_string();
    assert!(body["checkoutUrl"].as_str().unwrap().ends_with(&deal_id));

    let webhook = json!({
        "event": "PAYMENT_CONFIRMED",
        "payment": { "id": "pay_1", "externalReference": deal_id }
    });
    let (status, body) = send(app.clone(), post_json("/api/webhooks/payments", webhook)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], json!(true));

    let request = Request::builder().uri(format!("/api/crm/deals/{}", deal_id)).body(Body::empty()).unwrap();
    let (_, body) = send(app, request).await;
    assert_eq!(body["won"], json!(true));
}

#[tokio::test]
async fn too_many_installments_reports_the_limit() {
    let purchase = json!({
        "email": "davi@email.com",
        "productId": "curso-lideranca",
        "productName": "Curso de Liderança",
        "price": 120,
        "installments": 12
    });

    let (status, body) = send(router(), post_json("/api/touchpoints/purchases", purchase)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"]["maxInstallments"], json!(6));
}

#[tokio::test]
async fn health_and_openapi_are_served() {
    let app = router();
    let request = Request::builder().uri("/api/health").body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let request = Request::builder().uri("/api-docs/openapi.json").body(Body::empty()).unwrap();
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/api/crm/identity/resolve"].is_object());
}
