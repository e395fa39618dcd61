mod common;

use agent_ledger::api::router;
use agent_ledger::services::deposit_service::DepositRequest;
use axum::body::{ to_bytes, Body };
use axum::http::{ header, Method, Request, StatusCode };
use axum::Router;
use common::{ dec, Harness };
use serde_json::{ json, Value };
use tower::ServiceExt;
use uuid::Uuid;

fn app(h: &Harness) -> Router {
    router(h.engine.app_state())
}

async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) =>
            builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let h = Harness::new();
    let response = app(&h)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"OK");
}

#[tokio::test]
async fn test_open_and_fetch_user() {
    let h = Harness::new();

    let (status, created) = send(
        app(&h),
        Method::POST,
        "/api/users",
        Some(json!({ "balance": "25.50" }))
    ).await;
    assert_eq!(status, StatusCode::OK);

    let id = created["id"].as_str().unwrap().to_string();
    let (status, fetched) = send(app(&h), Method::GET, &format!("/api/users/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], created["id"]);
    assert_eq!(h.engine.users.get(id.parse().unwrap()).await.unwrap().balance, dec("25.50"));
}

#[tokio::test]
async fn test_unknown_record_maps_to_not_found() {
    let h = Harness::new();

    let (status, body) = send(
        app(&h),
        Method::GET,
        &format!("/api/deposits/{}", Uuid::new_v4()),
        None
    ).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_wrong_agent_is_forbidden() {
    let h = Harness::new();
    let agent = h.agent("Awa", "0", "500").await;
    let intruder = h.agent("Binta", "0", "500").await;
    let user = h.user("0").await;
    let tx = h.engine.deposits
        .create(DepositRequest {
            reference: "dep-1".to_string(),
            user_id: user.id,
            agent_id: agent.id,
            amount: dec("100"),
            proof_url: None,
        }).await
        .unwrap();

    let (status, body) = send(
        app(&h),
        Method::POST,
        &format!("/api/deposits/{}/approve", tx.id),
        Some(json!({ "agent_id": intruder.id }))
    ).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "NOT_ASSIGNED");
    assert_eq!(h.engine.deposits.get(tx.id).await.unwrap().status, "pending");
}

#[tokio::test]
async fn test_repeated_approval_reports_already_processed() {
    let h = Harness::new();
    let agent = h.agent("Awa", "0", "500").await;
    let user = h.user("0").await;

    let (status, created) = send(
        app(&h),
        Method::POST,
        "/api/deposits",
        Some(
            json!({
                "reference": "dep-1",
                "user_id": user.id,
                "agent_id": agent.id,
                "amount": "100",
            })
        )
    ).await;
    assert_eq!(status, StatusCode::OK);
    let uri = format!("/api/deposits/{}/approve", created["id"].as_str().unwrap());

    let (status, first) = send(app(&h), Method::POST, &uri, Some(json!({ "agent_id": agent.id }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["outcome"], "applied");

    let (status, second) = send(app(&h), Method::POST, &uri, Some(json!({ "agent_id": agent.id }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["outcome"], "already_processed");
    assert_eq!(second["status"], "completed");
}

#[tokio::test]
async fn test_payout_reject_without_reason_is_bad_request() {
    let h = Harness::new();
    let agent = h.agent("Awa", "0", "100").await;
    let request = h.engine.payouts.request(agent.id, dec("50")).await.unwrap();

    let (status, body) = send(
        app(&h),
        Method::POST,
        &format!("/api/payouts/{}/reject", request.id),
        Some(json!({ "reason": "" }))
    ).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");
}
