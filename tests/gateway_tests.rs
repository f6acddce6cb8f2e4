use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::util::ServiceExt;

use bidhouse::ban::BanEngine;
use bidhouse::bidding::{AntiSnipePolicy, BidResolver};
use bidhouse::fanout::{Notifier, Relay, UpdatePublisher};
use bidhouse::gateway::{create_app, AppState};
use bidhouse::ledger::AuctionLedger;
use bidhouse::payment::PaymentGateway;
use bidhouse::questions::QuestionDesk;
use bidhouse::settlement::SettlementEngine;

fn test_state() -> (Arc<AppState>, Arc<AuctionLedger>) {
    let ledger = Arc::new(AuctionLedger::new(1));
    let updates = UpdatePublisher::new(64);
    let (notifier, _rx) = Notifier::channel();
    let resolver = BidResolver::new(
        ledger.clone(),
        updates.clone(),
        notifier.clone(),
        AntiSnipePolicy::default(),
    );
    let state = Arc::new(AppState {
        ledger: ledger.clone(),
        resolver,
        bans: BanEngine::new(ledger.clone(), updates.clone(), notifier.clone()),
        settlement: SettlementEngine::new(ledger.clone()),
        payment: PaymentGateway::new(
            "test-secret".to_string(),
            "TESTSHOP".to_string(),
            "https://pay.test/gateway".to_string(),
            "http://localhost/return".to_string(),
        ),
        questions: QuestionDesk::new(ledger.clone(), notifier.clone()),
        relay: Arc::new(Relay::new()),
        notifier,
    });
    (state, ledger)
}

async fn send(state: &Arc<AppState>, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let app = create_app(state.clone());
    let request = match body {
        Some(body) => Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    };
    (status, value)
}

async fn list_product(state: &Arc<AppState>, seller_id: u64) -> u64 {
    let now = Utc::now();
    let (status, body) = send(
        state,
        "POST",
        &format!("/api/products?user_id={}", seller_id),
        Some(json!({
            "name": "mechanical watch",
            "description": "runs well",
            "start_price": "100",
            "step_price": "10",
            "start_time": (now - Duration::minutes(5)).to_rfc3339(),
            "end_time": (now + Duration::hours(2)).to_rfc3339(),
            "auto_extend": true,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "create product failed: {}", body);
    body["data"]["id"].as_u64().unwrap()
}

#[tokio::test]
async fn test_create_product_and_snapshot() {
    let (state, _ledger) = test_state();
    let product_id = list_product(&state, 10).await;

    let (status, body) = send(&state, "GET", &format!("/api/products/{}", product_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ACTIVE");
    assert_eq!(body["data"]["current_price"], 100);
}

#[tokio::test]
async fn test_place_bid_round_trip() {
    let (state, _ledger) = test_state();
    let product_id = list_product(&state, 10).await;

    let (status, body) = send(
        &state,
        "POST",
        &format!("/api/products/{}/bids?user_id=7", product_id),
        Some(json!({"amount": "100"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["current_price"], 100);
    assert_eq!(body["data"]["winner_id"], 7);
    assert_eq!(body["data"]["leading"], true);

    // Under the minimum next price
    let (status, body) = send(
        &state,
        "POST",
        &format!("/api/products/{}/bids?user_id=8", product_id),
        Some(json!({"amount": "105"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.as_str().unwrap().contains("BID_TOO_LOW"));

    let (_, body) = send(
        &state,
        "GET",
        &format!("/api/products/{}/suggested_price", product_id),
        None,
    )
    .await;
    assert_eq!(body["data"], 110);
}

#[tokio::test]
async fn test_fractional_amount_rejected_at_edge() {
    let (state, _ledger) = test_state();
    let product_id = list_product(&state, 10).await;

    let (status, body) = send(
        &state,
        "POST",
        &format!("/api/products/{}/bids?user_id=7", product_id),
        Some(json!({"amount": "100.5"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.as_str().unwrap().contains("INVALID_AMOUNT"));
}

#[tokio::test]
async fn test_seller_bid_forbidden() {
    let (state, _ledger) = test_state();
    let product_id = list_product(&state, 10).await;

    let (status, body) = send(
        &state,
        "POST",
        &format!("/api/products/{}/bids?user_id=10", product_id),
        Some(json!({"amount": "100"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.as_str().unwrap().contains("SELLER_SELF_BID"));
}

#[tokio::test]
async fn test_eligibility_endpoint() {
    let (state, ledger) = test_state();
    let product_id = list_product(&state, 10).await;

    let (status, body) = send(
        &state,
        "GET",
        &format!("/api/products/{}/eligibility?user_id=7", product_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["eligible"], true);
    assert_eq!(body["data"]["reason"], "New bidder allowed");

    // Bury user 9 under negative feedback and check again
    for _ in 0..4 {
        ledger.record_feedback(bidhouse::models::Feedback {
            from_user_id: 1,
            to_user_id: 9,
            product_id: 1,
            score: -1,
            comment: String::new(),
            created_at: Utc::now(),
        });
    }
    let (_, body) = send(
        &state,
        "GET",
        &format!("/api/products/{}/eligibility?user_id=9", product_id),
        None,
    )
    .await;
    assert_eq!(body["data"]["eligible"], false);

    let (status, body) = send(
        &state,
        "POST",
        &format!("/api/products/{}/bids?user_id=9", product_id),
        Some(json!({"amount": "100"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.as_str().unwrap().contains("INELIGIBLE_BIDDER"));
}

#[tokio::test]
async fn test_ban_flow_recomputes_winner() {
    let (state, _ledger) = test_state();
    let product_id = list_product(&state, 10).await;

    send(
        &state,
        "POST",
        &format!("/api/products/{}/bids?user_id=7", product_id),
        Some(json!({"amount": "100"})),
    )
    .await;
    send(
        &state,
        "POST",
        &format!("/api/products/{}/bids?user_id=8", product_id),
        Some(json!({"amount": "110"})),
    )
    .await;

    // Only the seller may ban
    let (status, _) = send(
        &state,
        "POST",
        &format!("/api/products/{}/ban?user_id=8", product_id),
        Some(json!({"bidder_id": 7, "reason": "not yours"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &state,
        "POST",
        &format!("/api/products/{}/ban?user_id=10", product_id),
        Some(json!({"bidder_id": 8, "reason": "Shill bidding"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["winner_id"], 7);
    assert_eq!(body["data"]["current_price"], 100);

    // Banned bidder cannot come back
    let (status, body) = send(
        &state,
        "POST",
        &format!("/api/products/{}/bids?user_id=8", product_id),
        Some(json!({"amount": "200"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.as_str().unwrap().contains("BIDDER_BANNED"));
}

#[tokio::test]
async fn test_ban_after_proxy_fight_keeps_fought_up_price() {
    let (state, _ledger) = test_state();
    let product_id = list_product(&state, 10).await;

    send(
        &state,
        "POST",
        &format!("/api/products/{}/bids?user_id=7", product_id),
        Some(json!({"amount": "100", "max_amount": "500"})),
    )
    .await;
    let (_, body) = send(
        &state,
        "POST",
        &format!("/api/products/{}/bids?user_id=8", product_id),
        Some(json!({"amount": "110", "max_amount": "200"})),
    )
    .await;
    assert_eq!(body["data"]["winner_id"], 7);
    assert_eq!(body["data"]["current_price"], 210);

    // Banning the losing challenger does not roll the price back: the
    // incumbent's counter-bid at 210 survives the recompute.
    let (status, body) = send(
        &state,
        "POST",
        &format!("/api/products/{}/ban?user_id=10", product_id),
        Some(json!({"bidder_id": 8, "reason": "Shill bidding"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["winner_id"], 7);
    assert_eq!(body["data"]["current_price"], 210);
}

#[tokio::test]
async fn test_masked_bid_history() {
    let (state, _ledger) = test_state();
    let product_id = list_product(&state, 10).await;

    send(
        &state,
        "POST",
        "/api/users",
        Some(json!({"id": 7, "full_name": "Hoang Anh Tuan", "email": "tuan@example.com"})),
    )
    .await;
    send(
        &state,
        "POST",
        &format!("/api/products/{}/bids?user_id=7", product_id),
        Some(json!({"amount": "100"})),
    )
    .await;

    let (status, body) = send(&state, "GET", &format!("/api/products/{}/bids", product_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["bidder_name"], "**** Tuan");
    assert!(body["data"][0].get("bidder_id").is_none());
}

#[tokio::test]
async fn test_question_and_answer_routes() {
    let (state, _ledger) = test_state();
    let product_id = list_product(&state, 10).await;

    let (status, body) = send(
        &state,
        "POST",
        &format!("/api/products/{}/questions?user_id=7", product_id),
        Some(json!({"question": "Original box included?"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let question_id = body["data"]["id"].as_u64().unwrap();

    let (status, body) = send(
        &state,
        "POST",
        &format!("/api/questions/{}/answer?user_id=10", question_id),
        Some(json!({"answer": "Yes, with papers"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["answer"], "Yes, with papers");

    let (status, _) = send(
        &state,
        "POST",
        &format!("/api/questions/{}/answer?user_id=10", question_id),
        Some(json!({"answer": "again"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_product_is_404() {
    let (state, _ledger) = test_state();
    let (status, body) = send(&state, "GET", "/api/products/424242", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.as_str().unwrap().contains("PRODUCT_NOT_FOUND"));
}
