use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Extension, Json, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Router,
};
use chrono::Utc;
use log::error;
use tokio::sync::mpsc::UnboundedReceiver;
use tower_http::cors::CorsLayer;

use crate::ban::BanEngine;
use crate::bidding::{BidOutcome, BidResolver};
use crate::eligibility::{self, EligibilityReport};
use crate::errors::AuctionError;
use crate::fanout::{Notifier, Relay};
use crate::ledger::AuctionLedger;
use crate::models::{
    AnswerQuestionRequest, ApiResponse, AppendDescriptionRequest, AskQuestionRequest,
    BanBidderRequest, BidHistoryEntry, CreateOrderRequest, CreateProductRequest,
    DescriptionUpdateNote, NotificationEvent, Order, PaymentReceiptRequest, PlaceBidRequest,
    Product, ProductQuestion, RateSellerRequest, ShippingTrackingRequest, UserProfile,
    to_internal_amount,
};
use crate::payment::{CallbackOutcome, PaymentGateway};
use crate::questions::QuestionDesk;
use crate::settlement::SettlementEngine;

pub struct AppState {
    pub ledger: Arc<AuctionLedger>,
    pub resolver: BidResolver,
    pub bans: BanEngine,
    pub settlement: SettlementEngine,
    pub payment: PaymentGateway,
    pub questions: QuestionDesk,
    pub relay: Arc<Relay>,
    pub notifier: Notifier,
}

pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/users", post(register_user))
        .route("/api/products", post(create_product))
        .route("/api/products/:id", get(get_product))
        .route("/api/products/:id/bids", get(bid_history).post(place_bid))
        .route("/api/products/:id/suggested_price", get(suggested_price))
        .route("/api/products/:id/eligibility", get(check_eligibility))
        .route("/api/products/:id/buy_now", post(buy_now))
        .route("/api/products/:id/ban", post(ban_bidder))
        .route("/api/products/:id/description", post(append_description))
        .route("/api/products/:id/questions", post(ask_question))
        .route("/api/products/:id/cancel_transaction", post(cancel_transaction))
        .route("/api/products/:id/rate_seller", post(rate_seller))
        .route("/api/questions/:id/answer", post(answer_question))
        .route("/api/orders", post(create_order))
        .route("/api/orders/:id", get(get_order))
        .route("/api/orders/:id/payment_receipt", patch(upload_payment_receipt))
        .route("/api/orders/:id/shipping_tracking", patch(record_shipping_tracking))
        .route("/api/orders/:id/confirm_delivery", patch(confirm_delivery))
        .route("/api/payment/:order_id/pay_url", get(payment_url))
        .route("/api/payment/gateway_return", get(gateway_return))
        .route("/api/ws/products/:id", get(subscribe_product_updates))
        .layer(Extension(state))
        .layer(CorsLayer::permissive())
}

/// The verified caller id; authentication itself happens upstream.
#[derive(serde::Deserialize)]
struct UserIdParams {
    user_id: u64,
}

#[derive(serde::Deserialize)]
struct PayUrlParams {
    user_id: u64,
    ip: Option<String>,
}

fn reject(e: AuctionError) -> (StatusCode, String) {
    if !e.is_user_error() {
        error!("Request failed: {}", e);
    }
    (e.status_code(), format!("{}: {}", e.error_code(), e))
}

async fn register_user(
    Extension(state): Extension<Arc<AppState>>,
    Json(profile): Json<UserProfile>,
) -> Result<Json<ApiResponse<()>>, (StatusCode, String)> {
    state.ledger.register_user(profile);
    Ok(Json(ApiResponse::ok()))
}

async fn create_product(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<UserIdParams>,
    Json(payload): Json<CreateProductRequest>,
) -> Result<Json<ApiResponse<Product>>, (StatusCode, String)> {
    let start_price = to_internal_amount(payload.start_price).map_err(reject)?;
    let step_price = to_internal_amount(payload.step_price).map_err(reject)?;
    let buy_now_price = payload
        .buy_now_price
        .map(to_internal_amount)
        .transpose()
        .map_err(reject)?;

    let product = state
        .ledger
        .create_product(
            params.user_id,
            payload.name,
            payload.description,
            start_price,
            step_price,
            buy_now_price,
            payload.start_time,
            payload.end_time,
            payload.auto_extend,
        )
        .map_err(reject)?;
    Ok(Json(ApiResponse::success(product)))
}

async fn get_product(
    Extension(state): Extension<Arc<AppState>>,
    Path(product_id): Path<u64>,
) -> Result<Json<ApiResponse<Product>>, (StatusCode, String)> {
    let product = state.ledger.product_snapshot(product_id).map_err(reject)?;
    Ok(Json(ApiResponse::success(product)))
}

async fn bid_history(
    Extension(state): Extension<Arc<AppState>>,
    Path(product_id): Path<u64>,
) -> Result<Json<ApiResponse<Vec<BidHistoryEntry>>>, (StatusCode, String)> {
    let history = state.ledger.bid_history(product_id).map_err(reject)?;
    Ok(Json(ApiResponse::success(history)))
}

async fn suggested_price(
    Extension(state): Extension<Arc<AppState>>,
    Path(product_id): Path<u64>,
) -> Result<Json<ApiResponse<u64>>, (StatusCode, String)> {
    let price = state.ledger.suggested_price(product_id).map_err(reject)?;
    Ok(Json(ApiResponse::success(price)))
}

async fn check_eligibility(
    Extension(state): Extension<Arc<AppState>>,
    Path(_product_id): Path<u64>,
    Query(params): Query<UserIdParams>,
) -> Result<Json<ApiResponse<EligibilityReport>>, (StatusCode, String)> {
    let report = eligibility::report_for(&state.ledger, params.user_id);
    Ok(Json(ApiResponse::success(report)))
}

async fn place_bid(
    Extension(state): Extension<Arc<AppState>>,
    Path(product_id): Path<u64>,
    Query(params): Query<UserIdParams>,
    Json(payload): Json<PlaceBidRequest>,
) -> Result<Json<ApiResponse<BidOutcome>>, (StatusCode, String)> {
    let amount = to_internal_amount(payload.amount).map_err(reject)?;
    let max_amount = payload
        .max_amount
        .map(to_internal_amount)
        .transpose()
        .map_err(reject)?;

    let outcome = state
        .resolver
        .place_bid(product_id, params.user_id, amount, max_amount, Utc::now())
        .map_err(reject)?;
    Ok(Json(ApiResponse::success(outcome)))
}

async fn buy_now(
    Extension(state): Extension<Arc<AppState>>,
    Path(product_id): Path<u64>,
    Query(params): Query<UserIdParams>,
) -> Result<Json<ApiResponse<BidOutcome>>, (StatusCode, String)> {
    let outcome = state
        .resolver
        .buy_now(product_id, params.user_id, Utc::now())
        .map_err(reject)?;
    Ok(Json(ApiResponse::success(outcome)))
}

async fn ban_bidder(
    Extension(state): Extension<Arc<AppState>>,
    Path(product_id): Path<u64>,
    Query(params): Query<UserIdParams>,
    Json(payload): Json<BanBidderRequest>,
) -> Result<Json<ApiResponse<Product>>, (StatusCode, String)> {
    let product = state
        .bans
        .ban_bidder(product_id, params.user_id, payload.bidder_id, payload.reason)
        .map_err(reject)?;
    Ok(Json(ApiResponse::success(product)))
}

async fn append_description(
    Extension(state): Extension<Arc<AppState>>,
    Path(product_id): Path<u64>,
    Query(params): Query<UserIdParams>,
    Json(payload): Json<AppendDescriptionRequest>,
) -> Result<Json<ApiResponse<Product>>, (StatusCode, String)> {
    let product = state
        .ledger
        .append_description(product_id, params.user_id, &payload.description)
        .map_err(reject)?;

    let record = state.ledger.record(product_id).map_err(reject)?;
    let bidders = record.lock().unwrap().valid_bidder_ids();
    let emails: Vec<String> = bidders
        .into_iter()
        .map(|id| state.ledger.user_email(id))
        .filter(|e| !e.is_empty())
        .collect();
    if !emails.is_empty() {
        state
            .notifier
            .notify(NotificationEvent::DescriptionUpdate(DescriptionUpdateNote {
                product_name: product.name.clone(),
                description: payload.description,
                emails,
                product_url: format!("/products/{}", product_id),
            }));
    }

    Ok(Json(ApiResponse::success(product)))
}

async fn ask_question(
    Extension(state): Extension<Arc<AppState>>,
    Path(product_id): Path<u64>,
    Query(params): Query<UserIdParams>,
    Json(payload): Json<AskQuestionRequest>,
) -> Result<Json<ApiResponse<ProductQuestion>>, (StatusCode, String)> {
    let question = state
        .questions
        .ask_question(product_id, params.user_id, payload.question)
        .map_err(reject)?;
    Ok(Json(ApiResponse::success(question)))
}

async fn answer_question(
    Extension(state): Extension<Arc<AppState>>,
    Path(question_id): Path<u64>,
    Query(params): Query<UserIdParams>,
    Json(payload): Json<AnswerQuestionRequest>,
) -> Result<Json<ApiResponse<ProductQuestion>>, (StatusCode, String)> {
    let question = state
        .questions
        .answer_question(question_id, params.user_id, payload.answer)
        .map_err(reject)?;
    Ok(Json(ApiResponse::success(question)))
}

async fn create_order(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<UserIdParams>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<ApiResponse<Order>>, (StatusCode, String)> {
    let order = state
        .settlement
        .create_order(payload.product_id, params.user_id)
        .map_err(reject)?;
    Ok(Json(ApiResponse::success(order)))
}

async fn get_order(
    Extension(state): Extension<Arc<AppState>>,
    Path(order_id): Path<u64>,
    Query(params): Query<UserIdParams>,
) -> Result<Json<ApiResponse<Order>>, (StatusCode, String)> {
    let order = state.ledger.order(order_id).map_err(reject)?;
    if order.buyer_id != params.user_id && order.seller_id != params.user_id {
        return Err(reject(AuctionError::PermissionDenied {
            user_id: params.user_id,
            reason: "order is only visible to its buyer and seller".to_string(),
        }));
    }
    Ok(Json(ApiResponse::success(order)))
}

async fn upload_payment_receipt(
    Extension(state): Extension<Arc<AppState>>,
    Path(order_id): Path<u64>,
    Query(params): Query<UserIdParams>,
    Json(payload): Json<PaymentReceiptRequest>,
) -> Result<Json<ApiResponse<Order>>, (StatusCode, String)> {
    let order = state
        .settlement
        .upload_payment_receipt(order_id, params.user_id, payload.receipt_url)
        .map_err(reject)?;
    Ok(Json(ApiResponse::success(order)))
}

async fn record_shipping_tracking(
    Extension(state): Extension<Arc<AppState>>,
    Path(order_id): Path<u64>,
    Query(params): Query<UserIdParams>,
    Json(payload): Json<ShippingTrackingRequest>,
) -> Result<Json<ApiResponse<Order>>, (StatusCode, String)> {
    let order = state
        .settlement
        .record_shipping_tracking(order_id, params.user_id, payload.tracking_code)
        .map_err(reject)?;
    Ok(Json(ApiResponse::success(order)))
}

async fn confirm_delivery(
    Extension(state): Extension<Arc<AppState>>,
    Path(order_id): Path<u64>,
    Query(params): Query<UserIdParams>,
) -> Result<Json<ApiResponse<Order>>, (StatusCode, String)> {
    let order = state
        .settlement
        .confirm_delivery(order_id, params.user_id)
        .map_err(reject)?;
    Ok(Json(ApiResponse::success(order)))
}

async fn cancel_transaction(
    Extension(state): Extension<Arc<AppState>>,
    Path(product_id): Path<u64>,
    Query(params): Query<UserIdParams>,
) -> Result<Json<ApiResponse<()>>, (StatusCode, String)> {
    state
        .settlement
        .cancel_transaction(product_id, params.user_id)
        .map_err(reject)?;
    Ok(Json(ApiResponse::ok()))
}

async fn rate_seller(
    Extension(state): Extension<Arc<AppState>>,
    Path(product_id): Path<u64>,
    Query(params): Query<UserIdParams>,
    Json(payload): Json<RateSellerRequest>,
) -> Result<Json<ApiResponse<()>>, (StatusCode, String)> {
    state
        .settlement
        .rate_seller(product_id, params.user_id, payload.score, payload.comment)
        .map_err(reject)?;
    Ok(Json(ApiResponse::ok()))
}

async fn payment_url(
    Extension(state): Extension<Arc<AppState>>,
    Path(order_id): Path<u64>,
    Query(params): Query<PayUrlParams>,
) -> Result<Json<ApiResponse<String>>, (StatusCode, String)> {
    let order = state.ledger.order(order_id).map_err(reject)?;
    if order.buyer_id != params.user_id {
        return Err(reject(AuctionError::PermissionDenied {
            user_id: params.user_id,
            reason: "only the buyer may pay the order".to_string(),
        }));
    }
    let ip = params.ip.as_deref().unwrap_or("127.0.0.1");
    let url = state.payment.build_payment_url(&order, ip, Utc::now());
    Ok(Json(ApiResponse::success(url)))
}

async fn gateway_return(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<ApiResponse<CallbackOutcome>>, (StatusCode, String)> {
    let outcome = state
        .payment
        .handle_callback(&state.ledger, &params)
        .map_err(reject)?;
    Ok(Json(ApiResponse::success(outcome)))
}

async fn subscribe_product_updates(
    ws: WebSocketUpgrade,
    Path(product_id): Path<u64>,
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    let rx = state.relay.subscribe(product_id);
    ws.on_upgrade(move |socket| stream_updates(socket, rx))
}

async fn stream_updates(mut socket: WebSocket, mut rx: UnboundedReceiver<String>) {
    loop {
        tokio::select! {
            update = rx.recv() => {
                match update {
                    Some(raw) => {
                        if socket.send(Message::Text(raw)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }
}
