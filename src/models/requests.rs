use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::errors::AuctionError;

/// Client-side amounts arrive as decimals; internally everything is
/// whole currency units. Fractional amounts are rejected at the edge.
pub fn to_internal_amount(amount: Decimal) -> Result<u64, AuctionError> {
    let normalized = amount.normalize();
    if normalized.scale() > 0 {
        return Err(AuctionError::InvalidAmount(format!(
            "Fractional amount not supported: {}",
            amount
        )));
    }
    if normalized.is_sign_negative() {
        return Err(AuctionError::InvalidAmount(format!("Negative amount: {}", amount)));
    }
    normalized
        .to_string()
        .parse::<u64>()
        .map_err(|_| AuctionError::InvalidAmount(format!("Amount overflow: {}", amount)))
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub start_price: Decimal,
    pub step_price: Decimal,
    pub buy_now_price: Option<Decimal>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub auto_extend: bool,
}

#[derive(Debug, Deserialize)]
pub struct PlaceBidRequest {
    pub amount: Decimal,
    /// Proxy ceiling; defaults to `amount` when absent.
    pub max_amount: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct BanBidderRequest {
    pub bidder_id: u64,
    /// Shown to the banned bidder in the rejection notification.
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub product_id: u64,
}

#[derive(Debug, Deserialize)]
pub struct PaymentReceiptRequest {
    pub receipt_url: String,
}

#[derive(Debug, Deserialize)]
pub struct ShippingTrackingRequest {
    pub tracking_code: String,
}

#[derive(Debug, Deserialize)]
pub struct RateSellerRequest {
    pub score: i32,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct AskQuestionRequest {
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct AnswerQuestionRequest {
    pub answer: String,
}

#[derive(Debug, Deserialize)]
pub struct AppendDescriptionRequest {
    pub description: String,
}
