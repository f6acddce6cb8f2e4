// Error taxonomy for the auction settlement core
use std::fmt;

use axum::http::StatusCode;

#[derive(Debug, Clone)]
pub enum AuctionError {
    // Lookup errors
    ProductNotFound(u64),
    OrderNotFound(u64),
    QuestionNotFound(u64),
    UserNotFound(u64),

    // Auction state errors
    AuctionNotActive { product_id: u64, status: String },
    AuctionNotStarted { product_id: u64 },
    AuctionEnded { product_id: u64 },
    ProductNotSold { product_id: u64 },
    NoBuyNowPrice { product_id: u64 },

    // Bid validation errors
    SellerSelfBid,
    BidderBanned { product_id: u64, bidder_id: u64 },
    BidTooLow { amount: u64, minimum: u64 },
    IneligibleBidder { positive: u32, total: u32 },
    InvalidAmount(String),

    // Permission errors
    PermissionDenied { user_id: u64, reason: String },

    // Settlement errors
    InvalidTransition(String),
    AlreadyRated { product_id: u64 },
    AlreadyAnswered { question_id: u64 },

    // Payment callback errors
    InvalidSignature,
    AmountMismatch { expected: u64, received: u64 },
    MissingParam(&'static str),

    // System errors
    Internal(String),
}

impl fmt::Display for AuctionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProductNotFound(id) => write!(f, "Product {} not found", id),
            Self::OrderNotFound(id) => write!(f, "Order {} not found", id),
            Self::QuestionNotFound(id) => write!(f, "Question {} not found", id),
            Self::UserNotFound(id) => write!(f, "User {} not found", id),
            Self::AuctionNotActive { product_id, status } => {
                write!(f, "Product {} is not active (status {})", product_id, status)
            }
            Self::AuctionNotStarted { product_id } => {
                write!(f, "Auction {} has not started yet", product_id)
            }
            Self::AuctionEnded { product_id } => write!(f, "Auction {} has ended", product_id),
            Self::ProductNotSold { product_id } => {
                write!(f, "Product {} is not sold", product_id)
            }
            Self::NoBuyNowPrice { product_id } => {
                write!(f, "Product {} has no buy-now price", product_id)
            }
            Self::SellerSelfBid => write!(f, "Sellers cannot bid on their own product"),
            Self::BidderBanned { product_id, bidder_id } => {
                write!(f, "Bidder {} is banned from product {}", bidder_id, product_id)
            }
            Self::BidTooLow { amount, minimum } => {
                write!(f, "Bid {} is below the minimum valid price {}", amount, minimum)
            }
            Self::IneligibleBidder { positive, total } => write!(
                f,
                "Feedback ratio too low: {} positive of {} ratings",
                positive, total
            ),
            Self::InvalidAmount(msg) => write!(f, "Invalid amount: {}", msg),
            Self::PermissionDenied { user_id, reason } => {
                write!(f, "Permission denied for user {}: {}", user_id, reason)
            }
            Self::InvalidTransition(msg) => write!(f, "Invalid order transition: {}", msg),
            Self::AlreadyRated { product_id } => {
                write!(f, "Transaction for product {} already rated", product_id)
            }
            Self::AlreadyAnswered { question_id } => {
                write!(f, "Question {} already answered", question_id)
            }
            Self::InvalidSignature => write!(f, "Payment callback signature verification failed"),
            Self::AmountMismatch { expected, received } => {
                write!(f, "Callback amount {} does not match expected {}", received, expected)
            }
            Self::MissingParam(key) => write!(f, "Missing callback parameter: {}", key),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AuctionError {}

impl From<anyhow::Error> for AuctionError {
    fn from(err: anyhow::Error) -> Self {
        AuctionError::Internal(err.to_string())
    }
}

// Error code mapping for API responses
impl AuctionError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ProductNotFound(_) => "PRODUCT_NOT_FOUND",
            Self::OrderNotFound(_) => "ORDER_NOT_FOUND",
            Self::QuestionNotFound(_) => "QUESTION_NOT_FOUND",
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::AuctionNotActive { .. } => "AUCTION_NOT_ACTIVE",
            Self::AuctionNotStarted { .. } => "AUCTION_NOT_STARTED",
            Self::AuctionEnded { .. } => "AUCTION_ENDED",
            Self::ProductNotSold { .. } => "PRODUCT_NOT_SOLD",
            Self::NoBuyNowPrice { .. } => "NO_BUY_NOW_PRICE",
            Self::SellerSelfBid => "SELLER_SELF_BID",
            Self::BidderBanned { .. } => "BIDDER_BANNED",
            Self::BidTooLow { .. } => "BID_TOO_LOW",
            Self::IneligibleBidder { .. } => "INELIGIBLE_BIDDER",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::PermissionDenied { .. } => "PERMISSION_DENIED",
            Self::InvalidTransition(_) => "INVALID_TRANSITION",
            Self::AlreadyRated { .. } => "ALREADY_RATED",
            Self::AlreadyAnswered { .. } => "ALREADY_ANSWERED",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            Self::MissingParam(_) => "MISSING_PARAM",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn is_user_error(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ProductNotFound(_)
            | Self::OrderNotFound(_)
            | Self::QuestionNotFound(_)
            | Self::UserNotFound(_) => StatusCode::NOT_FOUND,
            Self::IneligibleBidder { .. }
            | Self::BidderBanned { .. }
            | Self::SellerSelfBid
            | Self::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::InvalidTransition(_) | Self::AlreadyRated { .. } | Self::AlreadyAnswered { .. } => {
                StatusCode::CONFLICT
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}
