use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload fanned out on every committed change to an auction's standing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionUpdate {
    pub product_id: u64,
    pub current_price: u64,
    pub winner_id: Option<u64>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidPlacedNote {
    pub product_id: u64,
    pub product_name: String,
    pub new_price: u64,
    pub seller_email: String,
    pub bidder_email: String,
    pub prev_bidder_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidRejectedNote {
    pub product_name: String,
    pub bidder_email: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionSuccessNote {
    pub product_name: String,
    pub price: u64,
    pub seller_email: String,
    pub winner_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionFailNote {
    pub product_name: String,
    pub seller_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQuestionNote {
    pub product_name: String,
    pub seller_email: String,
    pub question: String,
    pub product_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAnswerNote {
    pub product_name: String,
    pub question: String,
    pub answer: String,
    pub emails: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptionUpdateNote {
    pub product_name: String,
    pub description: String,
    pub emails: Vec<String>,
    pub product_url: String,
}

/// Events appended to the notification stream. A delivery worker on the
/// other side renders and sends the actual emails.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationEvent {
    BidPlaced(BidPlacedNote),
    BidRejected(BidRejectedNote),
    AuctionSuccess(AuctionSuccessNote),
    AuctionFail(AuctionFailNote),
    NewQuestion(NewQuestionNote),
    NewAnswer(NewAnswerNote),
    DescriptionUpdate(DescriptionUpdateNote),
}

impl NotificationEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BidPlaced(_) => "BID_PLACED",
            Self::BidRejected(_) => "BID_REJECTED",
            Self::AuctionSuccess(_) => "AUCTION_SUCCESS",
            Self::AuctionFail(_) => "AUCTION_FAIL",
            Self::NewQuestion(_) => "NEW_QUESTION",
            Self::NewAnswer(_) => "NEW_ANSWER",
            Self::DescriptionUpdate(_) => "DESCRIPTION_UPDATE",
        }
    }
}
